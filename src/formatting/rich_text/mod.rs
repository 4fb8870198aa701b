// src/formatting/rich_text/mod.rs
//! Inline text rendering: runs, mentions, equations and link previews.

mod annotations;

pub use annotations::{decode_link, html_escape, MarkdownStyleRenderer};

use crate::model::{TextElement, TextPayload};
use crate::types::{Warning, WarningKind};
use std::collections::HashMap;

/// Renders a text payload to inline Markdown.
///
/// User mentions are looked up in `users`; unknown ids render as `@id`
/// and record a warning.
pub fn render_text(
    payload: &TextPayload,
    users: &HashMap<String, String>,
    warnings: &mut Vec<Warning>,
) -> String {
    payload
        .elements
        .iter()
        .map(|element| render_element(element, users, warnings))
        .collect()
}

fn render_element(
    element: &TextElement,
    users: &HashMap<String, String>,
    warnings: &mut Vec<Warning>,
) -> String {
    match element {
        TextElement::Run { content, style } => MarkdownStyleRenderer::apply_styles(content, style),
        TextElement::MentionUser { user_id } => match users.get(user_id) {
            Some(name) if !name.is_empty() => format!("@{}", name),
            _ => {
                warnings.push(
                    Warning::new(
                        WarningKind::MentionUnresolved,
                        "user mention could not be resolved to a name",
                    )
                    .with_context(user_id.clone()),
                );
                format!("@{}", user_id)
            }
        },
        TextElement::MentionDoc { token, title, url } => {
            let label = title.as_deref().filter(|t| !t.is_empty()).unwrap_or(token);
            match url {
                Some(url) => format!("[{}]({})", label, decode_link(url)),
                None => format!("[{}]", label),
            }
        }
        TextElement::Equation { content } => format!("${}$", content.trim()),
        TextElement::LinkPreview { url, title } => {
            let url = decode_link(url);
            let label = title
                .as_deref()
                .filter(|t| !t.is_empty())
                .unwrap_or(&url)
                .to_string();
            format!("[{}]({})", label, url)
        }
        TextElement::Unsupported => String::new(),
    }
}

/// Every user id mentioned in `payload`.
pub fn mentioned_users(payload: &TextPayload) -> impl Iterator<Item = &str> {
    payload.elements.iter().filter_map(|element| match element {
        TextElement::MentionUser { user_id } => Some(user_id.as_str()),
        _ => None,
    })
}
