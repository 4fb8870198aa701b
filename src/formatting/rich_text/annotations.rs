// src/formatting/rich_text/annotations.rs
//! Annotation processing for rich text.
//!
//! This module handles the application of text styles in a structured and
//! composable way.

use crate::model::TextStyle;
use std::borrow::Cow;

/// Renderer for text styles to Markdown.
pub struct MarkdownStyleRenderer;

impl MarkdownStyleRenderer {
    /// Applies styles to text content for Markdown output.
    ///
    /// Leading and trailing whitespace stays outside the markers, since
    /// `** bold**` is not emphasis in CommonMark.
    pub fn apply_styles(content: &str, style: &TextStyle) -> String {
        if content.is_empty() {
            return String::new();
        }
        if !has_markers(style) && style.link.is_none() {
            return content.to_string();
        }

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return content.to_string();
        }
        let lead = &content[..content.len() - content.trim_start().len()];
        let trail = &content[content.trim_end().len()..];

        let mut result = trimmed.to_string();

        // Apply code style first (it affects how other styles are applied)
        if style.inline_code {
            result = format!("`{}`", result);
        }

        if style.strikethrough {
            result = format!("~~{}~~", result);
        }

        if style.bold {
            result = format!("**{}**", result);
        }

        if style.italic {
            result = format!("*{}*", result);
        }

        // Underline requires HTML
        if style.underline {
            result = format!("<u>{}</u>", result);
        }

        if let Some(url) = &style.link {
            result = format!("[{}]({})", result, decode_link(url));
        }

        format!("{}{}{}", lead, result, trail)
    }
}

fn has_markers(style: &TextStyle) -> bool {
    style.inline_code || style.strikethrough || style.bold || style.italic || style.underline
}

/// Percent-decodes a link URL as the platform stores it encoded.
pub fn decode_link(url: &str) -> Cow<'_, str> {
    urlencoding::decode(url).unwrap_or(Cow::Borrowed(url))
}

/// Basic HTML escaping.
pub fn html_escape(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '&' => "&amp;".to_string(),
            '"' => "&quot;".to_string(),
            '\'' => "&#39;".to_string(),
            _ => c.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_style_application() {
        let style = TextStyle {
            bold: true,
            italic: true,
            ..Default::default()
        };

        let result = MarkdownStyleRenderer::apply_styles("test", &style);
        assert_eq!(result, "***test***");
    }

    #[test]
    fn test_code_style_priority() {
        let style = TextStyle {
            inline_code: true,
            bold: true,
            ..Default::default()
        };

        let result = MarkdownStyleRenderer::apply_styles("test", &style);
        assert_eq!(result, "**`test`**");
    }

    #[test]
    fn test_whitespace_stays_outside_markers() {
        let style = TextStyle {
            bold: true,
            ..Default::default()
        };
        assert_eq!(MarkdownStyleRenderer::apply_styles(" hi ", &style), " **hi** ");
        assert_eq!(MarkdownStyleRenderer::apply_styles("  ", &style), "  ");
    }

    #[test]
    fn test_link_is_decoded() {
        let style = TextStyle {
            link: Some("https%3A%2F%2Fexample.com%2Fa%3Fq%3D1".to_string()),
            ..Default::default()
        };
        assert_eq!(
            MarkdownStyleRenderer::apply_styles("site", &style),
            "[site](https://example.com/a?q=1)"
        );
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<a & \"b\">"), "&lt;a &amp; &quot;b&quot;&gt;");
    }
}
