// src/output/paths.rs
//! Pure functions for output file names and relative links.

use crate::error::AppError;
use std::path::{Path, PathBuf};

/// Longest file stem kept from a title, in bytes.
const MAX_STEM_BYTES: usize = 100;

/// The default Markdown file name for an export: the title, or the resource
/// token when the title is empty.
pub fn export_filename(title: &str, token: &str) -> String {
    let stem = sanitize_filename(title);
    if stem == "unnamed" {
        format!("{}.md", sanitize_filename(token))
    } else {
        format!("{}.md", stem)
    }
}

/// Where the Markdown lands: `file_name` if given (`.md` appended when
/// missing), otherwise [`export_filename`].
pub fn markdown_path(dir: &Path, file_name: Option<&str>, title: &str, token: &str) -> PathBuf {
    let name = match file_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) if name.ends_with(".md") => name.to_string(),
        Some(name) => format!("{}.md", name),
        None => export_filename(title, token),
    };
    dir.join(name)
}

/// Makes `name` safe to use as a single path component.
pub fn sanitize_filename(name: &str) -> String {
    let mut safe_name = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>();

    safe_name = safe_name.trim().trim_matches('.').to_string();

    if safe_name.len() > MAX_STEM_BYTES {
        let mut cut = MAX_STEM_BYTES;
        while !safe_name.is_char_boundary(cut) {
            cut -= 1;
        }
        safe_name.truncate(cut);
    }

    if safe_name.is_empty() {
        safe_name = "unnamed".to_string();
    }

    safe_name
}

/// Relative link from the file `from` to `to`, forward slashes.
pub fn get_relative_path(from: &Path, to: &Path) -> Result<String, AppError> {
    let from_dir = from.parent().unwrap_or_else(|| Path::new("."));

    let relative = pathdiff::diff_paths(to, from_dir).ok_or_else(|| {
        AppError::PathError(format!(
            "Could not calculate relative path from {} to {}",
            from.display(),
            to.display()
        ))
    })?;

    Ok(relative.to_string_lossy().replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Hello/World"), "Hello_World");
        assert_eq!(sanitize_filename("Test:File*Name"), "Test_File_Name");
        assert_eq!(sanitize_filename("   spaces   "), "spaces");
        assert_eq!(sanitize_filename("...dots..."), "dots");
        assert_eq!(sanitize_filename(""), "unnamed");
    }

    #[test]
    fn test_long_titles_are_cut_on_char_boundaries() {
        let title = "文".repeat(60);
        let safe = sanitize_filename(&title);
        assert!(safe.len() <= MAX_STEM_BYTES);
        assert_eq!(safe.chars().count(), 33);
    }

    #[test]
    fn test_markdown_path() {
        let dir = Path::new("out");
        assert_eq!(
            markdown_path(dir, None, "Q3 Plan", "doxcnA"),
            PathBuf::from("out/Q3 Plan.md")
        );
        assert_eq!(
            markdown_path(dir, None, "  ", "doxcnA"),
            PathBuf::from("out/doxcnA.md")
        );
        assert_eq!(
            markdown_path(dir, Some("notes"), "Q3 Plan", "doxcnA"),
            PathBuf::from("out/notes.md")
        );
        assert_eq!(
            markdown_path(dir, Some("notes.md"), "Q3 Plan", "doxcnA"),
            PathBuf::from("out/notes.md")
        );
    }

    #[test]
    fn test_relative_path_uses_forward_slashes() {
        let from = Path::new("/export/Doc.md");
        let to = Path::new("/export/assets/img.png");
        assert_eq!(get_relative_path(from, to).unwrap(), "assets/img.png");
    }
}
