// src/formatting/code_language.rs
//! Platform code-language ids to fence info strings.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Fence language used when the id is missing or unknown.
pub const FALLBACK_LANGUAGE: &str = "text";

static LANGUAGES: Lazy<HashMap<u32, &'static str>> = Lazy::new(|| {
    [
        (1, "text"),
        (2, "abap"),
        (3, "ada"),
        (4, "apache"),
        (5, "apex"),
        (6, "asm"),
        (7, "bash"),
        (8, "csharp"),
        (9, "cpp"),
        (10, "c"),
        (11, "cobol"),
        (12, "css"),
        (13, "coffeescript"),
        (14, "d"),
        (15, "dart"),
        (16, "delphi"),
        (17, "django"),
        (18, "dockerfile"),
        (19, "erlang"),
        (20, "fortran"),
        (21, "foxpro"),
        (22, "go"),
        (23, "groovy"),
        (24, "html"),
        (25, "htmlbars"),
        (26, "http"),
        (27, "haskell"),
        (28, "json"),
        (29, "java"),
        (30, "javascript"),
        (31, "julia"),
        (32, "kotlin"),
        (33, "latex"),
        (34, "lisp"),
        (35, "logo"),
        (36, "lua"),
        (37, "matlab"),
        (38, "makefile"),
        (39, "markdown"),
        (40, "nginx"),
        (41, "objectivec"),
        (42, "openedge-abl"),
        (43, "php"),
        (44, "perl"),
        (45, "postscript"),
        (46, "powershell"),
        (47, "prolog"),
        (48, "protobuf"),
        (49, "python"),
        (50, "r"),
        (51, "rpg"),
        (52, "ruby"),
        (53, "rust"),
        (54, "sas"),
        (55, "scss"),
        (56, "sql"),
        (57, "scala"),
        (58, "scheme"),
        (59, "scratch"),
        (60, "shell"),
        (61, "swift"),
        (62, "thrift"),
        (63, "typescript"),
        (64, "vbscript"),
        (65, "vb"),
        (66, "xml"),
        (67, "yaml"),
        (68, "cmake"),
        (69, "diff"),
        (70, "gherkin"),
        (71, "graphql"),
        (72, "glsl"),
        (73, "properties"),
        (74, "solidity"),
        (75, "toml"),
    ]
    .into_iter()
    .collect()
});

/// Fence info string for a platform language id.
pub fn fence_language(language: Option<u32>) -> &'static str {
    language
        .and_then(|id| LANGUAGES.get(&id).copied())
        .unwrap_or(FALLBACK_LANGUAGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_unknown_ids() {
        assert_eq!(fence_language(Some(53)), "rust");
        assert_eq!(fence_language(Some(49)), "python");
        assert_eq!(fence_language(Some(9999)), FALLBACK_LANGUAGE);
        assert_eq!(fence_language(None), FALLBACK_LANGUAGE);
    }
}
