// src/config.rs
use crate::constants::{
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_TOKEN_LIFETIME_SECS, FEISHU_OPEN_BASE_URL,
    LARK_OPEN_BASE_URL,
};
use crate::error::AppError;
use crate::export::default_concurrency;
use crate::formatting::{RenderOptions, TableFormat};
use crate::media::MediaPolicy;
use crate::types::{AccessToken, ResourceRef, ValidationError};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound accepted for `--concurrency`.
const MAX_CONCURRENCY: usize = 64;

/// How embedded images, files and whiteboards are referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum MediaMode {
    /// Link to the platform's temporary URLs.
    #[default]
    Link,
    /// Download next to the Markdown and link relatively.
    Local,
}

/// Parsed command-line input.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandLineInput {
    /// Feishu/Lark URL or `kind:token` (e.g. "https://x.feishu.cn/docx/...", "wiki:wikcn...")
    pub input: String,

    /// Directory for the Markdown file and downloaded assets
    #[arg(short = 'o', long, default_value = ".")]
    pub output_dir: String,

    /// Markdown file name (defaults to the document title)
    #[arg(short = 'f', long)]
    pub file_name: Option<String>,

    /// Print the Markdown to stdout instead of writing a file
    #[arg(long, default_value_t = false)]
    pub stdout: bool,

    /// Table output format: md, html or auto (HTML only when cells are merged)
    #[arg(long, default_value = "auto")]
    pub table: TableFormat,

    /// Link media remotely or download it next to the Markdown
    #[arg(long, value_enum, default_value_t = MediaMode::Link)]
    pub media: MediaMode,

    /// Keep embedded sheets and bitables as reference markers only
    #[arg(long, default_value_t = false)]
    pub no_inline_embedded: bool,

    /// Wrap every block in `<!-- block:ID -->` comments
    #[arg(long, default_value_t = false)]
    pub with_block_ids: bool,

    /// Concurrent media and wiki node requests (default: CPU count, max 8)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs())]
    pub timeout: u64,

    /// Use the international Lark Open Platform host
    #[arg(long, default_value_t = false)]
    pub lark: bool,

    /// Enable verbose logging (debug level)
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

/// Credentials taken from the environment.
#[derive(Debug, Clone)]
pub struct CredentialConfig {
    pub access_token: AccessToken,
    pub refresh_token: Option<String>,
    pub app_id: Option<String>,
    pub app_secret: Option<String>,
    /// Remaining lifetime of the access token.
    pub expires_in: chrono::Duration,
}

impl CredentialConfig {
    /// Refresh is possible only with a refresh token and app credentials.
    pub fn refresh_app(&self) -> Option<(&str, &str)> {
        self.refresh_token.as_ref()?;
        Some((self.app_id.as_deref()?, self.app_secret.as_deref()?))
    }
}

/// Resolved export configuration, validated and ready to drive one run.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub resource: ResourceRef,
    pub credential: CredentialConfig,
    pub output_dir: PathBuf,
    pub file_name: Option<String>,
    pub stdout: bool,
    pub table_format: TableFormat,
    pub media: MediaMode,
    pub inline_embedded: bool,
    pub with_block_ids: bool,
    pub concurrency: usize,
    pub timeout: Duration,
    pub base_url: String,
    pub verbose: bool,
    /// The input as typed, for messages.
    pub raw_input: String,
}

impl ExportConfig {
    /// Resolves a complete configuration from CLI input and the process
    /// environment.
    pub fn resolve(cli: CommandLineInput) -> Result<Self, AppError> {
        Self::resolve_with(cli, |name| std::env::var(name).ok())
    }

    /// Same as [`resolve`](Self::resolve) with an explicit variable lookup.
    pub fn resolve_with(
        cli: CommandLineInput,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AppError> {
        let env = |name: &str| env(name).filter(|v| !v.trim().is_empty());

        let access_token = env("FEISHU_ACCESS_TOKEN").ok_or_else(|| {
            AppError::MissingConfiguration(
                "FEISHU_ACCESS_TOKEN environment variable not set".to_string(),
            )
        })?;
        let refresh_token = env("FEISHU_REFRESH_TOKEN");
        let app_id = env("FEISHU_APP_ID");
        let app_secret = env("FEISHU_APP_SECRET");

        if refresh_token.is_some() && (app_id.is_none() || app_secret.is_none()) {
            return Err(AppError::MissingConfiguration(
                "FEISHU_REFRESH_TOKEN requires FEISHU_APP_ID and FEISHU_APP_SECRET".to_string(),
            ));
        }

        let expires_in = match env("FEISHU_TOKEN_EXPIRES_IN") {
            Some(raw) => raw.trim().parse::<i64>().ok().filter(|s| *s > 0).ok_or_else(|| {
                ValidationError::InvalidOption {
                    option: "FEISHU_TOKEN_EXPIRES_IN",
                    reason: format!("'{}' is not a positive number of seconds", raw),
                }
            })?,
            None => DEFAULT_TOKEN_LIFETIME_SECS,
        };

        let resource = ResourceRef::parse(&cli.input)?;

        let concurrency = cli.concurrency.unwrap_or_else(default_concurrency);
        if !(1..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(ValidationError::OutOfBounds {
                value: concurrency as u64,
                min: 1,
                max: MAX_CONCURRENCY as u64,
            }
            .into());
        }
        if cli.timeout == 0 {
            return Err(ValidationError::InvalidOption {
                option: "timeout",
                reason: "must be at least one second".to_string(),
            }
            .into());
        }

        Ok(ExportConfig {
            resource,
            credential: CredentialConfig {
                access_token: AccessToken::new(access_token)?,
                refresh_token,
                app_id,
                app_secret,
                expires_in: chrono::Duration::seconds(expires_in),
            },
            output_dir: PathBuf::from(cli.output_dir),
            file_name: cli.file_name,
            stdout: cli.stdout,
            table_format: cli.table,
            media: cli.media,
            inline_embedded: !cli.no_inline_embedded,
            with_block_ids: cli.with_block_ids,
            concurrency,
            timeout: Duration::from_secs(cli.timeout),
            base_url: if cli.lark {
                LARK_OPEN_BASE_URL
            } else {
                FEISHU_OPEN_BASE_URL
            }
            .to_string(),
            verbose: cli.verbose,
            raw_input: cli.input,
        })
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            table_format: self.table_format,
            inline_embedded: self.inline_embedded,
            with_block_ids: self.with_block_ids,
            include_title: true,
        }
    }

    /// Local media lands under the output directory, so it is ignored with
    /// `--stdout`.
    pub fn media_policy(&self) -> MediaPolicy {
        match self.media {
            MediaMode::Local if !self.stdout => MediaPolicy::download_into(self.output_dir.clone()),
            _ => MediaPolicy::LinkOnly,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cli(args: &[&str]) -> CommandLineInput {
        let mut argv = vec!["feishu2md"];
        argv.extend_from_slice(args);
        CommandLineInput::parse_from(argv)
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ExportConfig::resolve_with(
            cli(&["https://acme.feishu.cn/docx/doxcnAbc123"]),
            env(&[("FEISHU_ACCESS_TOKEN", "u-abc")]),
        )
        .unwrap();

        assert!(matches!(config.resource, ResourceRef::Document { .. }));
        assert_eq!(config.table_format, TableFormat::Auto);
        assert_eq!(config.media_policy(), MediaPolicy::LinkOnly);
        assert!(config.inline_embedded);
        assert!(!config.with_block_ids);
        assert_eq!(config.base_url, FEISHU_OPEN_BASE_URL);
        assert_eq!(config.timeout, DEFAULT_REQUEST_TIMEOUT);
        assert!(config.credential.refresh_app().is_none());
        assert_eq!(
            config.credential.expires_in,
            chrono::Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS)
        );
    }

    #[test]
    fn test_flags() {
        let config = ExportConfig::resolve_with(
            cli(&[
                "wiki:wikcnRoot",
                "-o",
                "out",
                "--table",
                "html",
                "--media",
                "local",
                "--no-inline-embedded",
                "--with-block-ids",
                "--concurrency",
                "3",
                "--lark",
            ]),
            env(&[
                ("FEISHU_ACCESS_TOKEN", "u-abc"),
                ("FEISHU_REFRESH_TOKEN", "ur-def"),
                ("FEISHU_APP_ID", "cli_1"),
                ("FEISHU_APP_SECRET", "s3cret"),
                ("FEISHU_TOKEN_EXPIRES_IN", "600"),
            ]),
        )
        .unwrap();

        assert_eq!(config.table_format, TableFormat::Html);
        assert_eq!(config.media_policy(), MediaPolicy::download_into("out"));
        assert!(!config.render_options().inline_embedded);
        assert!(config.render_options().with_block_ids);
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.base_url, LARK_OPEN_BASE_URL);
        assert_eq!(config.credential.refresh_app(), Some(("cli_1", "s3cret")));
        assert_eq!(config.credential.expires_in, chrono::Duration::seconds(600));
    }

    #[test]
    fn test_stdout_forces_link_only() {
        let config = ExportConfig::resolve_with(
            cli(&["docx:doxcnAbc123", "--media", "local", "--stdout"]),
            env(&[("FEISHU_ACCESS_TOKEN", "u-abc")]),
        )
        .unwrap();
        assert_eq!(config.media_policy(), MediaPolicy::LinkOnly);
    }

    #[test]
    fn test_missing_credentials() {
        let missing = ExportConfig::resolve_with(cli(&["docx:doxcnAbc123"]), env(&[]));
        assert!(matches!(missing, Err(AppError::MissingConfiguration(_))));

        let half = ExportConfig::resolve_with(
            cli(&["docx:doxcnAbc123"]),
            env(&[
                ("FEISHU_ACCESS_TOKEN", "u-abc"),
                ("FEISHU_REFRESH_TOKEN", "ur-def"),
            ]),
        );
        assert!(matches!(half, Err(AppError::MissingConfiguration(_))));
    }

    #[test]
    fn test_invalid_values() {
        let base = [("FEISHU_ACCESS_TOKEN", "u-abc")];
        assert!(ExportConfig::resolve_with(
            cli(&["docx:doxcnAbc123", "--concurrency", "0"]),
            env(&base)
        )
        .is_err());
        assert!(ExportConfig::resolve_with(cli(&["nonsense:thing"]), env(&base)).is_err());
        assert!(ExportConfig::resolve_with(
            cli(&["docx:doxcnAbc123"]),
            env(&[("FEISHU_ACCESS_TOKEN", "u-abc"), ("FEISHU_TOKEN_EXPIRES_IN", "soon")])
        )
        .is_err());
        assert!(CommandLineInput::try_parse_from(["feishu2md", "x", "--table", "csv"]).is_err());
    }
}
