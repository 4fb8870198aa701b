// src/main.rs

use clap::Parser;
use feishu2md::auth::{Credential, HttpTokenRefresher, StaticToken, TokenManager, TokenSource};
use feishu2md::output::{deliver, DeliveryTarget, OutputReport};
use feishu2md::{
    plan_delivery, AppError, CancelToken, CommandLineInput, ExportConfig, ExportContext,
    ExportOutcome, Exporter, FeishuHttpClient, MarkdownDelivery, ProgressEvent, ProgressObserver,
    ResourceExporter, ResourceRef,
};
use log::LevelFilter;
use log4rs::{
    append::console::{ConsoleAppender, Target},
    append::file::FileAppender,
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
    Config,
};
use std::fs;
use std::sync::Arc;

/// Sets up logging configuration.
fn setup_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };

    let log_file_path = std::env::temp_dir().join("feishu2md.log");
    if let Some(parent) = log_file_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let pattern = if verbose {
        "{d(%Y-%m-%d %H:%M:%S)} [{l}] - {m}{n}"
    } else {
        "{m}{n}"
    };

    // stderr, so `--stdout` output stays clean for piping.
    let console_appender = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(pattern)))
        .build();

    let file_appender = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} [{l}] - {m}{n}",
        )))
        .build(&log_file_path)?;

    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console_appender)))
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(LevelFilter::Debug)))
                .build("file", Box::new(file_appender)),
        )
        .build(
            Root::builder()
                .appender("console")
                .appender("file")
                .build(log_level),
        )?;

    log4rs::init_config(config)?;
    log::info!("Logging initialized. Log file: {}", log_file_path.display());
    Ok(())
}

/// Logs coarse progress at debug level.
struct LogObserver;

impl ProgressObserver for LogObserver {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::PageFetched {
                document_id,
                pages,
                blocks,
            } => log::debug!("{}: page {} ({} blocks)", document_id, pages, blocks),
            ProgressEvent::BlocksRendered {
                document_id,
                blocks,
            } => log::info!("Rendered {} blocks of {}", blocks, document_id),
            ProgressEvent::AssetResolved {
                token, local, ok, ..
            } => log::debug!("Asset {} resolved (local: {}, ok: {})", token, local, ok),
            ProgressEvent::WikiNodeVisited { title, depth, .. } => {
                log::info!("{}{}", "  ".repeat(depth), title)
            }
        }
    }
}

/// Chooses the credential source from the configured environment.
fn token_source(config: &ExportConfig) -> Result<Arc<dyn TokenSource>, AppError> {
    let credential = &config.credential;
    match credential.refresh_app() {
        Some((app_id, app_secret)) => {
            log::info!("Refresh token configured; access token will be renewed as needed");
            let refresher =
                HttpTokenRefresher::new(&config.base_url, app_id, app_secret, config.timeout)?;
            Ok(Arc::new(TokenManager::new(
                Credential::issued_now(
                    credential.access_token.clone(),
                    credential.refresh_token.clone(),
                    credential.expires_in,
                ),
                Arc::new(refresher),
            )))
        }
        None => Ok(Arc::new(StaticToken::new(credential.access_token.clone()))),
    }
}

/// Executes the two-stage run: export → deliver.
async fn execute_export(config: &ExportConfig) -> Result<(), AppError> {
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let pipeline = FeishuToMarkdown::new(config, cancel)?;

    let outcome = pipeline.export(&config.resource).await?;
    let report = pipeline.deliver(&outcome)?;
    pipeline.report_completion(&outcome, &report);

    Ok(())
}

/// Orchestrates the export and delivery of one Feishu resource.
struct FeishuToMarkdown<'a> {
    config: &'a ExportConfig,
    exporter: Exporter,
}

impl<'a> FeishuToMarkdown<'a> {
    fn new(config: &'a ExportConfig, cancel: CancelToken) -> Result<Self, AppError> {
        let client = FeishuHttpClient::new(
            &config.base_url,
            token_source(config)?,
            config.timeout,
            cancel.clone(),
        )?;

        let ctx = ExportContext::new(Arc::new(client))
            .with_observer(Arc::new(LogObserver))
            .with_cancel(cancel)
            .with_render_options(config.render_options())
            .with_media_policy(config.media_policy())
            .with_concurrency(config.concurrency);

        Ok(Self {
            config,
            exporter: Exporter::new(ctx),
        })
    }

    /// Delivers the Markdown to the configured output (file or stdout).
    fn deliver_markdown(&self, outcome: &ExportOutcome) -> Result<OutputReport, AppError> {
        let report = deliver(plan_delivery(self.config, outcome))?;

        if !report.is_success() {
            return Err(AppError::DeliveryFailed {
                failures: report.failure_messages(),
            });
        }

        Ok(report)
    }

    /// Reports completion on stderr, keeping stdout for the Markdown.
    fn report_completion(&self, outcome: &ExportOutcome, report: &OutputReport) {
        if !outcome.warnings.is_empty() {
            eprintln!(
                "⚠️  {} part(s) of '{}' could not be exported:",
                outcome.warnings.len(),
                outcome.title
            );
            for warning in &outcome.warnings {
                eprintln!("   - {}", warning);
            }
        }

        if self.config.stdout {
            return;
        }

        for completed in &report.completed {
            if let DeliveryTarget::WriteFile { path, .. } = &completed.operation {
                eprintln!("✓ Markdown saved to {}", path.display());
            }
        }
        if !outcome.assets.is_empty() {
            eprintln!(
                "✓ {} asset(s) downloaded under {}",
                outcome.assets.len(),
                self.config.output_dir.display()
            );
        }
    }
}

#[async_trait::async_trait]
impl ResourceExporter for FeishuToMarkdown<'_> {
    async fn export(&self, resource: &ResourceRef) -> Result<ExportOutcome, AppError> {
        log::info!("Exporting {} from {}", resource, self.config.raw_input);
        self.exporter.export(resource).await
    }
}

impl MarkdownDelivery for FeishuToMarkdown<'_> {
    fn deliver(&self, outcome: &ExportOutcome) -> Result<OutputReport, AppError> {
        self.deliver_markdown(outcome)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CommandLineInput::parse();

    setup_logging(cli.verbose)?;

    let config = ExportConfig::resolve(cli)?;

    execute_export(&config).await?;

    Ok(())
}
