// src/pipeline.rs
//! Pipeline capability traits: the two stages of a Feishu-to-Markdown run.
//!
//! Each trait describes a single capability, so each stage can be tested in
//! isolation.

use crate::config::ExportConfig;
use crate::error::AppError;
use crate::export::ExportOutcome;
use crate::output::{markdown_path, DeliveryTarget, OutputPlan, OutputReport};
use crate::types::ResourceRef;

/// Turns a classified resource into Markdown.
#[async_trait::async_trait]
pub trait ResourceExporter: Send + Sync {
    async fn export(&self, resource: &ResourceRef) -> Result<ExportOutcome, AppError>;
}

/// Delivers an export to its destinations.
pub trait MarkdownDelivery {
    fn deliver(&self, outcome: &ExportOutcome) -> Result<OutputReport, AppError>;
}

/// Plans where `outcome` goes under `config`: stdout, or a Markdown file in
/// the output directory.
pub fn plan_delivery(config: &ExportConfig, outcome: &ExportOutcome) -> OutputPlan {
    let content = outcome.markdown.as_str().to_string();
    if config.stdout {
        return OutputPlan::new().with_operation(DeliveryTarget::PrintToStdout { content });
    }

    let path = markdown_path(
        &config.output_dir,
        config.file_name.as_deref(),
        &outcome.title,
        config.resource.token(),
    );
    OutputPlan::new()
        .with_operation(DeliveryTarget::CreateDirectory {
            path: config.output_dir.clone(),
        })
        .with_operation(DeliveryTarget::WriteFile { path, content })
}
