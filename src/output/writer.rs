// src/output/writer.rs
//! Executes output plans.
//!
//! This is the only place in the crate that writes the exported Markdown;
//! media materialization streams its own files under the export root.

use super::types::*;
use crate::error::AppError;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

/// Runs every operation of `plan`, recording failures instead of stopping.
pub fn deliver(plan: OutputPlan) -> Result<OutputReport, AppError> {
    let mut report = OutputReport::new();
    let start_time = Instant::now();

    log::info!(
        "Executing output plan with {} operations",
        plan.operations.len()
    );

    for operation in plan.operations {
        let op_start = Instant::now();
        match execute_operation(&operation) {
            Ok(bytes_written) => {
                report = report.with_completed(CompletedOperation {
                    operation,
                    bytes_written,
                    duration_ms: op_start.elapsed().as_millis() as u64,
                });
            }
            Err(e) => {
                log::error!("Operation failed: {}", e);
                report = report.with_failed(FailedOperation {
                    operation,
                    error: e.to_string(),
                });
            }
        }
    }

    report.stats.total_duration_ms = start_time.elapsed().as_millis() as u64;
    log::info!(
        "Output plan complete: {} succeeded, {} failed in {}ms",
        report.stats.operations_completed,
        report.stats.operations_failed,
        report.stats.total_duration_ms
    );

    Ok(report)
}

fn execute_operation(operation: &DeliveryTarget) -> Result<usize, AppError> {
    match operation {
        DeliveryTarget::WriteFile { path, content } => write_file(path, content),
        DeliveryTarget::CreateDirectory { path } => {
            create_directory(path)?;
            Ok(0)
        }
        DeliveryTarget::PrintToStdout { content } => {
            print_to_stdout(content)?;
            Ok(content.len())
        }
    }
}

fn write_file(path: &Path, content: &str) -> Result<usize, AppError> {
    log::debug!("Writing {} bytes to {}", content.len(), path.display());

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;

    log::info!("Wrote file: {}", path.display());
    Ok(content.len())
}

fn create_directory(path: &Path) -> Result<(), AppError> {
    if path.exists() {
        if path.is_dir() {
            log::debug!("Directory already exists: {}", path.display());
            return Ok(());
        }
        return Err(AppError::PathError(format!(
            "path exists but is not a directory: {}",
            path.display()
        )));
    }

    fs::create_dir_all(path)?;
    log::info!("Created directory: {}", path.display());
    Ok(())
}

fn print_to_stdout(content: &str) -> Result<(), AppError> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(content.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_writes_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nested").join("Doc.md");
        let plan = OutputPlan::new()
            .with_operation(DeliveryTarget::CreateDirectory {
                path: dir.path().join("assets"),
            })
            .with_operation(DeliveryTarget::WriteFile {
                path: file.clone(),
                content: "# Doc\n".to_string(),
            });

        let report = deliver(plan).unwrap();

        assert!(report.is_success());
        assert_eq!(report.stats.bytes_written, 6);
        assert_eq!(report.written_files(), vec![&file]);
        assert_eq!(fs::read_to_string(&file).unwrap(), "# Doc\n");
        assert!(dir.path().join("assets").is_dir());
    }

    #[test]
    fn test_failures_are_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("taken");
        fs::write(&blocker, "x").unwrap();

        let report = deliver(OutputPlan::new().with_operation(DeliveryTarget::CreateDirectory {
            path: blocker,
        }))
        .unwrap();

        assert!(!report.is_success());
        assert_eq!(report.stats.operations_failed, 1);
        assert!(report.failure_messages()[0].contains("not a directory"));
    }
}
