// src/output/mod.rs
//! Output handling with clear separation of planning and execution.
//!
//! Callers build an [`OutputPlan`] from an export outcome without touching
//! the filesystem; [`deliver`] is the only place that performs the I/O.

mod paths;
mod types;
mod writer;

pub use paths::{export_filename, get_relative_path, markdown_path, sanitize_filename};
pub use types::{DeliveryTarget, OutputPlan, OutputReport};
pub use writer::deliver;
