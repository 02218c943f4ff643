//! Shared utilities for dds-converter
//!
//! Domain-neutral batch plumbing used by the converter binary:
//! - Error taxonomy (config / run / per-job)
//! - Recursive file discovery and outcome aggregation
//! - Output path mapping with segment stripping
//! - Logging bootstrap, progress events and summary reports

pub mod app_error;
pub mod batch;
pub mod common_utils;
pub mod conversion;
pub mod logging;
pub mod progress;
pub mod report;

pub use app_error::{AppError, ConfigError, ErrorCategory, JobError};
pub use batch::{discover_files, FileDiscovery, OutcomeAggregator, RunStatus, RunSummary};
pub use conversion::{check_output_collisions, PathMapping};
pub use logging::{init_logging, log_external_tool, LogConfig, FILE_ONLY_TARGET};
pub use progress::{
    create_progress_bar, format_duration, ConsoleProgress, NullSink, OutcomeKind, ProgressEvent,
    ProgressSink,
};
pub use report::{print_summary_report, RunReport};
