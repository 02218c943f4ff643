//! Batch Processing Module
//!
//! - `discover_files`: lazy recursive walk yielding files with one extension
//! - `RunSummary`: succeeded / failed / skipped / cancelled counters of a run
//! - `OutcomeAggregator`: thread-safe accumulation of job outcomes
//! - `RunStatus`: overall verdict and process exit code

use crate::app_error::AppError;
use crate::common_utils::has_extension;
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Lazy, depth-unbounded sequence of absolute file paths matching an extension.
///
/// Consumed once per run. Unreadable entries below the root are logged and
/// skipped; an unreadable root is reported by `discover_files` itself.
pub struct FileDiscovery {
    walker: walkdir::IntoIter,
    extension: String,
}

impl Iterator for FileDiscovery {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            match self.walker.next()? {
                Ok(entry) => {
                    if entry.file_type().is_file() && has_extension(entry.path(), &self.extension)
                    {
                        return Some(entry.into_path());
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry during discovery");
                }
            }
        }
    }
}

pub fn discover_files(root: &Path, extension: &str) -> Result<FileDiscovery, AppError> {
    if !root.is_dir() {
        return Err(AppError::NotFound {
            path: root.to_path_buf(),
        });
    }

    let root = std::path::absolute(root).map_err(|source| AppError::Discovery {
        path: root.to_path_buf(),
        source,
    })?;

    std::fs::read_dir(&root).map_err(|source| AppError::Discovery {
        path: root.clone(),
        source,
    })?;

    debug!(root = %root.display(), extension, "Starting discovery");

    Ok(FileDiscovery {
        walker: WalkDir::new(&root).follow_links(true).into_iter(),
        extension: extension.trim_start_matches('.').to_lowercase(),
    })
}

/// Overall verdict of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    PartialSuccess,
    Failure,
}

impl RunStatus {
    pub const EXIT_SUCCESS: i32 = 0;
    pub const EXIT_FAILURE: i32 = 1;
    pub const EXIT_PARTIAL: i32 = 2;

    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Success => Self::EXIT_SUCCESS,
            RunStatus::PartialSuccess => Self::EXIT_PARTIAL,
            RunStatus::Failure => Self::EXIT_FAILURE,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::PartialSuccess => "partial success",
            RunStatus::Failure => "failure",
        }
    }
}

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Jobs never started because the run stopped early.
    pub cancelled: usize,
    /// Set when fail-fast or an interrupt stopped the queue.
    pub aborted: bool,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub errors: Vec<(PathBuf, String)>,
    pub skips: Vec<(PathBuf, String)>,
}

impl RunSummary {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            cancelled: 0,
            aborted: false,
            elapsed: Duration::ZERO,
            errors: Vec::new(),
            skips: Vec::new(),
        }
    }

    pub fn success(&mut self) {
        self.succeeded += 1;
    }

    pub fn fail(&mut self, path: PathBuf, error: String) {
        self.failed += 1;
        self.errors.push((path, error));
    }

    pub fn skip(&mut self, path: PathBuf, reason: String) {
        self.skipped += 1;
        self.skips.push((path, reason));
    }

    pub fn cancel(&mut self) {
        self.cancelled += 1;
    }

    /// Number of jobs with a recorded outcome, cancelled ones included.
    pub fn accounted(&self) -> usize {
        self.succeeded + self.failed + self.skipped + self.cancelled
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.succeeded as f64 / self.total as f64) * 100.0
        }
    }

    pub fn status(&self, continue_on_error: bool) -> RunStatus {
        if self.aborted || self.cancelled > 0 {
            return RunStatus::Failure;
        }
        if self.failed == 0 {
            return RunStatus::Success;
        }
        if continue_on_error && self.succeeded > 0 {
            RunStatus::PartialSuccess
        } else {
            RunStatus::Failure
        }
    }
}

/// Shared sink for terminal job outcomes. Every method takes `&self` so the
/// aggregator can be shared by reference across workers.
pub struct OutcomeAggregator {
    inner: Mutex<RunSummary>,
}

impl OutcomeAggregator {
    pub fn new(total: usize) -> Self {
        Self {
            inner: Mutex::new(RunSummary::new(total)),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut RunSummary) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn record_success(&self) {
        self.with(|s| s.success());
    }

    pub fn record_failure(&self, path: PathBuf, error: String) {
        self.with(|s| s.fail(path, error));
    }

    pub fn record_skip(&self, path: PathBuf, reason: String) {
        self.with(|s| s.skip(path, reason));
    }

    pub fn record_cancelled(&self) {
        self.with(|s| s.cancel());
    }

    pub fn mark_aborted(&self) {
        self.with(|s| s.aborted = true);
    }

    pub fn finish(self, elapsed: Duration) -> RunSummary {
        let mut summary = self.inner.into_inner().unwrap_or_else(|e| e.into_inner());
        summary.elapsed = elapsed;
        debug_assert_eq!(summary.accounted(), summary.total);
        summary
    }
}
