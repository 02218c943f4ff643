//! Job model
//!
//! A job is created during planning, handed to exactly one worker, and
//! becomes immutable once it reaches a terminal status.

use crate::formats::{AnimationFormat, OutputFormat};
use dds_shared::{JobError, OutcomeKind};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    /// One DDS file through the conversion service.
    Convert { format: OutputFormat },
    /// Ordered frames into one animation. DDS frames are decoded through the
    /// conversion service first; other raster frames are read directly.
    Animate {
        frames: Vec<PathBuf>,
        format: AnimationFormat,
        delay_ms: u32,
    },
    /// DDS atlas cut into frames along its `.sprite` cells.
    SpriteSheet {
        sheet: PathBuf,
        format: AnimationFormat,
        delay_ms: u32,
    },
    /// Known up front to be skipped, e.g. a name outside the frame pattern.
    Skip { reason: String },
}

/// Whether a file needs the conversion service to be read (`.dds`).
pub fn is_texture(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("dds"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

/// What a worker reports back for one job.
#[derive(Debug)]
pub enum JobOutcome {
    Succeeded,
    Failed(JobError),
    Skipped(String),
}

impl JobOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            JobOutcome::Succeeded => OutcomeKind::Succeeded,
            JobOutcome::Failed(_) => OutcomeKind::Failed,
            JobOutcome::Skipped(_) => OutcomeKind::Skipped,
        }
    }

    pub fn detail(&self) -> Option<String> {
        match self {
            JobOutcome::Succeeded => None,
            JobOutcome::Failed(e) => Some(e.to_string()),
            JobOutcome::Skipped(reason) => Some(reason.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: usize,
    /// File the job is reported under. For sequences: `<dir>/<name>.png`.
    pub source: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(flatten)]
    pub kind: JobKind,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

impl Job {
    fn new(id: usize, source: PathBuf, output: Option<PathBuf>, kind: JobKind) -> Self {
        Self {
            id,
            source,
            output,
            kind,
            status: JobStatus::Pending,
            error: None,
            elapsed_ms: None,
        }
    }

    pub fn convert(id: usize, source: PathBuf, output: PathBuf, format: OutputFormat) -> Self {
        Self::new(id, source, Some(output), JobKind::Convert { format })
    }

    pub fn animate(
        id: usize,
        source: PathBuf,
        frames: Vec<PathBuf>,
        output: PathBuf,
        format: AnimationFormat,
        delay_ms: u32,
    ) -> Self {
        Self::new(
            id,
            source,
            Some(output),
            JobKind::Animate {
                frames,
                format,
                delay_ms,
            },
        )
    }

    pub fn sprite_sheet(
        id: usize,
        texture: PathBuf,
        sheet: PathBuf,
        output: PathBuf,
        format: AnimationFormat,
        delay_ms: u32,
    ) -> Self {
        Self::new(
            id,
            texture,
            Some(output),
            JobKind::SpriteSheet {
                sheet,
                format,
                delay_ms,
            },
        )
    }

    pub fn skip(id: usize, source: PathBuf, reason: impl Into<String>) -> Self {
        Self::new(
            id,
            source,
            None,
            JobKind::Skip {
                reason: reason.into(),
            },
        )
    }

    /// Inputs handed to the conversion service, each of which must be at
    /// least `MIN_INPUT_SIZE` bytes. Raster frames are not checked.
    pub fn service_inputs(&self) -> Vec<&Path> {
        match &self.kind {
            JobKind::Convert { .. } | JobKind::SpriteSheet { .. } => vec![self.source.as_path()],
            JobKind::Animate { frames, .. } => frames
                .iter()
                .map(PathBuf::as_path)
                .filter(|frame| is_texture(frame))
                .collect(),
            JobKind::Skip { .. } => Vec::new(),
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self.kind, JobKind::Skip { .. })
    }

    pub fn start(&mut self) {
        debug_assert_eq!(self.status, JobStatus::Pending);
        self.status = JobStatus::Running;
    }

    pub fn finish(&mut self, outcome: &JobOutcome, elapsed: Duration) {
        debug_assert!(!self.status.is_terminal());
        self.status = match outcome {
            JobOutcome::Succeeded => JobStatus::Succeeded,
            JobOutcome::Failed(_) => JobStatus::Failed,
            JobOutcome::Skipped(_) => JobStatus::Skipped,
        };
        self.error = outcome.detail();
        self.elapsed_ms = Some(elapsed.as_millis() as u64);
    }

    /// Never dequeued because the run stopped early.
    pub fn cancel(&mut self) {
        debug_assert_eq!(self.status, JobStatus::Pending);
        self.status = JobStatus::Cancelled;
    }
}
