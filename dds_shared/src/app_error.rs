//! AppError - unified error types
//!
//! Three layers, from most to least severe:
//! - `ConfigError`: the run cannot be planned, nothing is executed
//! - `AppError`: run-level failures (missing input root, discovery)
//! - `JobError`: per-file failures, recorded as job outcomes and never
//!   propagated past the worker that produced them

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Recoverable,
    Fatal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Recoverable => write!(f, "RECOVERABLE"),
            ErrorCategory::Fatal => write!(f, "FATAL"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "--strip-segments {strip} removes the file name of {} ({available} path component(s) available)",
        .path.display()
    )]
    StripSegmentsOutOfRange {
        strip: usize,
        available: usize,
        path: PathBuf,
    },

    #[error("--concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("--frame-delay must be at least 1 ms")]
    ZeroFrameDelay,

    #[error("Unsupported output format: {0} (expected png, jpg, jpeg, bmp, tga, dds, tiff or hdr)")]
    UnsupportedFormat(String),

    #[error("Unsupported animation format: {0} (expected gif or webp)")]
    UnsupportedAnimationFormat(String),

    #[error(
        "{} and {} both map to {}",
        .first.display(),
        .second.display(),
        .output.display()
    )]
    OutputCollision {
        output: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },

    #[error(
        "Input and output paths are identical: {}\n\
         Tip: use a different --output directory or another --format",
        .path.display()
    )]
    OverwritesInput { path: PathBuf },

    #[error("{tool} not found: {hint}")]
    ToolNotFound { tool: String, hint: String },

    #[error("{tool} at {} is not usable: {reason}", .path.display())]
    ToolUnusable {
        tool: String,
        path: PathBuf,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Input directory not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read input directory {}: {source}", .path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No .{extension} files found in {}", .root.display())]
    NoInputs { root: PathBuf, extension: String },
}

/// Failure of a single job. Recorded by the dispatcher, never returned from a run.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Invalid header: {}", .path.display())]
    InvalidHeader { path: PathBuf },

    #[error("Unsupported pixel format in {}: {detail}", .path.display())]
    UnsupportedPixelFormat { path: PathBuf, detail: String },

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed{}: {stderr}", exit_code_suffix(.exit_code))]
    ToolFailed {
        tool: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("{tool} not found")]
    ToolNotFound { tool: String },

    #[error("Expected output was not produced: {}", .path.display())]
    MissingOutput { path: PathBuf },

    #[error("File name does not match name_number.extension: {}", .path.display())]
    PatternMismatch { path: PathBuf },

    #[error("Frame {} is {actual:?}, expected {expected:?}", .path.display())]
    FrameSizeMismatch {
        path: PathBuf,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Image error on {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Invalid sprite sheet {}: {reason}", .path.display())]
    SpriteSheet { path: PathBuf, reason: String },

    #[error("No frames to encode")]
    EmptySequence,
}

fn exit_code_suffix(code: &Option<i32>) -> String {
    code.map(|c| format!(" (exit code: {})", c))
        .unwrap_or_default()
}

impl JobError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        JobError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn image(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        JobError::Image {
            path: path.into(),
            source,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            JobError::ToolNotFound { .. } => ErrorCategory::Fatal,
            _ => ErrorCategory::Recoverable,
        }
    }
}
