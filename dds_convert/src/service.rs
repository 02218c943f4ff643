//! Seams to the external collaborators
//!
//! The dispatcher only talks to these two traits, so tests can swap in
//! fakes and the texconv/ffmpeg invocation details stay in their modules.

use crate::formats::{AnimationFormat, OutputFormat};
use dds_shared::JobError;
use std::path::{Path, PathBuf};

/// Converts one texture file. Implementations write exactly `output`.
pub trait ConversionService: Send + Sync {
    fn convert(&self, input: &Path, output: &Path, format: OutputFormat) -> Result<(), JobError>;
}

/// Encodes an ordered list of frame images into one animation file.
pub trait AnimationEncoder: Send + Sync {
    fn encode(
        &self,
        frames: &[PathBuf],
        delay_ms: u32,
        format: AnimationFormat,
        output: &Path,
    ) -> Result<(), JobError>;
}

/// Stand-in for a tool the run did not need to locate. Any call fails with
/// `ToolNotFound`, which the dispatcher treats as fatal.
pub struct Unavailable {
    pub tool: &'static str,
}

impl ConversionService for Unavailable {
    fn convert(&self, _input: &Path, _output: &Path, _format: OutputFormat) -> Result<(), JobError> {
        Err(JobError::ToolNotFound {
            tool: self.tool.to_string(),
        })
    }
}
