//! dds-converter library
//!
//! Batch DDS texture conversion through texconv, plus frame sequence and
//! sprite sheet animation. The binary is a thin CLI over
//! [`conversion_api::plan`] and [`conversion_api::run_plan`].

pub mod animation;
pub mod conversion_api;
pub mod dispatcher;
pub mod formats;
pub mod job;
pub mod sequence;
pub mod service;
pub mod sprite;
pub mod texconv;
pub mod tools;

pub use animation::FrameEncoder;
pub use conversion_api::{plan, run_plan, Mode, Plan, RunOptions, RunOutcome};
pub use dispatcher::{CancelToken, DispatchReport, Dispatcher, MIN_INPUT_SIZE};
pub use formats::{AnimationFormat, OutputFormat};
pub use job::{Job, JobKind, JobOutcome, JobStatus};
pub use sequence::{group_sequences, Grouping, Sequence};
pub use service::{AnimationEncoder, ConversionService, Unavailable};
pub use sprite::{SpriteCell, SpriteSheet};
pub use texconv::TexconvService;
