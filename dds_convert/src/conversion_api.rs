//! Conversion API Module
//!
//! Turns validated run options into a plan (every output path mapped before
//! anything runs) and executes that plan through the dispatcher.

use crate::dispatcher::{CancelToken, DispatchReport, Dispatcher};
use crate::formats::{AnimationFormat, OutputFormat};
use crate::job::{Job, JobKind};
use crate::sequence::group_sequences;
use crate::service::{AnimationEncoder, ConversionService};
use crate::sprite::sprite_sidecar;
use dds_shared::{
    check_output_collisions, discover_files, AppError, ConfigError, JobError, PathMapping,
    ProgressSink, RunStatus,
};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info};

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_FRAME_DELAY_MS: u32 = 100;

const DDS_EXTENSION: &str = "dds";

/// Files that can be frames of a sequence in animation mode.
const FRAME_EXTENSIONS: [&str; 6] = ["png", "dds", "jpg", "jpeg", "bmp", "tga"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Every `.dds` under the input root to one image each.
    Convert,
    /// Frame sequences and sprite-sheet atlases to animations.
    Animate,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::Convert => "convert",
            Mode::Animate => "animate",
        }
    }

    pub fn operation_name(self) -> &'static str {
        match self {
            Mode::Convert => "DDS Conversion",
            Mode::Animate => "Animation Assembly",
        }
    }
}

/// Immutable configuration of one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub mode: Mode,
    pub format: OutputFormat,
    pub animation_format: AnimationFormat,
    pub frame_delay_ms: u32,
    pub strip_segments: usize,
    pub concurrency: usize,
    pub dry_run: bool,
    pub verbose: bool,
    pub continue_on_error: bool,
    pub json: bool,
}

impl RunOptions {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            mode: Mode::Convert,
            format: OutputFormat::Png,
            animation_format: AnimationFormat::Gif,
            frame_delay_ms: DEFAULT_FRAME_DELAY_MS,
            strip_segments: 0,
            concurrency: DEFAULT_CONCURRENCY,
            dry_run: false,
            verbose: false,
            continue_on_error: false,
            json: false,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency.into());
        }
        if self.frame_delay_ms == 0 {
            return Err(ConfigError::ZeroFrameDelay.into());
        }
        if !self.input.is_dir() {
            return Err(AppError::NotFound {
                path: self.input.clone(),
            });
        }
        Ok(())
    }
}

/// Every job of a run, in dispatch order, with outputs already mapped.
#[derive(Debug, Serialize)]
pub struct Plan {
    pub mode: Mode,
    pub input: PathBuf,
    pub output: PathBuf,
    pub jobs: Vec<Job>,
}

impl Plan {
    /// Jobs that will do work (everything but planned skips).
    pub fn runnable(&self) -> usize {
        self.jobs.iter().filter(|job| !job.is_skip()).count()
    }

    /// Whether any job goes through the conversion service.
    pub fn needs_converter(&self) -> bool {
        self.jobs.iter().any(|job| !job.service_inputs().is_empty())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn print(&self) {
        println!(
            "📋 Plan ({}): {} job(s), {} to run",
            self.mode.label(),
            self.jobs.len(),
            self.runnable()
        );
        println!("   📂 {} → {}", self.input.display(), self.output.display());
        for job in &self.jobs {
            let source = job.source.strip_prefix(&self.input).unwrap_or(&job.source);
            match (&job.kind, &job.output) {
                (JobKind::Skip { reason }, _) => {
                    println!("   ⏭️  {} ({})", source.display(), reason);
                }
                (kind, Some(output)) => {
                    let output = output.strip_prefix(&self.output).unwrap_or(output);
                    let note = match kind {
                        JobKind::Animate { frames, .. } => format!(" [{} frames]", frames.len()),
                        JobKind::SpriteSheet { .. } => " [sprite sheet]".to_string(),
                        _ => String::new(),
                    };
                    println!("   🔄 {} → {}{}", source.display(), output.display(), note);
                }
                (_, None) => {}
            }
        }
    }
}

/// Discovers inputs and maps every output. Fails before any job exists on a
/// configuration problem, so a bad plan never touches the output tree.
pub fn plan(options: &RunOptions) -> Result<Plan, AppError> {
    options.validate()?;
    let mapping = PathMapping::new(&options.input, &options.output, options.strip_segments);

    let jobs = match options.mode {
        Mode::Convert => plan_conversion(options, &mapping)?,
        Mode::Animate => plan_animation(options, &mapping)?,
    };

    check_output_collisions(
        jobs.iter()
            .filter_map(|job| job.output.as_deref().map(|out| (job.source.as_path(), out))),
    )?;

    info!(
        mode = options.mode.label(),
        jobs = jobs.len(),
        strip_segments = options.strip_segments,
        "Plan ready"
    );
    Ok(Plan {
        mode: options.mode,
        input: mapping.input_root().to_path_buf(),
        output: mapping.output_root().to_path_buf(),
        jobs,
    })
}

fn plan_conversion(options: &RunOptions, mapping: &PathMapping) -> Result<Vec<Job>, AppError> {
    let mut sources: Vec<PathBuf> = discover_files(&options.input, DDS_EXTENSION)?.collect();
    if sources.is_empty() {
        return Err(AppError::NoInputs {
            root: options.input.clone(),
            extension: DDS_EXTENSION.to_string(),
        });
    }
    sources.sort();

    let extension = options.format.extension();
    sources
        .into_iter()
        .enumerate()
        .map(|(id, source)| {
            let output = mapping.map(&source, extension)?;
            Ok::<_, AppError>(Job::convert(id, source, output, options.format))
        })
        .collect()
}

fn plan_animation(options: &RunOptions, mapping: &PathMapping) -> Result<Vec<Job>, AppError> {
    let extension = options.animation_format.extension();
    let format = options.animation_format;
    let delay_ms = options.frame_delay_ms;
    let mut jobs = Vec::new();

    let mut atlases: Vec<(PathBuf, PathBuf)> = discover_files(&options.input, DDS_EXTENSION)?
        .filter_map(|texture| sprite_sidecar(&texture).map(|sheet| (texture, sheet)))
        .collect();
    atlases.sort();
    let atlas_textures: HashSet<PathBuf> = atlases.iter().map(|(t, _)| t.clone()).collect();
    for (texture, sheet) in atlases {
        let output = mapping.map(&texture, extension)?;
        jobs.push(Job::sprite_sheet(jobs.len(), texture, sheet, output, format, delay_ms));
    }

    let mut frames = Vec::new();
    for frame_extension in FRAME_EXTENSIONS {
        frames.extend(
            discover_files(&options.input, frame_extension)?
                .filter(|path| !atlas_textures.contains(path)),
        );
    }
    frames.sort();
    let grouping = group_sequences(frames);
    debug!(
        sequences = grouping.sequences.len(),
        mismatches = grouping.mismatches.len(),
        "Grouped frame sequences"
    );

    for sequence in grouping.sequences {
        if sequence.len() < 2 {
            let lone = sequence
                .frames
                .into_iter()
                .next()
                .unwrap_or_else(|| sequence.dir.join(&sequence.name));
            jobs.push(Job::skip(jobs.len(), lone, "single frame"));
            continue;
        }
        let source = sequence.representative_path();
        let output = mapping.map(&source, extension)?;
        jobs.push(Job::animate(jobs.len(), source, sequence.frames, output, format, delay_ms));
    }

    for path in grouping.mismatches {
        let reason = JobError::PatternMismatch { path: path.clone() }.to_string();
        jobs.push(Job::skip(jobs.len(), path, reason));
    }

    if jobs.is_empty() {
        return Err(AppError::NoInputs {
            root: options.input.clone(),
            extension: FRAME_EXTENSIONS.join("|"),
        });
    }
    Ok(jobs)
}

/// Finished run: every job in its terminal state and the overall verdict.
#[derive(Debug)]
pub struct RunOutcome {
    pub mode: Mode,
    pub status: RunStatus,
    pub report: DispatchReport,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }
}

pub fn run_plan(
    plan: Plan,
    options: &RunOptions,
    converter: &dyn ConversionService,
    encoder: &dyn AnimationEncoder,
    sink: &dyn ProgressSink,
    cancel: CancelToken,
) -> anyhow::Result<RunOutcome> {
    let mode = plan.mode;
    let report = Dispatcher::new(options.concurrency, options.continue_on_error, converter, encoder)
        .with_sink(sink)
        .with_cancel(cancel)
        .run(plan.jobs)?;
    let status = report.summary.status(options.continue_on_error);
    Ok(RunOutcome {
        mode,
        status,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::FrameEncoder;
    use crate::job::JobStatus;
    use crate::service::Unavailable;
    use dds_shared::NullSink;
    use image::{Rgba, RgbaImage};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str, size: usize) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut bytes = b"DDS ".to_vec();
        bytes.resize(size.max(4), 0);
        fs::write(&path, bytes).unwrap();
        path
    }

    fn icon_tree() -> (TempDir, PathBuf, PathBuf) {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("input");
        touch(&input, "icons/weapons/sword.dds", 256);
        touch(&input, "icons/items/potion.dds", 256);
        let output = temp.path().join("output");
        (temp, input, output)
    }

    fn outputs(plan: &Plan) -> Vec<PathBuf> {
        let mut outs: Vec<PathBuf> = plan
            .jobs
            .iter()
            .filter_map(|j| j.output.as_ref())
            .map(|o| o.strip_prefix(&plan.output).unwrap().to_path_buf())
            .collect();
        outs.sort();
        outs
    }

    struct CopyConverter;

    impl ConversionService for CopyConverter {
        fn convert(&self, input: &Path, output: &Path, _format: OutputFormat) -> Result<(), JobError> {
            fs::copy(input, output).map(|_| ()).map_err(|e| JobError::io(output, e))
        }
    }

    #[test]
    fn test_plan_preserves_structure() {
        let (_temp, input, output) = icon_tree();
        let plan = plan(&RunOptions::new(&input, &output)).unwrap();

        assert_eq!(plan.mode, Mode::Convert);
        assert_eq!(
            outputs(&plan),
            vec![
                PathBuf::from("icons/items/potion.png"),
                PathBuf::from("icons/weapons/sword.png"),
            ]
        );
    }

    #[test]
    fn test_plan_strips_leading_segment() {
        let (_temp, input, output) = icon_tree();
        let options = RunOptions {
            strip_segments: 1,
            format: OutputFormat::Tga,
            ..RunOptions::new(&input, &output)
        };
        let plan = plan(&options).unwrap();
        assert_eq!(
            outputs(&plan),
            vec![PathBuf::from("items/potion.tga"), PathBuf::from("weapons/sword.tga")]
        );
    }

    #[test]
    fn test_strip_overflow_is_config_error() {
        let (_temp, input, output) = icon_tree();
        let options = RunOptions {
            strip_segments: 3,
            ..RunOptions::new(&input, &output)
        };
        let err = plan(&options).unwrap_err();
        assert!(matches!(
            err,
            AppError::Config(ConfigError::StripSegmentsOutOfRange { strip: 3, available: 3, .. })
        ));
        assert!(!output.exists());
    }

    #[test]
    fn test_collision_after_strip() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("input");
        touch(&input, "a/ui/frame.dds", 256);
        touch(&input, "b/ui/frame.dds", 256);
        let output = temp.path().join("output");
        let options = RunOptions {
            strip_segments: 1,
            ..RunOptions::new(&input, &output)
        };

        let err = plan(&options).unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::OutputCollision { .. })));
        assert!(!output.exists());
    }

    #[test]
    fn test_output_onto_input_rejected() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "ui/frame.dds", 256);
        let options = RunOptions {
            format: OutputFormat::Dds,
            ..RunOptions::new(temp.path(), temp.path())
        };
        assert!(matches!(
            plan(&options).unwrap_err(),
            AppError::Config(ConfigError::OverwritesInput { .. })
        ));
    }

    #[test]
    fn test_invalid_options() {
        let (_temp, input, output) = icon_tree();
        let zero = RunOptions {
            concurrency: 0,
            ..RunOptions::new(&input, &output)
        };
        assert!(matches!(plan(&zero), Err(AppError::Config(ConfigError::ZeroConcurrency))));

        let no_delay = RunOptions {
            frame_delay_ms: 0,
            ..RunOptions::new(&input, &output)
        };
        assert!(matches!(plan(&no_delay), Err(AppError::Config(ConfigError::ZeroFrameDelay))));

        let missing = RunOptions::new(input.join("nope"), &output);
        assert!(matches!(plan(&missing), Err(AppError::NotFound { .. })));
    }

    #[test]
    fn test_no_inputs() {
        let temp = TempDir::new().unwrap();
        let err = plan(&RunOptions::new(temp.path(), temp.path().join("out"))).unwrap_err();
        assert!(matches!(err, AppError::NoInputs { .. }));
    }

    #[test]
    fn test_dry_run_plan_touches_nothing() {
        let (_temp, input, output) = icon_tree();
        let options = RunOptions {
            dry_run: true,
            ..RunOptions::new(&input, &output)
        };
        let plan = plan(&options).unwrap();
        plan.print();
        let json: serde_json::Value = serde_json::from_str(&plan.to_json().unwrap()).unwrap();

        assert_eq!(json["mode"], "convert");
        assert_eq!(json["jobs"].as_array().unwrap().len(), 2);
        assert!(plan.jobs.iter().all(|j| j.status == JobStatus::Pending));
        assert!(!output.exists());
    }

    #[test]
    fn test_plan_animation() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("input");
        for i in [3, 1, 2] {
            touch(&input, &format!("ui/walk_{}.png", i), 16);
        }
        touch(&input, "ui/idle_1.png", 16);
        touch(&input, "ui/background.png", 16);
        touch(&input, "fx/spark.dds", 256);
        fs::write(input.join("fx/spark.sprite"), "<Sprite/>").unwrap();
        touch(&input, "fx/plain.dds", 256);
        let output = temp.path().join("output");
        let options = RunOptions {
            mode: Mode::Animate,
            animation_format: AnimationFormat::Webp,
            ..RunOptions::new(&input, &output)
        };

        let plan = plan(&options).unwrap();

        assert_eq!(plan.jobs.len(), 5);
        assert_eq!(plan.runnable(), 2);
        assert!(plan.needs_converter());
        assert!(matches!(plan.jobs[0].kind, JobKind::SpriteSheet { .. }));
        assert_eq!(plan.jobs[0].output.as_deref(), Some(output.join("fx/spark.webp").as_path()));

        let walk = plan
            .jobs
            .iter()
            .find(|j| matches!(j.kind, JobKind::Animate { .. }))
            .unwrap();
        assert_eq!(walk.output.as_deref(), Some(output.join("ui/walk.webp").as_path()));
        match &walk.kind {
            JobKind::Animate { frames, delay_ms, .. } => {
                assert_eq!(*delay_ms, DEFAULT_FRAME_DELAY_MS);
                let names: Vec<String> = frames
                    .iter()
                    .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
                    .collect();
                assert_eq!(names, ["walk_1.png", "walk_2.png", "walk_3.png"]);
            }
            _ => unreachable!(),
        }

        let reasons: Vec<&str> = plan
            .jobs
            .iter()
            .filter_map(|j| match &j.kind {
                JobKind::Skip { reason } => Some(reason.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(reasons.len(), 3);
        assert!(reasons.contains(&"single frame"));
        assert_eq!(reasons.iter().filter(|r| r.contains("name_number")).count(), 2);
        // The atlas texture is never treated as a frame.
        assert!(!plan.jobs[1..].iter().any(|j| j.source.ends_with("fx/spark.dds")));
    }

    #[test]
    fn test_plan_animation_groups_dds_and_raster_frames() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("input");
        touch(&input, "fx/glow_2.dds", 256);
        touch(&input, "fx/glow_1.dds", 256);
        touch(&input, "fx/glow_10.tga", 64);
        touch(&input, "ui/spin_1.jpg", 64);
        touch(&input, "ui/spin_2.JPEG", 64);
        touch(&input, "ui/spin_3.bmp", 64);
        let output = temp.path().join("output");
        let options = RunOptions {
            mode: Mode::Animate,
            ..RunOptions::new(&input, &output)
        };

        let plan = plan(&options).unwrap();

        assert_eq!(plan.jobs.len(), 2);
        assert!(plan.needs_converter());
        let frame_names = |job: &Job| match &job.kind {
            JobKind::Animate { frames, .. } => frames
                .iter()
                .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
                .collect::<Vec<_>>(),
            _ => Vec::new(),
        };
        assert_eq!(frame_names(&plan.jobs[0]), ["glow_1.dds", "glow_2.dds", "glow_10.tga"]);
        assert_eq!(plan.jobs[0].output.as_deref(), Some(output.join("fx/glow.gif").as_path()));
        assert_eq!(frame_names(&plan.jobs[1]), ["spin_1.jpg", "spin_2.JPEG", "spin_3.bmp"]);
        assert_eq!(plan.jobs[0].service_inputs().len(), 2);
        assert!(plan.jobs[1].service_inputs().is_empty());
    }

    #[test]
    fn test_png_only_animation_needs_no_converter() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "walk_1.png", 16);
        touch(temp.path(), "walk_2.png", 16);
        let options = RunOptions {
            mode: Mode::Animate,
            ..RunOptions::new(temp.path(), temp.path().join("out"))
        };
        assert!(!plan(&options).unwrap().needs_converter());
    }

    #[test]
    fn test_plan_animation_without_inputs() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "notes.txt", 256);
        touch(temp.path(), "fx.sprite", 256);
        let options = RunOptions {
            mode: Mode::Animate,
            ..RunOptions::new(temp.path(), temp.path().join("out"))
        };
        assert!(matches!(plan(&options), Err(AppError::NoInputs { .. })));
    }

    #[test]
    fn test_run_conversion_end_to_end() {
        let (_temp, input, output) = icon_tree();
        touch(&input, "icons/broken.dds", 12);
        let options = RunOptions {
            concurrency: 2,
            ..RunOptions::new(&input, &output)
        };
        let plan = plan(&options).unwrap();
        let outcome = run_plan(
            plan,
            &options,
            &CopyConverter,
            &FrameEncoder::gif_only(),
            &NullSink,
            CancelToken::new(),
        )
        .unwrap();

        assert_eq!(outcome.status, RunStatus::Success);
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(outcome.report.summary.succeeded, 2);
        assert_eq!(outcome.report.summary.skipped, 1);
        assert!(output.join("icons/weapons/sword.png").exists());
        assert!(!output.join("icons/broken.png").exists());
    }

    #[test]
    fn test_run_animation_end_to_end() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("input");
        fs::create_dir_all(input.join("ui")).unwrap();
        for i in 1..=4u8 {
            RgbaImage::from_pixel(6, 6, Rgba([i * 40, 0, 0, 255]))
                .save(input.join(format!("ui/tooltip_{:03}.png", i)))
                .unwrap();
        }
        let output = temp.path().join("output");
        let options = RunOptions {
            mode: Mode::Animate,
            frame_delay_ms: 50,
            ..RunOptions::new(&input, &output)
        };

        let plan = plan(&options).unwrap();
        assert!(!plan.needs_converter());
        let outcome = run_plan(
            plan,
            &options,
            &Unavailable { tool: "texconv" },
            &FrameEncoder::gif_only(),
            &NullSink,
            CancelToken::new(),
        )
        .unwrap();

        assert_eq!(outcome.status, RunStatus::Success);
        let gif = fs::read(output.join("ui/tooltip.gif")).unwrap();
        assert_eq!(&gif[..3], b"GIF");
    }

    #[test]
    fn test_partial_success_exit_code() {
        let (_temp, input, output) = icon_tree();
        touch(&input, "icons/fx/glow.dds", 256);
        let options = RunOptions {
            continue_on_error: true,
            concurrency: 1,
            ..RunOptions::new(&input, &output)
        };

        struct PickyConverter;
        impl ConversionService for PickyConverter {
            fn convert(&self, input: &Path, output: &Path, _format: OutputFormat) -> Result<(), JobError> {
                if input.ends_with("fx/glow.dds") {
                    return Err(JobError::UnsupportedPixelFormat {
                        path: input.to_path_buf(),
                        detail: "BC6H_SF16".to_string(),
                    });
                }
                fs::write(output, b"ok").map_err(|e| JobError::io(output, e))
            }
        }

        let plan = plan(&options).unwrap();
        let outcome = run_plan(
            plan,
            &options,
            &PickyConverter,
            &FrameEncoder::gif_only(),
            &NullSink,
            CancelToken::new(),
        )
        .unwrap();

        assert_eq!(outcome.status, RunStatus::PartialSuccess);
        assert_eq!(outcome.exit_code(), 2);
        let failed: Vec<_> = outcome
            .report
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].error.as_deref().unwrap().contains("BC6H_SF16"));
    }
}
