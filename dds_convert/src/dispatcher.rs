//! Bounded worker pool
//!
//! `concurrency` workers pull jobs from one shared queue and run each to
//! completion. A failure without `--continue-on-error` (or any fatal error,
//! or Ctrl-C) trips the cancel token: jobs already running finish, nothing
//! new is dequeued, and whatever is left in the queue is counted as
//! cancelled.

use crate::formats::{AnimationFormat, OutputFormat};
use crate::job::{is_texture, Job, JobKind, JobOutcome};
use crate::service::{AnimationEncoder, ConversionService};
use crate::sprite::{trim_trailing_blank, SpriteSheet};
use anyhow::{Context, Result};
use dds_shared::common_utils::{ensure_dir_exists, file_size};
use dds_shared::{
    ConfigError, ErrorCategory, JobError, NullSink, OutcomeAggregator, OutcomeKind,
    ProgressEvent, ProgressSink, RunSummary,
};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Smallest input the conversion service is asked to handle. Anything
/// shorter cannot hold a DDS header.
pub const MIN_INPUT_SIZE: u64 = 128;

/// Shared stop flag. Cloning hands out another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Jobs in their terminal state plus the aggregated counters.
#[derive(Debug)]
pub struct DispatchReport {
    pub jobs: Vec<Job>,
    pub summary: RunSummary,
}

pub struct Dispatcher<'a> {
    concurrency: usize,
    continue_on_error: bool,
    converter: &'a dyn ConversionService,
    encoder: &'a dyn AnimationEncoder,
    sink: &'a dyn ProgressSink,
    cancel: CancelToken,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        concurrency: usize,
        continue_on_error: bool,
        converter: &'a dyn ConversionService,
        encoder: &'a dyn AnimationEncoder,
    ) -> Self {
        Self {
            concurrency,
            continue_on_error,
            converter,
            encoder,
            sink: &NullSink,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_sink(mut self, sink: &'a dyn ProgressSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run(&self, jobs: Vec<Job>) -> Result<DispatchReport> {
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency.into());
        }

        let total = jobs.len();
        let started = Instant::now();
        let workers = self.concurrency.min(total).max(1);

        let queue = Mutex::new(jobs.into_iter().collect::<VecDeque<_>>());
        let finished = Mutex::new(Vec::with_capacity(total));
        let aggregator = OutcomeAggregator::new(total);

        info!(total, workers, continue_on_error = self.continue_on_error, "Dispatch started");
        self.sink.on_event(&ProgressEvent::RunStarted { total });

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("dds-worker-{}", i))
            .build()
            .context("Failed to create worker pool")?;

        pool.scope(|s| {
            for _ in 0..workers {
                s.spawn(|_| self.worker_loop(&queue, &finished, &aggregator));
            }
        });

        let leftovers = queue.into_inner().unwrap_or_else(|e| e.into_inner());
        let mut jobs = finished.into_inner().unwrap_or_else(|e| e.into_inner());

        if !leftovers.is_empty() {
            warn!(cancelled = leftovers.len(), "Run stopped early, remaining jobs not started");
        }
        for mut job in leftovers {
            job.cancel();
            aggregator.record_cancelled();
            self.sink.on_event(&ProgressEvent::JobFinished {
                id: job.id,
                source: job.source.clone(),
                kind: OutcomeKind::Cancelled,
                detail: None,
                elapsed: Duration::ZERO,
            });
            jobs.push(job);
        }
        if self.cancel.is_cancelled() {
            aggregator.mark_aborted();
        }

        let elapsed = started.elapsed();
        self.sink.on_event(&ProgressEvent::RunFinished { elapsed });
        jobs.sort_by_key(|job| job.id);

        let summary = aggregator.finish(elapsed);
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            cancelled = summary.cancelled,
            elapsed_ms = elapsed.as_millis() as u64,
            "Dispatch finished"
        );
        Ok(DispatchReport { jobs, summary })
    }

    /// Pops the next job unless the run was stopped. Checked under the queue
    /// lock so no job is handed out after the token trips.
    fn next_job(&self, queue: &Mutex<VecDeque<Job>>) -> Option<Job> {
        let mut queue = queue.lock().unwrap_or_else(|e| e.into_inner());
        if self.cancel.is_cancelled() {
            return None;
        }
        queue.pop_front()
    }

    fn worker_loop(
        &self,
        queue: &Mutex<VecDeque<Job>>,
        finished: &Mutex<Vec<Job>>,
        aggregator: &OutcomeAggregator,
    ) {
        while let Some(mut job) = self.next_job(queue) {
            job.start();
            self.sink.on_event(&ProgressEvent::JobStarted {
                id: job.id,
                source: job.source.clone(),
            });

            let started = Instant::now();
            let outcome = self.execute(&job);
            let elapsed = started.elapsed();

            match &outcome {
                JobOutcome::Succeeded => {
                    debug!(source = %job.source.display(), elapsed_ms = elapsed.as_millis() as u64, "Job succeeded");
                    aggregator.record_success();
                }
                JobOutcome::Skipped(reason) => {
                    debug!(source = %job.source.display(), reason = %reason, "Job skipped");
                    aggregator.record_skip(job.source.clone(), reason.clone());
                }
                JobOutcome::Failed(error) => {
                    warn!(source = %job.source.display(), error = %error, category = %error.category(), "Job failed");
                    let fatal = error.category() == ErrorCategory::Fatal;
                    if fatal || !self.continue_on_error {
                        self.cancel.cancel();
                    }
                    aggregator.record_failure(job.source.clone(), error.to_string());
                }
            }

            self.sink.on_event(&ProgressEvent::JobFinished {
                id: job.id,
                source: job.source.clone(),
                kind: outcome.kind(),
                detail: outcome.detail(),
                elapsed,
            });
            job.finish(&outcome, elapsed);
            finished
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(job);
        }
    }

    /// Runs one job. Per-file errors end up in the outcome, never in a panic
    /// or an early return from the worker.
    pub fn execute(&self, job: &Job) -> JobOutcome {
        if let JobKind::Skip { reason } = &job.kind {
            return JobOutcome::Skipped(reason.clone());
        }

        for input in job.service_inputs() {
            match file_size(input) {
                Ok(size) if size < MIN_INPUT_SIZE && input == job.source => {
                    return JobOutcome::Skipped(format!(
                        "file too small to be a texture ({} bytes)",
                        size
                    ));
                }
                Ok(size) if size < MIN_INPUT_SIZE => {
                    return JobOutcome::Skipped(format!(
                        "frame {} too small to be a texture ({} bytes)",
                        input.display(),
                        size
                    ));
                }
                Ok(_) => {}
                Err(e) => return JobOutcome::Failed(JobError::io(input, e)),
            }
        }

        match self.run_job(job) {
            Ok(()) => JobOutcome::Succeeded,
            Err(e) => JobOutcome::Failed(e),
        }
    }

    fn run_job(&self, job: &Job) -> Result<(), JobError> {
        let Some(output) = job.output.as_deref() else {
            return Ok(());
        };
        if let Some(parent) = output.parent() {
            ensure_dir_exists(parent).map_err(|e| JobError::io(parent, e))?;
        }

        match &job.kind {
            JobKind::Convert { format } => self.converter.convert(&job.source, output, *format),
            JobKind::Animate {
                frames,
                format,
                delay_ms,
            } => self.run_sequence(frames, *format, *delay_ms, output),
            JobKind::SpriteSheet {
                sheet,
                format,
                delay_ms,
            } => self.run_sprite_sheet(&job.source, sheet, *format, *delay_ms, output),
            JobKind::Skip { .. } => Ok(()),
        }
    }

    /// Encodes a frame sequence. DDS frames are first decoded to PNG in a
    /// private staging directory, one texconv call per frame, in order.
    fn run_sequence(
        &self,
        frames: &[PathBuf],
        format: AnimationFormat,
        delay_ms: u32,
        output: &Path,
    ) -> Result<(), JobError> {
        if !frames.iter().any(|frame| is_texture(frame)) {
            return self.encoder.encode(frames, delay_ms, format, output);
        }

        let staging = tempfile::Builder::new()
            .prefix("dds-converter-frames-")
            .tempdir()
            .map_err(|e| JobError::io(std::env::temp_dir(), e))?;

        let mut staged = Vec::with_capacity(frames.len());
        for (index, frame) in frames.iter().enumerate() {
            if is_texture(frame) {
                let decoded = staging.path().join(format!("frame_{:04}.png", index));
                self.converter.convert(frame, &decoded, OutputFormat::Png)?;
                staged.push(decoded);
            } else {
                staged.push(frame.clone());
            }
        }
        debug!(frames = staged.len(), "Decoded DDS frames");

        self.encoder.encode(&staged, delay_ms, format, output)
    }

    /// Decodes the atlas through the conversion service, cuts it along the
    /// sheet's cells and encodes the frames.
    fn run_sprite_sheet(
        &self,
        texture: &Path,
        sheet_path: &Path,
        format: AnimationFormat,
        delay_ms: u32,
        output: &Path,
    ) -> Result<(), JobError> {
        let sheet = SpriteSheet::from_file(sheet_path)?;

        let staging = tempfile::Builder::new()
            .prefix("dds-converter-sprite-")
            .tempdir()
            .map_err(|e| JobError::io(std::env::temp_dir(), e))?;

        let decoded = staging.path().join(decoded_name(texture));
        self.converter.convert(texture, &decoded, OutputFormat::Png)?;
        let atlas = image::open(&decoded)
            .map_err(|e| JobError::image(&decoded, e))?
            .to_rgba8();

        let mut frames = sheet.extract_frames(&atlas);
        if frames.is_empty() {
            return Err(JobError::SpriteSheet {
                path: sheet_path.to_path_buf(),
                reason: format!(
                    "none of {} cell(s) covers any pixels of a {}x{} texture",
                    sheet.cells.len(),
                    atlas.width(),
                    atlas.height()
                ),
            });
        }
        if trim_trailing_blank(&mut frames) {
            debug!(texture = %texture.display(), "Dropped blank trailing frame");
        }

        let mut paths: Vec<PathBuf> = Vec::with_capacity(frames.len());
        for (index, frame) in frames.iter().enumerate() {
            let path = staging.path().join(format!("cell_{:04}.png", index));
            frame.save(&path).map_err(|e| JobError::image(&path, e))?;
            paths.push(path);
        }

        self.encoder.encode(&paths, delay_ms, format, output)
    }
}

/// File name texconv gives a PNG decoded from `texture`: its stem plus `.png`.
fn decoded_name(texture: &Path) -> OsString {
    let mut name = texture
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| OsString::from("texture"));
    name.push(".png");
    name
}
