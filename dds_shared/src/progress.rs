//! Progress Module
//!
//! The orchestration core never touches the terminal. It emits
//! `ProgressEvent`s into a `ProgressSink` handed to it by the caller;
//! `ConsoleProgress` is the indicatif-backed sink used by the binary.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

pub mod progress_style {
    /// indicatif needs 3 characters: filled, current, empty
    pub const PROGRESS_CHARS: &str = "█▓░";

    pub const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

    pub const BATCH_TEMPLATE: &str = "{spinner:.green} {prefix:.cyan.bold} ▕{bar:35.green/black}▏ {percent:>3}% • {pos}/{len} • ⏱️ {elapsed_precise} (ETA: {eta}) • {msg}";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

impl OutcomeKind {
    pub fn icon(self) -> &'static str {
        match self {
            OutcomeKind::Succeeded => "✅",
            OutcomeKind::Failed => "❌",
            OutcomeKind::Skipped => "⏭️",
            OutcomeKind::Cancelled => "⛔",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    RunStarted {
        total: usize,
    },
    JobStarted {
        id: usize,
        source: PathBuf,
    },
    JobFinished {
        id: usize,
        source: PathBuf,
        kind: OutcomeKind,
        detail: Option<String>,
        elapsed: Duration,
    },
    RunFinished {
        elapsed: Duration,
    },
}

/// Receiver of progress events. Called concurrently from worker threads.
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

/// Discards every event.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_event(&self, _event: &ProgressEvent) {}
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_event(&self, event: &ProgressEvent) {
        self(event)
    }
}

pub fn create_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(progress_style::BATCH_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(progress_style::PROGRESS_CHARS)
        .tick_chars(progress_style::SPINNER_CHARS);
    pb.set_style(style);
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Terminal sink: one bar for the whole run, plus a line per job when verbose.
pub struct ConsoleProgress {
    bar: ProgressBar,
    verbose: bool,
}

impl ConsoleProgress {
    pub fn new(prefix: &str, verbose: bool) -> Self {
        Self {
            bar: create_progress_bar(0, prefix),
            verbose,
        }
    }

    /// Same event handling with nothing drawn.
    pub fn hidden(verbose: bool) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_draw_target(ProgressDrawTarget::hidden());
        Self { bar, verbose }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl ProgressSink for ConsoleProgress {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::RunStarted { total } => {
                self.bar.set_length(*total as u64);
                self.bar.set_position(0);
            }
            ProgressEvent::JobStarted { source, .. } => {
                let name = display_name(source);
                if self.verbose {
                    self.bar.println(format!("▶️  {}", source.display()));
                }
                self.bar.set_message(name);
            }
            ProgressEvent::JobFinished {
                source,
                kind,
                detail,
                elapsed,
                ..
            } => {
                if self.verbose {
                    let mut line = format!(
                        "{} {} ({})",
                        kind.icon(),
                        source.display(),
                        format_duration(*elapsed)
                    );
                    if let Some(detail) = detail {
                        line.push(' ');
                        line.push_str(detail);
                    }
                    self.bar.println(line);
                }
                self.bar.inc(1);
            }
            ProgressEvent::RunFinished { .. } => {
                self.bar.finish_and_clear();
            }
        }
    }
}

fn display_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// `1h 2m 3s`, `2m 3s`, `3s`, or milliseconds below one second.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs >= 1 {
        format!("{}s", secs)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_closure_sink_receives_events() {
        let seen = Mutex::new(Vec::new());
        let sink = |event: &ProgressEvent| {
            seen.lock().unwrap().push(format!("{:?}", event));
        };
        sink.on_event(&ProgressEvent::RunStarted { total: 2 });
        sink.on_event(&ProgressEvent::RunFinished {
            elapsed: Duration::ZERO,
        });
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_console_progress_counts_finished_jobs() {
        let progress = ConsoleProgress::hidden(true);
        progress.on_event(&ProgressEvent::RunStarted { total: 3 });
        for id in 0..3 {
            progress.on_event(&ProgressEvent::JobStarted {
                id,
                source: PathBuf::from(format!("{}.dds", id)),
            });
            progress.on_event(&ProgressEvent::JobFinished {
                id,
                source: PathBuf::from(format!("{}.dds", id)),
                kind: OutcomeKind::Succeeded,
                detail: None,
                elapsed: Duration::from_millis(3),
            });
        }
        assert_eq!(progress.position(), 3);
        progress.on_event(&ProgressEvent::RunFinished {
            elapsed: Duration::from_millis(9),
        });
    }

    #[test]
    fn test_null_sink_is_silent() {
        NullSink.on_event(&ProgressEvent::RunStarted { total: 1 });
    }
}
