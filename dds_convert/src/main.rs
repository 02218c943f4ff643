use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use dds_convert::conversion_api::{self, Mode, RunOptions, DEFAULT_CONCURRENCY, DEFAULT_FRAME_DELAY_MS};
use dds_convert::texconv::{self, TexconvService};
use dds_convert::{AnimationFormat, CancelToken, ConversionService, FrameEncoder, OutputFormat, Unavailable};
use dds_shared::{
    init_logging, print_summary_report, ConsoleProgress, LogConfig, RunReport, RunStatus,
    FILE_ONLY_TARGET,
};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "dds-converter")]
#[command(
    version,
    about = "Batch DDS texture converter (via texconv) and frame sequence animator",
    long_about = None
)]
struct Cli {
    /// Input directory, searched recursively
    #[arg(short, long, value_name = "DIR")]
    input: PathBuf,

    /// Output directory; the input layout is recreated below it
    #[arg(short, long, value_name = "DIR")]
    output: PathBuf,

    /// Target image format: png, jpg, jpeg, bmp, tga, dds, tiff or hdr
    #[arg(short, long, default_value = "png")]
    format: OutputFormat,

    /// Leading directory levels dropped from each relative path
    #[arg(short, long, default_value_t = 0)]
    strip_segments: usize,

    /// Jobs running at the same time
    #[arg(short, long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Print the planned jobs and exit without converting anything
    #[arg(short, long)]
    dry_run: bool,

    #[arg(short, long)]
    verbose: bool,

    /// Keep going after a failed file
    #[arg(long)]
    continue_on_error: bool,

    /// Assemble frame sequences (png, dds, jpg, bmp, tga) and sprite sheets into animations
    #[arg(long)]
    animation_mode: bool,

    /// Animation container: gif or webp (webp needs ffmpeg)
    #[arg(long, default_value = "gif")]
    animation_format: AnimationFormat,

    /// Delay between animation frames
    #[arg(long, value_name = "MS", default_value_t = DEFAULT_FRAME_DELAY_MS)]
    frame_delay: u32,

    /// Path to texconv(.exe)
    #[arg(long, env = "TEXCONV_PATH", value_name = "PATH")]
    texconv: Option<PathBuf>,

    /// Machine-readable plan and summary on stdout
    #[arg(long)]
    json: bool,

    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

impl Cli {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            mode: if self.animation_mode {
                Mode::Animate
            } else {
                Mode::Convert
            },
            format: self.format,
            animation_format: self.animation_format,
            frame_delay_ms: self.frame_delay,
            strip_segments: self.strip_segments,
            concurrency: self.concurrency,
            dry_run: self.dry_run,
            verbose: self.verbose,
            continue_on_error: self.continue_on_error,
            json: self.json,
            ..RunOptions::new(&self.input, &self.output)
        }
    }
}

/// `--help` and `--version` exit 0; usage errors exit 1 so they never read
/// as a partial success.
fn usage_exit_code(error: &clap::Error) -> i32 {
    if error.use_stderr() {
        RunStatus::EXIT_FAILURE
    } else {
        RunStatus::EXIT_SUCCESS
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = usage_exit_code(&e);
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let mut log_config = LogConfig::default();
    if cli.verbose {
        log_config = log_config.verbose();
    }
    if let Some(dir) = &cli.log_dir {
        log_config = log_config.with_log_dir(dir);
    }
    let _ = init_logging("dds_converter", log_config);

    match run(&cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!(target: FILE_ONLY_TARGET, error = %format!("{:#}", e), "Run aborted");
            eprintln!("{} {:#}", style("❌").red().bold(), e);
            std::process::exit(RunStatus::EXIT_FAILURE);
        }
    }
}

fn run(cli: &Cli) -> Result<i32> {
    let options = cli.run_options();
    info!(
        input = %options.input.display(),
        output = %options.output.display(),
        mode = options.mode.label(),
        concurrency = options.concurrency,
        dry_run = options.dry_run,
        "dds-converter started"
    );

    let plan = conversion_api::plan(&options)?;

    if options.dry_run {
        if options.json {
            println!("{}", plan.to_json().context("Failed to serialize plan")?);
        } else {
            plan.print();
            println!("\n🔍 Dry run: nothing was converted");
        }
        return Ok(RunStatus::EXIT_SUCCESS);
    }

    let converter: Box<dyn ConversionService> = if plan.needs_converter() {
        Box::new(TexconvService::discover(cli.texconv.as_deref())?)
    } else {
        Box::new(Unavailable {
            tool: texconv::TOOL_NAME,
        })
    };
    let encoder = match options.mode {
        Mode::Animate => FrameEncoder::discover(options.animation_format)?,
        Mode::Convert => FrameEncoder::gif_only(),
    };

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupted");
        eprintln!("\n⚠️  Interrupted: letting running jobs finish, starting no new ones");
        on_interrupt.cancel();
    })
    .context("Failed to install Ctrl-C handler")?;

    let mode = plan.mode;
    if options.verbose && !options.json {
        println!(
            "🔄 {}: {} job(s), {} worker(s)",
            mode.operation_name(),
            plan.jobs.len(),
            options.concurrency
        );
    }
    let progress = if options.json {
        ConsoleProgress::hidden(false)
    } else {
        ConsoleProgress::new(mode.label(), options.verbose)
    };

    let outcome = conversion_api::run_plan(
        plan,
        &options,
        converter.as_ref(),
        &encoder,
        &progress,
        cancel,
    )?;

    let summary = &outcome.report.summary;
    if options.json {
        let report = RunReport::new(mode.label(), outcome.status, summary);
        println!("{}", report.to_json().context("Failed to serialize report")?);
    } else {
        print_summary_report(summary, outcome.status, mode.operation_name());
    }

    Ok(outcome.exit_code())
}
