//! texconv-backed conversion service
//!
//! DirectXTex `texconv` does the actual DDS decoding. This module finds it,
//! checks it once, and maps its exit status and chatter onto `JobError`s.

use crate::formats::OutputFormat;
use crate::service::ConversionService;
use crate::tools::{summarize_output, ToolCommand};
use dds_shared::{ConfigError, JobError};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const TOOL_NAME: &str = "texconv";

const DDS_MAGIC: &[u8; 4] = b"DDS ";

const INSTALL_HINT: &str = "put texconv on PATH, next to dds-converter, \
    or pass --texconv <path> / set TEXCONV_PATH";

pub struct TexconvService {
    command: ToolCommand,
}

impl TexconvService {
    pub fn new(command: ToolCommand) -> Self {
        Self { command }
    }

    /// Locates texconv and verifies that it starts.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let service = Self::new(locate_texconv(explicit)?);
        service.probe()?;
        info!(command = %service.command.describe(), "Using texconv");
        Ok(service)
    }

    pub fn command(&self) -> &ToolCommand {
        &self.command
    }

    /// `texconv -h` exits with 1 on most builds, so 0 and 1 both count as usable.
    pub fn probe(&self) -> Result<(), ConfigError> {
        let unusable = |reason: String| ConfigError::ToolUnusable {
            tool: TOOL_NAME.to_string(),
            path: self.command.program().to_path_buf(),
            reason,
        };

        let run = self.command.run(["-h"]).map_err(|e| unusable(e.to_string()))?;
        match run.exit_code {
            Some(0) | Some(1) => Ok(()),
            code => Err(unusable(format!(
                "unexpected exit code {:?}: {}",
                code,
                summarize_output(&run.combined())
            ))),
        }
    }

    fn arguments(input: &Path, out_dir: &Path, format: OutputFormat) -> Vec<OsString> {
        vec![
            "-nologo".into(),
            "-f".into(),
            format.pixel_format().into(),
            "-ft".into(),
            format.texconv_file_type().into(),
            "-y".into(),
            "-o".into(),
            out_dir.as_os_str().to_owned(),
            input.as_os_str().to_owned(),
        ]
    }
}

impl ConversionService for TexconvService {
    fn convert(&self, input: &Path, output: &Path, format: OutputFormat) -> Result<(), JobError> {
        check_dds_header(input)?;

        let out_dir = output.parent().unwrap_or_else(|| Path::new("."));
        let run = self
            .command
            .run(Self::arguments(input, out_dir, format))?;

        if !run.success {
            return Err(classify_failure(input, run.exit_code, &run.combined()));
        }

        let written = written_path(input, out_dir, format);
        if !written.exists() {
            return Err(JobError::MissingOutput { path: written });
        }
        if written != output {
            fs::rename(&written, output).map_err(|e| JobError::io(&written, e))?;
        }

        debug!(input = %input.display(), output = %output.display(), "texconv finished");
        Ok(())
    }
}

/// Where texconv puts its result: `<out_dir>/<input stem>.<canonical type>`.
fn written_path(input: &Path, out_dir: &Path, format: OutputFormat) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default();
    let mut name = stem.to_os_string();
    name.push(".");
    name.push(format.texconv_file_type());
    out_dir.join(name)
}

/// Rejects files that do not start with the `DDS ` magic before spawning anything.
pub fn check_dds_header(path: &Path) -> Result<(), JobError> {
    let mut file = File::open(path).map_err(|e| JobError::io(path, e))?;
    let mut magic = [0u8; 4];
    match file.read_exact(&mut magic) {
        Ok(()) if &magic == DDS_MAGIC => Ok(()),
        Ok(()) => Err(JobError::InvalidHeader {
            path: path.to_path_buf(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(JobError::InvalidHeader {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(JobError::io(path, e)),
    }
}

/// Maps texconv's failure output onto a typed error.
///
/// texconv prints HRESULTs such as `8007000d` (invalid data) or
/// `80070032` (not supported) next to `FAILED`.
pub fn classify_failure(input: &Path, exit_code: Option<i32>, output: &str) -> JobError {
    let lower = output.to_lowercase();
    let detail = summarize_output(output);

    if lower.contains("not supported")
        || lower.contains("not_supported")
        || lower.contains("unsupported")
        || lower.contains("80070032")
    {
        JobError::UnsupportedPixelFormat {
            path: input.to_path_buf(),
            detail,
        }
    } else if lower.contains("invalid")
        || lower.contains("corrupt")
        || lower.contains("8007000d")
    {
        JobError::InvalidHeader {
            path: input.to_path_buf(),
        }
    } else {
        JobError::ToolFailed {
            tool: TOOL_NAME.to_string(),
            exit_code,
            stderr: detail,
        }
    }
}

/// Lookup order: explicit path, `texconv`/`texconv.exe` on PATH, then next
/// to the running executable.
pub fn locate_texconv(explicit: Option<&Path>) -> Result<ToolCommand, ConfigError> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(ConfigError::ToolNotFound {
                tool: TOOL_NAME.to_string(),
                hint: format!("{} does not exist", path.display()),
            });
        }
        return launcher_for(path);
    }

    for name in ["texconv", "texconv.exe"] {
        if let Ok(found) = which::which(name) {
            debug!(path = %found.display(), "Found texconv on PATH");
            return launcher_for(&found);
        }
    }

    if let Some(found) = beside_current_exe() {
        debug!(path = %found.display(), "Found texconv next to executable");
        return launcher_for(&found);
    }

    Err(ConfigError::ToolNotFound {
        tool: TOOL_NAME.to_string(),
        hint: INSTALL_HINT.to_string(),
    })
}

fn beside_current_exe() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let dir = exe.parent()?;
    ["texconv.exe", "texconv"]
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Windows binaries go through wine on other hosts.
fn launcher_for(path: &Path) -> Result<ToolCommand, ConfigError> {
    let is_exe = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("exe"))
        .unwrap_or(false);

    if cfg!(windows) || !is_exe {
        return Ok(ToolCommand::new(TOOL_NAME, path));
    }

    match which::which("wine") {
        Ok(wine) => Ok(ToolCommand::with_launcher(TOOL_NAME, wine, path)),
        Err(_) => Err(ConfigError::ToolUnusable {
            tool: TOOL_NAME.to_string(),
            path: path.to_path_buf(),
            reason: "a Windows executable needs wine on PATH on this host".to_string(),
        }),
    }
}
