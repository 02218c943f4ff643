//! External tool invocation
//!
//! A `ToolCommand` is a located executable plus any launcher in front of
//! it (`wine texconv.exe` on non-Windows hosts). Every run is logged with
//! its command line, exit code and duration.

use dds_shared::logging::{combine_output, log_external_tool};
use dds_shared::JobError;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    name: String,
    program: PathBuf,
    leading_args: Vec<OsString>,
}

/// Finished run of a tool, stdout and stderr already decoded.
#[derive(Debug)]
pub struct ToolRun {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolRun {
    fn from_output(output: Output) -> Self {
        Self {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }

    pub fn combined(&self) -> String {
        combine_output(&self.stdout, &self.stderr)
    }
}

impl ToolCommand {
    pub fn new(name: &str, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Runs `tool` through `launcher`, e.g. `wine texconv.exe ...`.
    pub fn with_launcher(name: &str, launcher: impl Into<PathBuf>, tool: &Path) -> Self {
        Self {
            name: name.to_string(),
            program: launcher.into(),
            leading_args: vec![tool.as_os_str().to_owned()],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Human-readable form for logs and `--verbose`.
    pub fn describe(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(
            self.leading_args
                .iter()
                .map(|a| a.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }

    /// Runs the tool to completion. Only a failure to spawn is an `Err`;
    /// a non-zero exit is reported through `ToolRun`.
    pub fn run<I, S>(&self, args: I) -> Result<ToolRun, JobError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        let started = Instant::now();

        let output = Command::new(&self.program)
            .args(&self.leading_args)
            .args(&args)
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => JobError::ToolNotFound {
                    tool: self.name.clone(),
                },
                _ => JobError::io(&self.program, e),
            })?;

        let run = ToolRun::from_output(output);
        let logged_args: Vec<String> = self
            .leading_args
            .iter()
            .chain(args.iter())
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        log_external_tool(
            &self.program.display().to_string(),
            &logged_args,
            &run.combined(),
            run.exit_code,
            started.elapsed(),
        );
        Ok(run)
    }
}

/// Most telling line of a tool's output: the last one mentioning an error
/// or failure, else the last non-empty line.
pub fn summarize_output(output: &str) -> String {
    if let Some(line) = output.lines().rev().find(|line| {
        let lower = line.to_lowercase();
        lower.contains("error") || lower.contains("failed")
    }) {
        return line.trim().to_string();
    }

    output
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with("frame="))
        .map(str::to_string)
        .unwrap_or_else(|| "no output".to_string())
}
