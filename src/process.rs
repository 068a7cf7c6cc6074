//! Running external tools (`docker`, `dpkg-deb`, `df`).
//!
//! A small builder over [`std::process::Command`] so call sites read as one
//! expression and failures carry the full command line.
//!
//! ```rust,ignore
//! Cmd::new("dpkg-deb")
//!     .arg("-x")
//!     .arg_path(&deb)
//!     .arg_path(&sdk_dir)
//!     .error_msg("failed to unpack package")
//!     .run()?;
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{GeneratorError, Result};

/// Output of a finished command.
#[derive(Debug, Clone)]
pub struct CmdResult {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CmdResult {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Command builder.
#[derive(Debug)]
pub struct Cmd {
    program: String,
    args: Vec<OsString>,
    error_msg: Option<String>,
    allow_fail: bool,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            error_msg: None,
            allow_fail: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.as_os_str().to_owned());
        self
    }

    /// Message prefixed to the error if the command fails.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    /// Return the result instead of an error on a non-zero exit.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Render the command line for messages.
    pub fn display(&self) -> String {
        let mut s = self.program.clone();
        for arg in &self.args {
            s.push(' ');
            s.push_str(&arg.to_string_lossy());
        }
        s
    }

    /// Run the command, capturing stdout and stderr.
    pub fn run(self) -> Result<CmdResult> {
        tracing::debug!(command = %self.display(), "running");

        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| GeneratorError::Command {
                command: self.display(),
                message: format!("failed to spawn: {}", e),
            })?;

        let result = CmdResult {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() && !self.allow_fail {
            let detail = match result.status {
                Some(code) => format!("exit status {}: {}", code, result.stderr.trim()),
                None => "terminated by signal".to_string(),
            };
            let message = match &self.error_msg {
                Some(msg) => format!("{} ({})", msg, detail),
                None => detail,
            };
            return Err(GeneratorError::Command {
                command: self.display(),
                message,
            });
        }

        Ok(result)
    }
}

/// Find a tool on `PATH`.
pub fn which(tool: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(tool))
        .find(|candidate| is_executable(candidate))
}

/// Check whether a tool is available on `PATH`.
pub fn exists(tool: &str) -> bool {
    which(tool).is_some()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
