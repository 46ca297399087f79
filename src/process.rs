//! OS process table access.
//!
//! The terminator only needs three things from the OS: a textual listing
//! with one line per process, a way to pull the pid out of a line, and a
//! forced kill. [`ProcessTable`] is that seam; [`SystemProcessTable`] backs
//! it with `ps`/`kill(2)` on Unix and `tasklist`/`taskkill` on Windows.

use std::process::Command;

use regex::Regex;

use crate::{AppError, Result};

/// Leading pid column of `ps -eo pid=,args=`.
const PS_PID_PATTERN: &str = r"^\s*(\d+)\s";

/// Pid column of `tasklist /NH`: the first number after the image name,
/// followed by the session name and number.
const TASKLIST_PID_PATTERN: &str = r"^.*?\s+(\d+)\s+\S+\s+\d+\s";

/// Process listing, pid extraction, and forced termination.
pub trait ProcessTable {
    /// One line per running process.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the listing cannot be obtained.
    fn list(&self) -> Result<Vec<String>>;

    /// Process identifier on a listing line, if any.
    fn parse_pid(&self, line: &str) -> Option<u32>;

    /// Forcefully terminate `pid`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Termination` if the OS refuses or the process is
    /// already gone.
    fn kill(&self, pid: u32) -> Result<()>;
}

/// Compiled pid extraction rule for one listing format.
#[derive(Debug, Clone)]
pub struct PidPattern(Regex);

impl PidPattern {
    /// Pattern for `ps -eo pid=,args=` output.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the pattern fails to compile.
    pub fn ps() -> Result<Self> {
        Self::compile(PS_PID_PATTERN)
    }

    /// Pattern for `tasklist /NH` output.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the pattern fails to compile.
    pub fn tasklist() -> Result<Self> {
        Self::compile(TASKLIST_PID_PATTERN)
    }

    fn compile(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|err| AppError::Config(format!("bad pid pattern: {err}")))
    }

    /// Extract the pid from `line`.
    #[must_use]
    pub fn extract(&self, line: &str) -> Option<u32> {
        self.0
            .captures(line)
            .and_then(|caps| caps.get(1))
            .and_then(|pid| pid.as_str().parse().ok())
    }
}

/// The live process table of this machine.
#[derive(Debug, Clone)]
pub struct SystemProcessTable {
    pattern: PidPattern,
}

impl SystemProcessTable {
    /// Build a table using the platform's listing format.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the pid pattern fails to compile.
    pub fn new() -> Result<Self> {
        let pattern = if cfg!(windows) {
            PidPattern::tasklist()?
        } else {
            PidPattern::ps()?
        };
        Ok(Self { pattern })
    }
}

impl ProcessTable for SystemProcessTable {
    fn list(&self) -> Result<Vec<String>> {
        let mut cmd = if cfg!(windows) {
            let mut cmd = Command::new("tasklist");
            cmd.arg("/NH");
            cmd
        } else {
            let mut cmd = Command::new("ps");
            cmd.args(["-eo", "pid=,args="]);
            cmd
        };

        let output = cmd
            .output()
            .map_err(|err| AppError::Io(format!("failed to list processes: {err}")))?;
        if !output.status.success() {
            return Err(AppError::Io(format!(
                "process listing exited with {}",
                output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_owned)
            .collect())
    }

    fn parse_pid(&self, line: &str) -> Option<u32> {
        self.pattern.extract(line)
    }

    #[cfg(unix)]
    fn kill(&self, pid: u32) -> Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid)
            .map_err(|_| AppError::Termination(format!("pid {pid} out of range")))?;
        kill(Pid::from_raw(raw), Signal::SIGKILL)
            .map_err(|errno| AppError::Termination(format!("kill {pid}: {errno}")))
    }

    #[cfg(not(unix))]
    fn kill(&self, pid: u32) -> Result<()> {
        let status = Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/F"])
            .status()
            .map_err(|err| AppError::Termination(format!("taskkill {pid}: {err}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(AppError::Termination(format!(
                "taskkill {pid} exited with {status}"
            )))
        }
    }
}
