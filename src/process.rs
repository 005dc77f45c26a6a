//! Process plumbing for tsk
//!
//! Builds commands from their configured form and provides the platform
//! capability used to forcibly terminate a supervised process.

use serde::Deserialize;
use std::fmt;
use std::io;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;

/// A configured command: either an argument vector or a shell line
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CommandLine {
    /// Spawned directly, first element is the program
    Args(Vec<String>),
    /// Run through the platform shell
    Shell(String),
}

impl CommandLine {
    /// True when there is no program to run
    pub fn is_empty(&self) -> bool {
        match self {
            CommandLine::Args(args) => args.first().is_none_or(|p| p.trim().is_empty()),
            CommandLine::Shell(line) => line.trim().is_empty(),
        }
    }

    /// Build a `Command` for this line, or `None` if it is empty
    pub fn to_command(&self) -> Option<Command> {
        if self.is_empty() {
            return None;
        }
        let command = match self {
            CommandLine::Args(args) => {
                let (program, rest) = args.split_first()?;
                let mut cmd = Command::new(program);
                cmd.args(rest);
                cmd
            }
            CommandLine::Shell(line) => shell_command(line),
        };
        Some(command)
    }

    /// Build a command with its output sent to `log` and run from `cwd`
    pub fn prepare(&self, cwd: Option<&Path>, log: &std::fs::File) -> io::Result<Command> {
        let mut cmd = self.to_command().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "command is empty")
        })?;

        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        // stdout and stderr share one file description, so the output
        // interleaves in the order it was written.
        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log.try_clone()?));

        Ok(cmd)
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandLine::Args(args) => write!(f, "{}", args.join(" ")),
            CommandLine::Shell(line) => write!(f, "{}", line),
        }
    }
}

impl From<Vec<String>> for CommandLine {
    fn from(args: Vec<String>) -> Self {
        CommandLine::Args(args)
    }
}

impl From<&[&str]> for CommandLine {
    fn from(args: &[&str]) -> Self {
        CommandLine::Args(args.iter().map(|a| a.to_string()).collect())
    }
}

impl From<&str> for CommandLine {
    fn from(line: &str) -> Self {
        CommandLine::Shell(line.to_string())
    }
}

#[cfg(windows)]
fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.args(["/C", line]);
    cmd
}

#[cfg(not(windows))]
fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", line]);
    cmd
}

/// Forced termination of a supervised process.
///
/// `force_kill_tree` is tried first and may fail; `signal_kill` is always
/// sent afterwards so the handle itself observes the process as gone.
pub trait Killer: Send + Sync {
    /// Terminate the process and its descendants through the OS
    fn force_kill_tree(&self, pid: u32) -> io::Result<()>;

    /// Deliver a kill signal through the process handle
    fn signal_kill(&self, child: &mut Child) -> io::Result<()> {
        match child.kill() {
            // Already reaped
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            other => other,
        }
    }
}

/// Killer for platforms where the handle's kill signal is sufficient
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalOnly;

impl Killer for SignalOnly {
    fn force_kill_tree(&self, _pid: u32) -> io::Result<()> {
        Ok(())
    }
}

/// Killer that runs `taskkill /F /T` before signalling the handle
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeKill;

impl Killer for TreeKill {
    fn force_kill_tree(&self, pid: u32) -> io::Result<()> {
        let status = Command::new("taskkill")
            .args(["/F", "/T", "/PID", &pid.to_string()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;

        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!("taskkill exited with {}", status)))
        }
    }
}

/// The kill capability for the platform this binary was built for
pub fn platform_killer() -> Arc<dyn Killer> {
    if cfg!(windows) {
        Arc::new(TreeKill)
    } else {
        Arc::new(SignalOnly)
    }
}
