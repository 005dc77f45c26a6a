//! Supervision of a single external command
//!
//! A [`ProcessSupervisor`] owns one command's child process and the log file
//! its output goes to. Runs cycle through start, graceful stop or kill, and
//! log closure; the supervisor itself lives for the whole program.

use crate::config::{ProcessConfig, expand_home};
use crate::constants::EXIT_POLL_INTERVAL;
use crate::error::{Result, TskError};
use crate::logs::{LogRotator, NumberedRotation, log_path};
use crate::process::{CommandLine, Killer, platform_killer};
use chrono::{DateTime, Local};
use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Operator-visible state of a supervised process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    NotStarted,
    Running,
    StopIssued,
    Stopped(i32),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::NotStarted => write!(f, "Not Started"),
            Status::Running => write!(f, "Running"),
            Status::StopIssued => write!(f, "Stop Issued"),
            Status::Stopped(code) => write!(f, "Stopped (Code {})", code),
        }
    }
}

enum RunState {
    NeverSpawned,
    Alive,
    Exited(i32),
}

/// Supervisor for one external command and its log file
pub struct ProcessSupervisor {
    name: String,
    start_command: CommandLine,
    stop_command: Option<CommandLine>,
    working_dir: Option<PathBuf>,
    log_file: PathBuf,
    log_retention: usize,
    stop_timeout: Option<Duration>,
    kill_on_timeout: bool,
    child: Option<Child>,
    stop_processes: Vec<Child>,
    log: Option<File>,
    stop_requested: bool,
    last_started: Option<DateTime<Local>>,
    rotator: Arc<dyn LogRotator>,
    killer: Arc<dyn Killer>,
}

impl ProcessSupervisor {
    /// Build a supervisor logging to `<log_dir>/<name>.log`
    pub fn new(config: &ProcessConfig, log_dir: &Path) -> Result<Self> {
        if config.cmd.is_empty() {
            return Err(TskError::EmptyCommand(config.name.clone()));
        }

        Ok(Self {
            name: config.name.clone(),
            start_command: config.cmd.clone(),
            stop_command: config.stop.clone(),
            working_dir: config.cwd.as_deref().map(expand_home),
            log_file: log_path(log_dir, &config.name),
            log_retention: config.log_archive,
            stop_timeout: config.stop_timeout(),
            kill_on_timeout: config.kill_on_timeout,
            child: None,
            stop_processes: Vec::new(),
            log: None,
            stop_requested: false,
            last_started: None,
            rotator: Arc::new(NumberedRotation),
            killer: platform_killer(),
        })
    }

    pub fn with_rotator(mut self, rotator: Arc<dyn LogRotator>) -> Self {
        self.rotator = rotator;
        self
    }

    pub fn with_killer(mut self, killer: Arc<dyn Killer>) -> Self {
        self.killer = killer;
        self
    }

    /// Bound the wait after a stop command; `None` waits until exit
    pub fn with_stop_timeout(mut self, timeout: Option<Duration>, kill_on_timeout: bool) -> Self {
        self.stop_timeout = timeout;
        self.kill_on_timeout = kill_on_timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    pub fn last_started(&self) -> Option<DateTime<Local>> {
        self.last_started
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// PID of the current run while it is alive
    pub fn pid(&mut self) -> Option<u32> {
        match self.run_state() {
            RunState::Alive => self.child.as_ref().map(Child::id),
            _ => None,
        }
    }

    /// Current state, polled from the child on every call
    pub fn status(&mut self) -> Status {
        match self.run_state() {
            RunState::NeverSpawned => Status::NotStarted,
            RunState::Exited(code) => Status::Stopped(code),
            RunState::Alive if self.stop_requested => Status::StopIssued,
            RunState::Alive => Status::Running,
        }
    }

    /// True if nothing was ever spawned or the latest run has exited
    pub fn stopped(&mut self) -> bool {
        !matches!(self.run_state(), RunState::Alive)
    }

    /// True while a log file is held open
    pub fn logging(&self) -> bool {
        self.log.is_some()
    }

    /// Start if stopped, otherwise stop
    pub fn toggle(&mut self) -> Result<()> {
        if self.stopped() { self.start() } else { self.stop() }
    }

    /// Start a fresh run; a no-op if one is already alive
    pub fn start(&mut self) -> Result<()> {
        self.reap_stop_processes();

        if !self.stopped() {
            let pid = self.pid();
            tracing::info!(process = %self.name, ?pid, "{} is already running!", self.name);
            return Ok(());
        }

        let mut log = match self.log.take() {
            Some(log) => log,
            None => self.open_fresh_log()?,
        };

        tracing::info!(process = %self.name, "Starting {}...", self.name);
        self.stop_requested = false;

        let spawned = self
            .start_command
            .prepare(self.working_dir.as_deref(), &log)
            .and_then(|mut cmd| cmd.spawn());

        match spawned {
            Ok(child) => {
                tracing::debug!(process = %self.name, pid = child.id(), "spawned {}", self.start_command);
                self.child = Some(child);
                self.log = Some(log);
                self.last_started = Some(Local::now());
                Ok(())
            }
            Err(source) => {
                // No run was started, so the log is released straight away.
                let _ = writeln!(log, "[tsk] failed to start {}: {}", self.name, source);
                let _ = log.flush();
                Err(TskError::Spawn {
                    process: self.name.clone(),
                    source,
                })
            }
        }
    }

    /// Ask the process to stop, or kill it if asking is not possible
    pub fn stop(&mut self) -> Result<()> {
        self.reap_stop_processes();

        if self.stopped() {
            return self.close_log();
        }

        let Some(stop_command) = self.stop_command.as_ref().filter(|_| !self.stop_requested) else {
            tracing::info!(process = %self.name, "Killing {} command...", self.name);
            return self.kill();
        };

        self.stop_requested = true;
        tracing::info!(process = %self.name, "Issuing stop command for {}...", self.name);

        let spawned = match self.log.as_ref() {
            Some(log) => stop_command
                .prepare(self.working_dir.as_deref(), log)
                .and_then(|mut cmd| cmd.spawn()),
            None => Err(io::Error::other("log file is not open")),
        };

        match spawned {
            Ok(stopper) => self.stop_processes.push(stopper),
            Err(e) => {
                tracing::warn!(process = %self.name, "stop command for {} failed ({}), killing instead", self.name, e);
                return self.kill();
            }
        }

        if self.finish_run(self.stop_timeout)? {
            return Ok(());
        }

        if self.kill_on_timeout {
            tracing::warn!(process = %self.name, "{} did not exit in time, killing", self.name);
            self.kill()
        } else {
            tracing::info!(process = %self.name, "{} has not exited yet; stop it again to kill", self.name);
            Ok(())
        }
    }

    /// Forcibly terminate the current run and close its log
    pub fn kill(&mut self) -> Result<()> {
        self.reap_stop_processes();

        if self.stopped() {
            return self.close_log();
        }

        if let Some(child) = self.child.as_mut() {
            let pid = child.id();
            if let Err(source) = self.killer.force_kill_tree(pid) {
                let err = TskError::Kill {
                    process: self.name.clone(),
                    source,
                };
                tracing::warn!(process = %self.name, pid, "{}", err);
            }
            if let Err(source) = self.killer.signal_kill(child) {
                let err = TskError::Kill {
                    process: self.name.clone(),
                    source,
                };
                tracing::warn!(process = %self.name, pid, "{}", err);
            }
        }

        self.close_log()
    }

    /// Shutdown pass: graceful stop, then kill, then close the log.
    ///
    /// Every step runs even if an earlier one failed; the first failure is
    /// returned.
    pub fn cleanup(&mut self) -> Result<()> {
        let steps = [self.stop(), self.kill(), self.close_log()];

        let mut first = None;
        for result in steps {
            if let Err(e) = result {
                tracing::warn!(process = %self.name, "cleanup of {}: {}", self.name, e);
                first.get_or_insert(e);
            }
        }

        self.drain_stop_processes();
        first.map_or(Ok(()), Err)
    }

    /// Wait for the current run to exit, then flush and close the log.
    ///
    /// Safe to call with no log open.
    pub fn close_log(&mut self) -> Result<()> {
        self.finish_run(None).map(|_| ())
    }

    /// Returns `false` if `timeout` passed with the process still alive, in
    /// which case the log stays open.
    fn finish_run(&mut self, timeout: Option<Duration>) -> Result<bool> {
        if self.log.is_none() {
            return Ok(true);
        }

        let waited = match self.child.as_mut() {
            Some(child) => wait_for_exit(child, timeout),
            None => Ok(true),
        };

        if let Ok(false) = waited {
            return Ok(false);
        }

        if let Some(mut log) = self.log.take() {
            if let Err(e) = log.flush() {
                tracing::warn!(process = %self.name, "flushing {}: {}", self.log_file.display(), e);
            }
            tracing::debug!(process = %self.name, "closed {}", self.log_file.display());
        }

        waited.map(|_| true).map_err(TskError::Io)
    }

    fn open_fresh_log(&self) -> Result<File> {
        if let Err(e) = self.rotator.rotate(&self.log_file, self.log_retention) {
            tracing::warn!(process = %self.name, "{}", e);
        }

        File::create(&self.log_file).map_err(|source| TskError::LogOpen {
            path: self.log_file.clone(),
            source,
        })
    }

    fn run_state(&mut self) -> RunState {
        let Some(child) = self.child.as_mut() else {
            return RunState::NeverSpawned;
        };

        match child.try_wait() {
            Ok(None) => RunState::Alive,
            Ok(Some(status)) => RunState::Exited(exit_code(status)),
            // The handle is kept, so a failed poll must not allow a second run.
            Err(e) => {
                tracing::warn!(process = %self.name, "polling {}: {}", self.name, e);
                RunState::Alive
            }
        }
    }

    fn reap_stop_processes(&mut self) {
        let name = &self.name;
        self.stop_processes.retain_mut(|stopper| match stopper.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                tracing::debug!(process = %name, "stop command exited with {}", status);
                false
            }
            Err(_) => false,
        });
    }

    /// Stop commands still running at shutdown are killed and waited on
    fn drain_stop_processes(&mut self) {
        for mut stopper in self.stop_processes.drain(..) {
            if let Ok(None) = stopper.try_wait() {
                tracing::debug!(process = %self.name, pid = stopper.id(), "killing leftover stop command");
                let _ = stopper.kill();
            }
            let _ = stopper.wait();
        }
    }

    /// Stop commands that have been spawned but not yet reaped
    pub fn pending_stop_commands(&self) -> usize {
        self.stop_processes.len()
    }
}

impl fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("name", &self.name)
            .field("start_command", &self.start_command)
            .field("stop_command", &self.stop_command)
            .field("working_dir", &self.working_dir)
            .field("log_file", &self.log_file)
            .field("logging", &self.log.is_some())
            .field("stop_requested", &self.stop_requested)
            .finish_non_exhaustive()
    }
}

fn wait_for_exit(child: &mut Child, timeout: Option<Duration>) -> io::Result<bool> {
    let Some(timeout) = timeout else {
        child.wait()?;
        return Ok(true);
    };

    let deadline = Instant::now() + timeout;
    loop {
        if child.try_wait()?.is_some() {
            return Ok(true);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        thread::sleep(EXIT_POLL_INTERVAL.min(deadline - now));
    }
}

/// Exit code, or the negated signal number for a signalled process
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }

    -1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::SignalOnly;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingRotator;

    impl LogRotator for FailingRotator {
        fn rotate(&self, path: &Path, _keep: usize) -> Result<()> {
            Err(TskError::Rotate {
                path: path.to_path_buf(),
                source: io::Error::other("disk full"),
            })
        }
    }

    #[derive(Default)]
    struct BrokenTreeKill {
        tree_kills: AtomicUsize,
    }

    impl Killer for BrokenTreeKill {
        fn force_kill_tree(&self, _pid: u32) -> io::Result<()> {
            self.tree_kills.fetch_add(1, Ordering::SeqCst);
            Err(io::Error::other("taskkill not found"))
        }
    }

    fn supervisor(dir: &Path, config: ProcessConfig) -> ProcessSupervisor {
        ProcessSupervisor::new(&config, dir)
            .unwrap()
            .with_killer(Arc::new(SignalOnly))
    }

    fn wait_until_stopped(sup: &mut ProcessSupervisor) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !sup.stopped() {
            assert!(Instant::now() < deadline, "{} never exited", sup.name());
            thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn status_strings_match_menu_surface() {
        assert_eq!(Status::NotStarted.to_string(), "Not Started");
        assert_eq!(Status::Running.to_string(), "Running");
        assert_eq!(Status::StopIssued.to_string(), "Stop Issued");
        assert_eq!(Status::Stopped(3).to_string(), "Stopped (Code 3)");
        assert_eq!(Status::Stopped(-9).to_string(), "Stopped (Code -9)");
    }

    #[test]
    fn new_supervisor_is_idle() {
        let dir = tempfile::tempdir().unwrap();
        let mut sup = supervisor(dir.path(), ProcessConfig::new("web", "true"));

        assert_eq!(sup.status(), Status::NotStarted);
        assert!(sup.stopped());
        assert!(!sup.logging());
        assert!(!sup.stop_requested());
        assert_eq!(sup.pid(), None);
        assert_eq!(sup.log_file(), dir.path().join("web.log"));
    }

    #[test]
    fn empty_command_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProcessConfig::new("web", CommandLine::Args(vec![]));
        assert!(matches!(
            ProcessSupervisor::new(&config, dir.path()),
            Err(TskError::EmptyCommand(_))
        ));
    }

    #[test]
    fn operations_before_first_start_are_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let mut sup = supervisor(dir.path(), ProcessConfig::new("web", "true"));

        sup.stop().unwrap();
        sup.kill().unwrap();
        sup.close_log().unwrap();
        sup.cleanup().unwrap();

        assert_eq!(sup.status(), Status::NotStarted);
        assert!(!sup.logging());
        assert!(!sup.log_file().exists());
    }

    #[test]
    fn spawn_failure_is_returned_and_leaves_supervisor_startable() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProcessConfig::new("ghost", &["/definitely/not/a/program"][..]);
        let mut sup = supervisor(dir.path(), config);

        let err = sup.start().unwrap_err();
        assert!(matches!(err, TskError::Spawn { ref process, .. } if process == "ghost"));
        assert!(sup.stopped());
        assert!(!sup.logging());
        assert_eq!(sup.status(), Status::NotStarted);

        let log = fs::read_to_string(sup.log_file()).unwrap();
        assert!(log.starts_with("[tsk] failed to start ghost:"));
    }

    #[cfg(unix)]
    #[test]
    fn exit_code_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut sup = supervisor(dir.path(), ProcessConfig::new("fail", "exit 3"));

        sup.start().unwrap();
        wait_until_stopped(&mut sup);

        assert_eq!(sup.status(), Status::Stopped(3));
        assert!(sup.logging());
        sup.close_log().unwrap();
        assert!(!sup.logging());
    }

    #[cfg(unix)]
    #[test]
    fn rotation_failure_does_not_block_start() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("web.log");
        fs::write(&log, "previous run\n").unwrap();

        let mut sup = supervisor(dir.path(), ProcessConfig::new("web", "echo fresh"))
            .with_rotator(Arc::new(FailingRotator));

        sup.start().unwrap();
        wait_until_stopped(&mut sup);
        sup.close_log().unwrap();

        assert_eq!(sup.status(), Status::Stopped(0));
        assert_eq!(fs::read_to_string(&log).unwrap(), "fresh\n");
    }

    #[cfg(unix)]
    #[test]
    fn failed_tree_kill_still_signals_the_handle() {
        let dir = tempfile::tempdir().unwrap();
        let killer = Arc::new(BrokenTreeKill::default());
        let mut sup = supervisor(dir.path(), ProcessConfig::new("sleepy", "exec sleep 30"))
            .with_killer(killer.clone());

        sup.start().unwrap();
        sup.kill().unwrap();

        assert_eq!(killer.tree_kills.load(Ordering::SeqCst), 1);
        assert_eq!(sup.status(), Status::Stopped(-9));
        assert!(!sup.logging());
    }

    #[cfg(unix)]
    #[test]
    fn stop_timeout_leaves_stop_issued_until_next_stop() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ProcessConfig::new("stubborn", "exec sleep 30");
        config.stop = Some(CommandLine::from("true"));
        let mut sup = supervisor(dir.path(), config)
            .with_stop_timeout(Some(Duration::from_millis(200)), false);

        sup.start().unwrap();
        sup.stop().unwrap();
        assert_eq!(sup.status(), Status::StopIssued);
        assert!(sup.stop_requested());
        assert!(sup.logging());

        sup.toggle().unwrap();
        assert_eq!(sup.status(), Status::Stopped(-9));
        assert!(!sup.logging());
    }

    #[cfg(unix)]
    #[test]
    fn stop_timeout_can_escalate_to_kill() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ProcessConfig::new("stubborn", "exec sleep 30");
        config.stop = Some(CommandLine::from("true"));
        let mut sup = supervisor(dir.path(), config)
            .with_stop_timeout(Some(Duration::from_millis(200)), true);

        sup.start().unwrap();
        sup.stop().unwrap();

        assert_eq!(sup.status(), Status::Stopped(-9));
        assert!(!sup.logging());
    }

    #[cfg(unix)]
    #[test]
    fn failing_stop_command_falls_back_to_kill() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ProcessConfig::new("web", "exec sleep 30");
        config.stop = Some(CommandLine::from(&["/definitely/not/a/program"][..]));
        let mut sup = supervisor(dir.path(), config);

        sup.start().unwrap();
        sup.stop().unwrap();

        assert_eq!(sup.status(), Status::Stopped(-9));
        assert!(!sup.logging());
    }
}
