//! tsk process manager
//!
//! Supervises a handful of long-running commands from a single menu:
//! starts them, asks them to stop, kills them when they won't, and keeps
//! each one's combined output in a rotated log file.

pub mod cli;
pub mod config;
pub mod error;
pub mod interrupt;
pub mod logs;
pub mod menu;
pub mod process;
pub mod registry;
pub mod supervisor;

pub use error::{Result, TskError};
pub use registry::SupervisorRegistry;
pub use supervisor::{ProcessSupervisor, Status};

/// Application constants
pub mod constants {
    use std::time::Duration;

    /// Archived log generations kept when a process does not say otherwise
    pub const DEFAULT_LOG_ARCHIVE: usize = 10;

    /// Default configuration file name, relative to the home directory
    pub const DEFAULT_CONFIG_FILE: &str = ".tsk.json";

    /// Default log directory, relative to the home directory
    pub const DEFAULT_LOG_DIR: &str = ".tsk.logs";

    /// Polling interval while waiting on a process with a stop timeout
    pub const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

    /// Pause after a toggle so the operator can read its report
    pub const TOGGLE_PAUSE: Duration = Duration::from_secs(1);

    /// Menu switches from single key presses to line input above this count
    pub const MAX_SINGLE_KEY_PROCESSES: usize = 9;
}
