use std::fmt;
use std::path::PathBuf;

/// Custom error type for tsk operations
#[derive(Debug)]
pub enum TskError {
    /// I/O operation failed
    Io(std::io::Error),
    /// JSON deserialization failed
    Json(serde_json::Error),
    /// Configuration error
    Config(String),
    /// Configuration file missing
    ConfigNotFound(PathBuf),
    /// Two processes share a name
    DuplicateProcess(String),
    /// A command has no program to run
    EmptyCommand(String),
    /// No process at the given menu index
    ProcessNotFound(usize),
    /// Process start error
    Spawn {
        process: String,
        source: std::io::Error,
    },
    /// Log file could not be opened
    LogOpen {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Log archiving failed
    Rotate {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Forced termination failed
    Kill {
        process: String,
        source: std::io::Error,
    },
}

impl fmt::Display for TskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TskError::Io(err) => write!(f, "I/O error: {}", err),
            TskError::Json(err) => write!(f, "JSON error: {}", err),
            TskError::Config(msg) => write!(f, "Configuration error: {}", msg),
            TskError::ConfigNotFound(path) => {
                write!(f, "Configuration file not found: {}", path.display())
            }
            TskError::DuplicateProcess(name) => {
                write!(f, "Process '{}' is defined more than once", name)
            }
            TskError::EmptyCommand(name) => write!(f, "Process '{}' has an empty command", name),
            TskError::ProcessNotFound(index) => write!(f, "No process at position {}", index + 1),
            TskError::Spawn { process, source } => {
                write!(f, "Failed to start process '{}': {}", process, source)
            }
            TskError::LogOpen { path, source } => {
                write!(f, "Failed to open log file {}: {}", path.display(), source)
            }
            TskError::Rotate { path, source } => {
                write!(f, "Error archiving logs for {}: {}", path.display(), source)
            }
            TskError::Kill { process, source } => {
                write!(f, "Failed to kill process '{}': {}", process, source)
            }
        }
    }
}

impl std::error::Error for TskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TskError::Io(err) => Some(err),
            TskError::Json(err) => Some(err),
            TskError::Spawn { source, .. }
            | TskError::LogOpen { source, .. }
            | TskError::Rotate { source, .. }
            | TskError::Kill { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TskError {
    fn from(err: std::io::Error) -> Self {
        TskError::Io(err)
    }
}

impl From<serde_json::Error> for TskError {
    fn from(err: serde_json::Error) -> Self {
        TskError::Json(err)
    }
}

/// Result type alias for tsk operations
pub type Result<T> = std::result::Result<T, TskError>;
