//! Log management for tsk
//!
//! Log file naming, archiving of previous runs and opening the log
//! directory for the operator.

use crate::error::{Result, TskError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Archives a log file before a new run truncates it
pub trait LogRotator: Send + Sync {
    /// Archive `path`, keeping at most `keep` older generations
    fn rotate(&self, path: &Path, keep: usize) -> Result<()>;
}

/// Numbered rotation: `name.log` -> `name.log.1` -> ... -> `name.log.N`
#[derive(Debug, Default, Clone, Copy)]
pub struct NumberedRotation;

impl LogRotator for NumberedRotation {
    fn rotate(&self, path: &Path, keep: usize) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }

        let rotate_err = |source: io::Error| TskError::Rotate {
            path: path.to_path_buf(),
            source,
        };

        if keep == 0 {
            return fs::remove_file(path).map_err(rotate_err);
        }

        let oldest = archive_path(path, keep);
        if oldest.exists() {
            fs::remove_file(&oldest).map_err(rotate_err)?;
        }

        for generation in (1..keep).rev() {
            let from = archive_path(path, generation);
            if from.exists() {
                fs::rename(&from, archive_path(path, generation + 1)).map_err(rotate_err)?;
            }
        }

        fs::rename(path, archive_path(path, 1)).map_err(rotate_err)?;
        tracing::debug!("archived {} -> {}", path.display(), archive_path(path, 1).display());
        Ok(())
    }
}

/// Path of archive generation `n` for a log file
pub fn archive_path(path: &Path, generation: usize) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}", generation));
    PathBuf::from(name)
}

/// Log file for a process: `<log_dir>/<name>.log`
pub fn log_path(log_dir: &Path, name: &str) -> PathBuf {
    log_dir.join(format!("{}.log", name))
}

/// Open a directory in the platform's file browser
pub fn open_in_file_browser(dir: &Path) -> Result<()> {
    let opener = if cfg!(windows) {
        "explorer"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };

    Command::new(opener)
        .arg(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(TskError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        fs::write(path, content).unwrap();
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn log_path_uses_process_name() {
        let path = log_path(Path::new("/var/tsk"), "web");
        assert_eq!(path, PathBuf::from("/var/tsk/web.log"));
        assert_eq!(archive_path(&path, 3), PathBuf::from("/var/tsk/web.log.3"));
    }

    #[test]
    fn rotating_missing_file_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.log");
        NumberedRotation.rotate(&path, 3).unwrap();
        assert!(!path.exists());
        assert!(!archive_path(&path, 1).exists());
    }

    #[test]
    fn rotation_shifts_generations_and_drops_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.log");

        for run in ["first", "second", "third", "fourth"] {
            write(&path, run);
            NumberedRotation.rotate(&path, 2).unwrap();
        }

        assert!(!path.exists());
        assert_eq!(read(&archive_path(&path, 1)), "fourth");
        assert_eq!(read(&archive_path(&path, 2)), "third");
        assert!(!archive_path(&path, 3).exists());
    }

    #[test]
    fn zero_retention_discards_current_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.log");
        write(&path, "old");

        NumberedRotation.rotate(&path, 0).unwrap();

        assert!(!path.exists());
        assert!(!archive_path(&path, 1).exists());
    }

    #[test]
    fn rotation_failure_names_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.log");
        write(&path, "current");
        // A directory where the oldest archive should be cannot be removed as a file.
        fs::create_dir(archive_path(&path, 1)).unwrap();

        let err = NumberedRotation.rotate(&path, 1).unwrap_err();
        assert!(matches!(err, TskError::Rotate { ref path, .. } if path.ends_with("web.log")));
        assert_eq!(read(&path), "current");
    }
}
