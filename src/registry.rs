//! Supervisor registry for tsk
//!
//! Holds the configured supervisors in menu order and runs the shutdown
//! pass over all of them.

use crate::config::Config;
use crate::error::{Result, TskError};
use crate::supervisor::ProcessSupervisor;
use std::collections::HashSet;

/// Ordered collection of supervisors built from configuration
#[derive(Debug, Default)]
pub struct SupervisorRegistry {
    supervisors: Vec<ProcessSupervisor>,
}

impl SupervisorRegistry {
    /// Build one supervisor per configured process, creating the log directory
    pub fn from_config(config: &Config) -> Result<Self> {
        let log_dir = config.ensure_log_dir()?;
        let supervisors = config
            .processes
            .iter()
            .map(|process| ProcessSupervisor::new(process, &log_dir))
            .collect::<Result<Vec<_>>>()?;
        Self::from_supervisors(supervisors)
    }

    /// Wrap already-built supervisors; names must be distinct
    pub fn from_supervisors(supervisors: Vec<ProcessSupervisor>) -> Result<Self> {
        {
            let mut names = HashSet::new();
            for supervisor in &supervisors {
                if !names.insert(supervisor.name()) {
                    return Err(TskError::DuplicateProcess(supervisor.name().to_string()));
                }
            }
        }
        Ok(Self { supervisors })
    }

    pub fn len(&self) -> usize {
        self.supervisors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.supervisors.is_empty()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ProcessSupervisor> {
        self.supervisors.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessSupervisor> {
        self.supervisors.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ProcessSupervisor> {
        self.supervisors.iter_mut()
    }

    /// Toggle the supervisor at `index`
    pub fn toggle(&mut self, index: usize) -> Result<()> {
        self.supervisors
            .get_mut(index)
            .ok_or(TskError::ProcessNotFound(index))?
            .toggle()
    }

    /// Run cleanup on every supervisor, continuing past failures.
    ///
    /// Returns how many supervisors reported an error.
    pub fn cleanup_all(&mut self) -> usize {
        let mut failures = 0;
        for supervisor in &mut self.supervisors {
            if let Err(e) = supervisor.cleanup() {
                tracing::error!(process = %supervisor.name(), "cleanup failed: {}", e);
                failures += 1;
            }
        }
        failures
    }
}

impl Drop for SupervisorRegistry {
    fn drop(&mut self) {
        self.cleanup_all();
    }
}
