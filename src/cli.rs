use clap::Parser;
use std::path::PathBuf;

use crate::config::default_config_path;

/// tsk CLI application
#[derive(Parser, Debug)]
#[command(name = "tsk")]
#[command(about = "Start, stop and log a set of long-running commands from one menu")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file (defaults to ~/.tsk.json)
    pub config: Option<PathBuf>,
    /// Show debug output from the supervisors
    #[arg(short, long)]
    pub verbose: bool,
    /// Print the configured processes and exit
    #[arg(short, long)]
    pub list: bool,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_path)
    }
}
