//! Interactive menu for tsk
//!
//! Draws the process table, reads one selection at a time and forwards it
//! to the registry. Supervisor reports arrive through `tracing`.

use crate::constants::{MAX_SINGLE_KEY_PROCESSES, TOGGLE_PAUSE};
use crate::error::{Result, TskError};
use crate::interrupt;
use crate::logs::open_in_file_browser;
use crate::registry::SupervisorRegistry;
use std::io::{self, Read, Write};
use std::path::Path;

const PROMPT: &str = "\nSelect a process to stop or start: ";

/// What the operator asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Quit,
    ViewLogs,
    /// Zero-based process index
    Toggle(usize),
    Unknown,
}

impl Selection {
    pub fn parse(input: &str) -> Self {
        let input = input.trim().to_lowercase();
        match input.as_str() {
            "q" => Selection::Quit,
            "l" => Selection::ViewLogs,
            other => match other.parse::<usize>() {
                Ok(n) if n > 0 => Selection::Toggle(n - 1),
                _ => Selection::Unknown,
            },
        }
    }
}

/// One line of the process table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub name: String,
    pub status: String,
    pub started: String,
    pub log_file: String,
}

/// Snapshot the registry for display
pub fn rows(registry: &mut SupervisorRegistry) -> Vec<Row> {
    registry
        .iter_mut()
        .map(|sup| Row {
            name: sup.name().to_string(),
            status: sup.status().to_string(),
            started: sup
                .last_started()
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string()),
            log_file: sup.log_file().display().to_string(),
        })
        .collect()
}

fn width<'a>(items: impl Iterator<Item = &'a str>, min: usize) -> usize {
    items.map(str::len).fold(min, usize::max)
}

/// Render the table with its header and the L/Q entries
pub fn render(rows: &[Row]) -> String {
    let iw = rows.len().to_string().len();
    let nw = width(rows.iter().map(|r| r.name.as_str()), 15);
    let sw = width(rows.iter().map(|r| r.status.as_str()), "STATUS".len());
    let tw = width(rows.iter().map(|r| r.started.as_str()), "STARTED".len());

    let mut out = String::from("TSK PROCESS MANAGER\n\n");
    out.push_str(&format!(
        "{:iw$}  {:nw$}   {:sw$}   {:tw$}   LOG FILE\n",
        "", "PROCESS", "STATUS", "STARTED"
    ));
    for (i, row) in rows.iter().enumerate() {
        out.push_str(&format!(
            "{:>iw$}: {:nw$}   {:sw$}   {:tw$}   {}\n",
            i + 1,
            row.name,
            row.status,
            row.started,
            row.log_file
        ));
    }
    out.push_str(&format!("\n{:>iw$}: View Logs\n", "L"));
    out.push_str(&format!("{:>iw$}: Quit\n", "Q"));
    out
}

/// Print the configured processes without starting anything
pub fn print_list(registry: &mut SupervisorRegistry) {
    print!("{}", render(&rows(registry)));
}

/// Menu loop; returns when the operator quits, input ends or an interrupt
/// arrives
pub fn run(registry: &mut SupervisorRegistry, log_dir: &Path) -> Result<()> {
    loop {
        if interrupt::requested() {
            tracing::debug!("interrupted, leaving menu");
            return Ok(());
        }

        clear_screen();
        print!("{}", render(&rows(registry)));

        match read_selection(registry.len())? {
            Selection::Quit => return Ok(()),
            Selection::ViewLogs => {
                if let Err(e) = open_in_file_browser(log_dir) {
                    tracing::warn!("could not open {}: {}", log_dir.display(), e);
                }
            }
            Selection::Toggle(index) => match registry.toggle(index) {
                Ok(()) => interrupt::pause(TOGGLE_PAUSE),
                Err(TskError::ProcessNotFound(_)) => {}
                Err(e) => {
                    tracing::error!("{}", e);
                    interrupt::pause(TOGGLE_PAUSE);
                }
            },
            Selection::Unknown => {}
        }
    }
}

fn clear_screen() {
    print!("\x1b[2J\x1b[H");
    let _ = io::stdout().flush();
}

fn read_selection(count: usize) -> Result<Selection> {
    if count > MAX_SINGLE_KEY_PROCESSES {
        print!("{}", PROMPT);
        io::stdout().flush()?;
        return Ok(read_line()?.map_or(Selection::Quit, |line| Selection::parse(&line)));
    }

    println!("{}", PROMPT);
    io::stdout().flush()?;
    Ok(read_key()?.map_or(Selection::Quit, |key| Selection::parse(&key.to_string())))
}

/// One byte from stdin; `None` at end of input or once interrupted
fn read_byte(input: &mut impl Read) -> io::Result<Option<u8>> {
    let mut buf = [0u8; 1];
    loop {
        match input.read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(buf[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                if interrupt::requested() {
                    return Ok(None);
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// `None` at end of input or once interrupted
fn read_line() -> io::Result<Option<String>> {
    read_line_from(&mut io::stdin().lock())
}

fn read_line_from(input: &mut impl Read) -> io::Result<Option<String>> {
    let mut line = Vec::new();
    loop {
        match read_byte(input)? {
            Some(b'\n') => break,
            Some(byte) => line.push(byte),
            None if line.is_empty() || interrupt::requested() => return Ok(None),
            None => break,
        }
    }
    Ok(Some(String::from_utf8_lossy(&line).into_owned()))
}

#[cfg(unix)]
mod raw_mode {
    /// Terminal settings to restore on drop
    pub struct RawModeGuard {
        fd: libc::c_int,
        original: libc::termios,
    }

    impl RawModeGuard {
        /// Switch stdin to unbuffered, unechoed single key reads. `None` if
        /// stdin is not a terminal.
        pub fn enter() -> Option<Self> {
            let fd = libc::STDIN_FILENO;
            // SAFETY: isatty, tcgetattr and tcsetattr are POSIX calls on stdin,
            // which stays open for the life of the process. Return values are
            // checked before going on, and the termios read here is restored
            // in Drop.
            unsafe {
                if libc::isatty(fd) == 0 {
                    return None;
                }
                let mut original: libc::termios = std::mem::zeroed();
                if libc::tcgetattr(fd, &mut original) != 0 {
                    return None;
                }
                let mut raw = original;
                // Ctrl+C arrives as a byte, not SIGINT
                raw.c_lflag &= !(libc::ICANON | libc::ECHO | libc::ISIG);
                raw.c_cc[libc::VMIN] = 1;
                raw.c_cc[libc::VTIME] = 0;
                if libc::tcsetattr(fd, libc::TCSANOW, &raw) != 0 {
                    return None;
                }
                Some(Self { fd, original })
            }
        }
    }

    impl Drop for RawModeGuard {
        fn drop(&mut self) {
            // SAFETY: restores the termios saved in enter() on the same fd.
            unsafe {
                libc::tcsetattr(self.fd, libc::TCSANOW, &self.original);
            }
        }
    }
}

/// Single key press without waiting for Enter; Ctrl+C and Ctrl+D read as quit
#[cfg(unix)]
fn read_key() -> io::Result<Option<char>> {
    let Some(_guard) = raw_mode::RawModeGuard::enter() else {
        return Ok(read_line()?.and_then(|line| line.trim().chars().next()));
    };

    Ok(read_byte(&mut io::stdin().lock())?.map(|byte| match byte {
        0x03 | 0x04 => 'q',
        other => other as char,
    }))
}

#[cfg(not(unix))]
fn read_key() -> io::Result<Option<char>> {
    Ok(read_line()?.and_then(|line| line.trim().chars().next()))
}
