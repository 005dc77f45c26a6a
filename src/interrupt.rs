//! Interrupt latch for the menu session
//!
//! SIGINT and SIGTERM only set a flag. The menu notices it at its next
//! read or pause and returns, so shutdown cleanup always runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

const PAUSE_SLICE: Duration = Duration::from_millis(50);

/// True once an interrupt has been received
pub fn requested() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Sleep for `duration`, returning early if interrupted
pub fn pause(duration: Duration) {
    let deadline = Instant::now() + duration;
    while !requested() {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep(PAUSE_SLICE.min(deadline - now));
    }
}

#[cfg(unix)]
extern "C" fn on_signal(_signal: libc::c_int) {
    // Only an atomic store: async-signal-safe.
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Install the SIGINT/SIGTERM handlers.
///
/// `SA_RESTART` is left off so a blocked terminal read returns `EINTR`.
#[cfg(unix)]
pub fn install() -> std::io::Result<()> {
    for signal in [libc::SIGINT, libc::SIGTERM] {
        // SAFETY: the sigaction struct is zero-initialised and then filled in
        // with a handler that only performs an atomic store, which is
        // async-signal-safe. sigemptyset and sigaction are POSIX calls on
        // memory we own.
        let installed = unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
            action.sa_flags = 0;
            libc::sigemptyset(&mut action.sa_mask);
            libc::sigaction(signal, &action, std::ptr::null_mut())
        };
        if installed != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn install() -> std::io::Result<()> {
    Ok(())
}
