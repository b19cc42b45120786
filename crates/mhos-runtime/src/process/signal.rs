//! Signalling processes by pid.
//!
//! Two strategies:
//! - `terminate`: fire-and-forget SIGTERM for tracked workers
//! - `kill_pid`: SIGTERM → SIGKILL escalation with a bounded wait, for
//!   singleton servers we only know through a pid marker (no reaping)

use std::io;
use std::time::Duration;

/// Send SIGTERM without waiting for the process to exit.
///
/// Returns `Ok(true)` if the signal was delivered and `Ok(false)` if the
/// process was already gone.
#[cfg(unix)]
pub fn terminate(pid: u32) -> io::Result<bool> {
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};

    match signal::kill(nix_pid(pid)?, Signal::SIGTERM) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(io::Error::other(e)),
    }
}

#[cfg(not(unix))]
pub fn terminate(_pid: u32) -> io::Result<bool> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "signalling by pid is not implemented on this platform",
    ))
}

/// Kill a process by pid with SIGTERM → SIGKILL escalation.
///
/// # Strategy
/// 1. Send SIGTERM
/// 2. Poll for up to `grace` to verify exit
/// 3. If still alive, send SIGKILL and poll again for up to `grace`
///
/// # Returns
/// - `Ok(())` if the process was killed or already gone
/// - `Err` if kill operations fail (excluding ESRCH) or it survives SIGKILL
#[cfg(unix)]
pub async fn kill_pid(pid: u32, grace: Duration) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};

    let target = nix_pid(pid)?;

    for sig in [Signal::SIGTERM, Signal::SIGKILL] {
        match signal::kill(target, sig) {
            Ok(()) => {}
            Err(Errno::ESRCH) => return Ok(()),
            Err(e) => return Err(io::Error::other(e)),
        }

        if wait_for_exit(pid, grace).await {
            return Ok(());
        }
    }

    Err(io::Error::new(
        io::ErrorKind::TimedOut,
        format!("process {pid} did not exit after SIGKILL"),
    ))
}

#[cfg(not(unix))]
pub async fn kill_pid(_pid: u32, _grace: Duration) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "signalling by pid is not implemented on this platform",
    ))
}

#[cfg(unix)]
async fn wait_for_exit(pid: u32, grace: Duration) -> bool {
    const STEP: Duration = Duration::from_millis(100);
    let mut waited = Duration::ZERO;
    while waited < grace {
        tokio::time::sleep(STEP).await;
        waited += STEP;
        if !crate::pidfile::pid_exists(pid) {
            return true;
        }
    }
    false
}

#[cfg(unix)]
fn nix_pid(pid: u32) -> io::Result<nix::unistd::Pid> {
    i32::try_from(pid)
        .map(nix::unistd::Pid::from_raw)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("pid {pid} out of range")))
}
