//! PID-level process helpers.
//!
//! Runs are launched as process-group leaders, so signalling `-pid` reaches
//! the CLI and everything it spawned.

use std::io;

#[cfg(unix)]
fn as_pid_t(pid: u32) -> io::Result<libc::pid_t> {
    // 0 and negative values address whole groups in kill(2); never allow them here.
    match libc::pid_t::try_from(pid) {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid pid {}", pid),
        )),
    }
}

#[cfg(unix)]
fn send(target: libc::pid_t, signal: libc::c_int) -> io::Result<()> {
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(target, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Signal-0 liveness probe. A reaped or never-existing PID reports `false`.
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    let Ok(pid) = as_pid_t(pid) else {
        return false;
    };
    match send(pid, 0) {
        Ok(()) => true,
        // Exists but belongs to someone else.
        Err(e) => e.raw_os_error() == Some(libc::EPERM),
    }
}

#[cfg(not(unix))]
pub fn is_alive(_pid: u32) -> bool {
    false
}

/// Forcefully kill a run by the PID it reported, including its process group.
/// Returns `Ok(false)` if nothing was running under that PID.
#[cfg(unix)]
pub fn kill(pid: u32) -> io::Result<bool> {
    let target = as_pid_t(pid)?;
    // Stragglers in the group go first; the leader's result decides the return.
    let _ = signal_group(pid, libc::SIGKILL);
    match send(target, libc::SIGKILL) {
        Ok(()) => Ok(true),
        Err(e) if e.raw_os_error() == Some(libc::ESRCH) => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
pub fn kill(_pid: u32) -> io::Result<bool> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "killing by pid is only supported on unix",
    ))
}

/// Send `signal` to the process group led by `pid`. A group with no members
/// left is not an error.
#[cfg(unix)]
pub(crate) fn signal_group(pid: u32, signal: libc::c_int) -> io::Result<()> {
    let pid = as_pid_t(pid)?;
    match send(-pid, signal) {
        Err(e) if e.raw_os_error() == Some(libc::ESRCH) => Ok(()),
        other => other,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_own_process_is_alive() {
        assert!(is_alive(std::process::id()));
    }

    #[test]
    fn test_invalid_pids_are_not_alive() {
        assert!(!is_alive(0));
        assert!(!is_alive(u32::MAX));
        assert!(kill(0).is_err());
    }

    #[test]
    fn test_reaped_child_is_not_alive() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(!is_alive(pid));
    }

    #[test]
    fn test_kill_running_child() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();
        assert!(kill(pid).unwrap());
        let status = child.wait().unwrap();
        assert!(!status.success());
        assert!(!is_alive(pid));
    }
}
