//! Requester liveness checks.
//!
//! The hook that writes a request record blocks until a response appears.
//! If it dies first, nobody will ever consume a response, so the queue
//! prunes requests whose owning process is gone.
//!
//! The check is advisory. A recycled pid makes a dead requester look alive
//! and a zombie still answers the check; both leave a stale card visible
//! until the pid disappears. A request can also be pruned between the
//! moment the hook exits and the moment it would have cleaned up after
//! itself, which is harmless.

/// Answers whether a process is still running.
pub trait LivenessCheck: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Signal-0 check: asks the kernel to deliver no signal and inspects the
/// error. `EPERM` means the process exists under another user.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalCheck;

#[cfg(unix)]
impl LivenessCheck for SignalCheck {
    fn is_alive(&self, pid: u32) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        if raw <= 0 {
            return false;
        }
        match kill(Pid::from_raw(raw), None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }
}

#[cfg(not(unix))]
impl LivenessCheck for SignalCheck {
    fn is_alive(&self, _pid: u32) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_own_process_is_alive() {
        assert!(SignalCheck.is_alive(std::process::id()));
    }

    #[cfg(unix)]
    #[test]
    fn test_reaped_child_is_dead() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(!SignalCheck.is_alive(pid));
    }

    #[test]
    fn test_out_of_range_pid_is_dead() {
        if cfg!(unix) {
            assert!(!SignalCheck.is_alive(u32::MAX));
            assert!(!SignalCheck.is_alive(0));
        }
    }
}
