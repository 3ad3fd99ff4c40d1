//! Process liveness and signal delivery.

use crate::error::{HarnessError, Result};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

/// OS process capability, substituted with a fake in tests.
pub trait ProcessControl: Send + Sync {
    /// Zero-signal liveness check; never affects the target.
    fn is_alive(&self, pid: u32) -> bool;
    fn terminate(&self, pid: u32) -> Result<()>;
    fn force_kill(&self, pid: u32) -> Result<()>;
}

pub struct NixProcessControl;

impl NixProcessControl {
    fn send(pid: u32, signal: Signal) -> Result<()> {
        let raw = i32::try_from(pid)
            .map_err(|_| HarnessError::InvalidRequest(format!("pid {pid} out of range")))?;
        match kill(Pid::from_raw(raw), signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(HarnessError::ReloadFailed(format!(
                "failed to send {signal:?} to pid {pid}: {errno}"
            ))),
        }
    }
}

impl ProcessControl for NixProcessControl {
    fn is_alive(&self, pid: u32) -> bool {
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        if raw <= 0 {
            return false;
        }
        // EPERM means the process exists but belongs to someone else.
        match kill(Pid::from_raw(raw), None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    fn terminate(&self, pid: u32) -> Result<()> {
        Self::send(pid, Signal::SIGTERM)
    }

    fn force_kill(&self, pid: u32) -> Result<()> {
        Self::send(pid, Signal::SIGKILL)
    }
}

/// Find the first process in `ps -eo pid=,args=` output whose command line
/// contains `pattern`, skipping `grep`, the `ps` invocation and this process.
///
/// A blank pattern matches nothing.
pub fn find_process(ps_output: &str, pattern: &str) -> Option<ProcessMatch> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return None;
    }
    let own_pid = std::process::id();
    ps_output
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            let (pid, args) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
            let args = args.trim();
            if !args.contains(pattern) || args.contains("grep") || args.starts_with("ps -eo") {
                return None;
            }
            let pid = pid.parse::<u32>().ok();
            if pid == Some(own_pid) {
                return None;
            }
            Some(ProcessMatch {
                pid,
                command_line: args.to_string(),
            })
        })
        .next()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessMatch {
    /// `None` when the pid column could not be parsed.
    pub pid: Option<u32>,
    pub command_line: String,
}
