use crate::signals::ChildPid;
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};


/// What one reaped process turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reaped {
    pub pid: Pid,
    /// Exit code, or 128 + signal number when it was killed.
    pub code: i32,
    pub supervised: bool,
}



/*
    @@@
    @reap_exited();
    . Collects every child that has already exited, without blocking (WNOHANG).
    . The supervised child is logged as such and its pid retired, so no later signal can reach a recycled pid.
    . Anything else is an orphan re-parented to us.
    . ECHILD (no children at all) simply ends the pass.
*/
pub fn reap_exited(child: &ChildPid) -> Vec<Reaped> {
    let mut reaped = Vec::new();

    loop {
        let (pid, code) = match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(pid, code)) => (pid, code),
            Ok(WaitStatus::Signaled(pid, sig, _)) => (pid, 128 + sig as i32),
            Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => break,
            Ok(_) => continue,
            Err(Errno::EINTR) => continue,
            Err(e) => {
                warn!(error = %e, "waitpid failed");
                break;
            }
        };

        let supervised = child.get() == Some(pid);
        if supervised {
            child.mark_exited();
            info!(pid = pid.as_raw(), exit_code = code, "Supervised child exited");
        } else {
            debug!(pid = pid.as_raw(), exit_code = code, "Reaped orphaned process");
        }
        reaped.push(Reaped { pid, code, supervised });
    }

    reaped
}



/*
    @@@
    @reap_children();
    . Runs for the lifetime of the supervisor.
    . Each pass empties the zombie queue, then waits for SIGCHLD or `interval`, whichever comes first.
    . Having nothing to reap is an idle wait, never an error.
*/
pub async fn reap_children(child: Arc<ChildPid>, interval: Duration) {
    let mut sigchld = match signal(SignalKind::child()) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!(error = %e, "SIGCHLD unavailable; reaping on interval only");
            None
        }
    };

    loop {
        reap_exited(&child);

        match sigchld.as_mut() {
            Some(sigchld) => {
                tokio::select! {
                    _ = sigchld.recv() => {}
                    _ = sleep(interval) => {}
                }
            }
            None => sleep(interval).await,
        }
    }
}
