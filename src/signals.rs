//! Shutdown signal handling.
//!
//! The first of SIGHUP, SIGINT or SIGTERM claims the shutdown path and is
//! forwarded unchanged to the child. SIGKILL has a [`ShutdownSignal`]
//! variant so the mapping stays total, but it can never be caught.

use crate::lifecycle::Lifecycle;
use futures::{Stream, StreamExt};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGKILL, SIGTERM};
use signal_hook_tokio::{Handle, Signals};
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Signals the supervisor listens for.
pub const HANDLED: [i32; 3] = [SIGHUP, SIGINT, SIGTERM];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Reload,
    Interrupt,
    Terminate,
    Kill,
}

impl ShutdownSignal {
    pub fn from_raw(signal: i32) -> Option<Self> {
        match signal {
            SIGHUP => Some(ShutdownSignal::Reload),
            SIGINT => Some(ShutdownSignal::Interrupt),
            SIGTERM => Some(ShutdownSignal::Terminate),
            SIGKILL => Some(ShutdownSignal::Kill),
            _ => None,
        }
    }

    /// The signal delivered to the child.
    pub fn as_nix(&self) -> Signal {
        match self {
            ShutdownSignal::Reload => Signal::SIGHUP,
            ShutdownSignal::Interrupt => Signal::SIGINT,
            ShutdownSignal::Terminate => Signal::SIGTERM,
            ShutdownSignal::Kill => Signal::SIGKILL,
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_nix().as_str())
    }
}

/// The child's pid, readable from any task before or after it is known.
///
/// Unset is stored as 0, which is never a child pid (and must never reach
/// `kill`, where it means "the whole process group"). Once the child has
/// been reaped the cell holds -1: the pid may already belong to someone else.
#[derive(Debug, Default)]
pub struct ChildPid(AtomicI32);

const EXITED: i32 = -1;

impl ChildPid {
    pub fn unset() -> Self {
        Self::default()
    }

    /// Records the pid. Only the first call has an effect.
    pub fn set(&self, pid: Pid) -> bool {
        pid.as_raw() > 0
            && self
                .0
                .compare_exchange(0, pid.as_raw(), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    /// The pid of a child that is still running (or at least not yet reaped).
    pub fn get(&self) -> Option<Pid> {
        match self.0.load(Ordering::Acquire) {
            raw if raw > 0 => Some(Pid::from_raw(raw)),
            _ => None,
        }
    }

    /// Called once the child has been reaped; `get` returns `None` from now on.
    pub fn mark_exited(&self) {
        self.0.store(EXITED, Ordering::Release);
    }

    pub fn has_exited(&self) -> bool {
        self.0.load(Ordering::Acquire) == EXITED
    }
}

/// Sends `signal` to the child. `Ok(false)` when the child is not started
/// yet or has already been reaped.
pub fn forward(signal: ShutdownSignal, pid: &ChildPid) -> nix::Result<bool> {
    match pid.get() {
        Some(pid) => kill(pid, signal.as_nix()).map(|()| true),
        None => Ok(false),
    }
}

/// Installs handlers for [`HANDLED`] and returns them as a stream.
///
/// Signals delivered between this call and the first poll are queued.
pub fn os_signals() -> std::io::Result<(Handle, impl Stream<Item = ShutdownSignal> + Send + 'static)> {
    let signals = Signals::new(HANDLED)?;
    let handle = signals.handle();
    let stream = signals.filter_map(|raw| futures::future::ready(ShutdownSignal::from_raw(raw)));
    Ok((handle, stream))
}



/*
    @@@
    @listen();
    . Waits for the first shutdown signal and tries to claim the shutdown path.
    . The claimant forwards the same signal to the child (skipped while the pid is unset) and hands it to the supervisor.
    . Later signals are logged and ignored: the process is already on its way out.
*/
pub async fn listen<S>(
    signals: S,
    pid: Arc<ChildPid>,
    lifecycle: Arc<Lifecycle>,
    notify: oneshot::Sender<ShutdownSignal>,
) where
    S: Stream<Item = ShutdownSignal>,
{
    tokio::pin!(signals);
    let mut notify = Some(notify);

    while let Some(signal) = signals.next().await {
        info!(signal = %signal, "Signal received");

        if !lifecycle.begin_shutdown() {
            debug!(signal = %signal, "shutdown already in progress; ignoring");
            continue;
        }

        match forward(signal, &pid) {
            Ok(true) => info!(signal = %signal, pid = ?pid.get().map(Pid::as_raw), "Forwarded signal to child"),
            Ok(false) if pid.has_exited() => {
                info!(signal = %signal, "child already exited; skipping forward")
            }
            Ok(false) => warn!(signal = %signal, "child not started yet; skipping forward"),
            Err(e) => error!(signal = %signal, error = %e, "failed to forward signal"),
        }

        if let Some(tx) = notify.take() {
            let _ = tx.send(signal);
        }
    }
}
