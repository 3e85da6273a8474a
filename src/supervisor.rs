use crate::config::{Command, Config};
use crate::error::SupervisorError;
use crate::lifecycle::Lifecycle;
use crate::reaper::reap_children;
use crate::signals::{listen, os_signals, ChildPid, ShutdownSignal};
use crate::sink::Sink;
use crate::tokenizer::LogCodec;
use futures::{Stream, StreamExt};
use nix::unistd::Pid;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command as ProcessCommand;
use tokio::sync::oneshot;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, warn, Instrument};


/// Why the supervisor shut down. Either way the process exits 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The child closed its stderr (normally: it exited).
    ChildExited,
    /// A shutdown signal arrived first; it was forwarded if the child was running.
    Signal(ShutdownSignal),
}

/// Supervises exactly one child for exactly one run.
///
/// The sink is used from one place at a time: `emit` only inside the drain
/// loop, `cleanup` only after the drain loop has been dropped.
pub struct Supervisor {
    command: Command,
    sink: Box<dyn Sink>,
    codec: LogCodec,
    echo_records: bool,
    reap_interval: Option<Duration>,
    child_pid: Arc<ChildPid>,
    lifecycle: Arc<Lifecycle>,
}

impl Supervisor {
    pub fn new(command: Command, sink: Box<dyn Sink>) -> Self {
        Self {
            command,
            sink,
            codec: LogCodec::new(),
            echo_records: false,
            reap_interval: None,
            child_pid: Arc::new(ChildPid::unset()),
            lifecycle: Arc::new(Lifecycle::new()),
        }
    }

    pub fn from_config(command: Command, sink: Box<dyn Sink>, cfg: &Config) -> Self {
        let codec = match cfg.max_record_len {
            Some(max) => LogCodec::with_max_record_len(max),
            None => LogCodec::new(),
        };
        Self {
            codec,
            echo_records: cfg.echo_records(),
            reap_interval: cfg.reap_orphans.then(|| cfg.reap_interval()),
            ..Self::new(command, sink)
        }
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo_records = echo;
        self
    }

    pub fn child_pid(&self) -> Arc<ChildPid> {
        self.child_pid.clone()
    }

    /// Runs with the process's real SIGHUP/SIGINT/SIGTERM handlers.
    pub async fn run(self) -> Result<ExitReason, SupervisorError> {
        let (handle, signals) = os_signals().map_err(SupervisorError::Signals)?;
        let result = self.run_with_signals(signals).await;
        handle.close();
        result
    }



    /*
        @@@
        @run_with_signals();
        . Starts the reaper and the signal listener before anything else, so no signal is lost during startup.
        . Races startup+drain against the first shutdown signal; the loser is dropped.
        . Whichever path wins, cleanup runs exactly once afterwards. Startup failures skip it.
    */
    pub async fn run_with_signals<S>(mut self, signals: S) -> Result<ExitReason, SupervisorError>
    where
        S: Stream<Item = ShutdownSignal> + Send + 'static,
    {
        let reaper = self.reap_interval.map(|interval| {
            tokio::spawn(reap_children(self.child_pid.clone(), interval).in_current_span())
        });

        let (notify, mut shutdown) = oneshot::channel();
        let listener = tokio::spawn(
            listen(signals, self.child_pid.clone(), self.lifecycle.clone(), notify)
                .in_current_span(),
        );

        let drained = {
            let drain = start_and_drain(
                &self.command,
                self.sink.as_mut(),
                self.codec.clone(),
                self.echo_records,
                &self.child_pid,
                &self.lifecycle,
            );
            tokio::select! {
                biased;
                Ok(signal) = &mut shutdown => Ok(Some(signal)),
                res = drain => res.map(|()| None),
            }
        };

        let signal = match drained {
            Ok(signal) => signal,
            Err(e) => {
                listener.abort();
                if let Some(reaper) = reaper {
                    reaper.abort();
                }
                return Err(e);
            }
        };

        let reason = match signal {
            Some(signal) => ExitReason::Signal(signal),
            None if self.lifecycle.begin_shutdown() => ExitReason::ChildExited,
            // the listener claimed shutdown first and is about to report it
            None => match shutdown.await {
                Ok(signal) => ExitReason::Signal(signal),
                Err(_) => ExitReason::ChildExited,
            },
        };

        // no grace period: the child may still be writing when the sink closes
        info!(reason = ?reason, sink = self.sink.name(), "Triggering sink shutdown");
        if let Err(e) = self.sink.cleanup().await {
            error!(sink = self.sink.name(), error = %e, "Error cleaning up sink");
        }
        self.lifecycle.mark_terminated();

        listener.abort();
        if let Some(reaper) = reaper {
            reaper.abort();
        }
        Ok(reason)
    }
}



/*
    @@@
    @start_and_drain();
    . Sets the sink up (failures are logged, never fatal) and spawns the child with stdout inherited and stderr piped.
    . Publishes the pid for the signal listener and the reaper.
    . Frames stderr into records and emits each one until the stream closes; read and emit errors are logged and skipped.
*/
async fn start_and_drain(
    command: &Command,
    sink: &mut dyn Sink,
    codec: LogCodec,
    echo_records: bool,
    child_pid: &ChildPid,
    lifecycle: &Lifecycle,
) -> Result<(), SupervisorError> {
    if let Err(e) = sink.setup().await {
        warn!(sink = sink.name(), error = %e, "sink setup failed; continuing");
    }

    let program = command.display_name();
    let mut child = ProcessCommand::new(&command.program)
        .args(&command.args)
        .stdout(Stdio::inherit())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| SupervisorError::Spawn {
            program: program.clone(),
            source,
        })?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| SupervisorError::StderrUnavailable {
            program: program.clone(),
        })?;

    if let Some(id) = child.id() {
        child_pid.set(Pid::from_raw(id as i32));
    }
    if !lifecycle.mark_running() {
        debug!("shutdown began during startup; not draining");
        return Ok(());
    }
    info!(program = %program, pid = ?child.id(), "Spawned child");

    let mut records = FramedRead::new(stderr, codec);
    while let Some(next) = records.next().await {
        match next {
            Ok(record) => {
                if echo_records {
                    info!(target: "haberdasher::child", "{}", record);
                }
                if let Err(e) = sink.emit(&record).await {
                    warn!(sink = sink.name(), error = %e, "failed to emit record; dropped");
                }
            }
            Err(e) => warn!(error = %e, "failed to read child stderr"),
        }
    }

    info!(program = %program, "Child stderr closed");
    Ok(())
}
