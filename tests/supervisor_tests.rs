use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use haberdasher::{
    Command, Config, ExitReason, LogRecord, ShutdownSignal, Sink, SinkError, Supervisor,
    SupervisorError,
};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_test::traced_test;

#[derive(Default)]
struct Calls {
    setup: AtomicUsize,
    cleanup: AtomicUsize,
    records: Mutex<Vec<String>>,
}

impl Calls {
    fn setup(&self) -> usize {
        self.setup.load(Ordering::SeqCst)
    }

    fn cleanup(&self) -> usize {
        self.cleanup.load(Ordering::SeqCst)
    }

    fn records(&self) -> Vec<String> {
        self.records.lock().unwrap().clone()
    }
}

/// Remembers everything it is asked to do.
#[derive(Default)]
struct RecordingSink {
    calls: Arc<Calls>,
    setup_delay: Option<Duration>,
    fail_emits: bool,
    fail_cleanup: bool,
}

impl RecordingSink {
    fn new() -> (Self, Arc<Calls>) {
        let sink = Self::default();
        let calls = sink.calls.clone();
        (sink, calls)
    }
}

#[async_trait]
impl Sink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn setup(&mut self) -> Result<(), SinkError> {
        self.calls.setup.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.setup_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn emit(&mut self, record: &LogRecord) -> Result<(), SinkError> {
        self.calls.records.lock().unwrap().push(record.to_string());
        if self.fail_emits {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink gone").into());
        }
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<(), SinkError> {
        self.calls.cleanup.fetch_add(1, Ordering::SeqCst);
        if self.fail_cleanup {
            return Err(io::Error::new(io::ErrorKind::Other, "flush failed").into());
        }
        Ok(())
    }
}

fn sh(script: &str) -> Command {
    Command {
        program: "sh".into(),
        args: vec!["-c".into(), script.into()],
    }
}

#[tokio::test]
async fn child_exit_drains_records_and_cleans_up_once() {
    let (sink, calls) = RecordingSink::new();
    let sup = Supervisor::new(
        sh(r"printf 'ERROR: boom\n  at foo\n  at bar\nNEXT: ok\n' >&2"),
        Box::new(sink),
    );

    let reason = sup.run_with_signals(stream::pending()).await.unwrap();

    assert_eq!(reason, ExitReason::ChildExited);
    assert_eq!(calls.records(), vec!["ERROR: boom\n  at foo\n  at bar", "NEXT: ok"]);
    assert_eq!(calls.setup(), 1);
    assert_eq!(calls.cleanup(), 1);
}

#[tokio::test]
async fn stdout_is_not_tokenized() {
    let (sink, calls) = RecordingSink::new();
    let sup = Supervisor::new(sh("echo to-stdout; echo to-stderr >&2"), Box::new(sink));

    sup.run_with_signals(stream::pending()).await.unwrap();

    assert_eq!(calls.records(), vec!["to-stderr"]);
}

#[tokio::test]
async fn arguments_are_passed_verbatim() {
    let (sink, calls) = RecordingSink::new();
    let cmd = Command {
        program: "sh".into(),
        args: vec![
            "-c".into(),
            r#"printf '%s\n' "$1" "$2" >&2"#.into(),
            "sh".into(),
            "two words".into(),
            "  leading".into(),
        ],
    };

    Supervisor::new(cmd, Box::new(sink))
        .run_with_signals(stream::pending())
        .await
        .unwrap();

    // the second argument is indented, so it folds into the first
    assert_eq!(calls.records(), vec!["two words\n  leading"]);
}

#[tokio::test]
#[traced_test]
async fn signal_before_spawn_skips_forward_but_cleans_up() {
    let (mut sink, calls) = RecordingSink::new();
    sink.setup_delay = Some(Duration::from_millis(200));
    let sup = Supervisor::new(sh("sleep 5"), Box::new(sink));
    let pid = sup.child_pid();

    let signals = stream::iter([ShutdownSignal::Terminate]).chain(stream::pending());
    let reason = sup.run_with_signals(signals).await.unwrap();

    assert_eq!(reason, ExitReason::Signal(ShutdownSignal::Terminate));
    assert!(pid.get().is_none());
    assert_eq!(calls.cleanup(), 1);
    assert!(calls.records().is_empty());
    assert!(logs_contain("skipping forward"));
}

#[tokio::test]
#[traced_test]
async fn signal_is_forwarded_to_running_child() {
    let (sink, calls) = RecordingSink::new();
    let sup = Supervisor::new(sh("exec sleep 30"), Box::new(sink));
    let pid = sup.child_pid();

    let watch = pid.clone();
    let signals = stream::once(async move {
        while watch.get().is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        ShutdownSignal::Interrupt
    })
    .chain(stream::pending());

    let reason = sup.run_with_signals(signals).await.unwrap();

    assert_eq!(reason, ExitReason::Signal(ShutdownSignal::Interrupt));
    assert!(pid.get().is_some());
    assert_eq!(calls.cleanup(), 1);
    assert!(logs_contain("Forwarded signal to child"));
}

#[tokio::test]
async fn missing_executable_is_fatal_without_cleanup() {
    let (sink, calls) = RecordingSink::new();
    let cmd = Command {
        program: "/nonexistent/definitely-not-here".into(),
        args: Vec::new(),
    };

    let err = Supervisor::new(cmd, Box::new(sink))
        .run_with_signals(stream::pending())
        .await
        .unwrap_err();

    assert!(matches!(err, SupervisorError::Spawn { .. }));
    assert_eq!(err.as_label(), "spawn_failed");
    assert_eq!(calls.cleanup(), 0);
}

#[tokio::test]
#[traced_test]
async fn emit_failures_do_not_stop_draining() {
    let (mut sink, calls) = RecordingSink::new();
    sink.fail_emits = true;
    let sup = Supervisor::new(sh("echo one >&2; echo two >&2; echo three >&2"), Box::new(sink));

    let reason = sup.run_with_signals(stream::pending()).await.unwrap();

    assert_eq!(reason, ExitReason::ChildExited);
    assert_eq!(calls.records(), vec!["one", "two", "three"]);
    assert_eq!(calls.cleanup(), 1);
    assert!(logs_contain("failed to emit record"));
}

#[tokio::test]
#[traced_test]
async fn cleanup_failure_still_exits_normally() {
    let (mut sink, calls) = RecordingSink::new();
    sink.fail_cleanup = true;
    let sup = Supervisor::new(sh("true"), Box::new(sink));

    let reason = sup.run_with_signals(stream::pending()).await.unwrap();

    assert_eq!(reason, ExitReason::ChildExited);
    assert_eq!(calls.cleanup(), 1);
    assert!(logs_contain("Error cleaning up sink"));
}

#[tokio::test]
#[traced_test]
async fn records_are_echoed_for_non_default_sinks() {
    let (sink, _calls) = RecordingSink::new();
    let sup = Supervisor::new(sh("echo hello-from-child >&2"), Box::new(sink)).with_echo(true);

    sup.run_with_signals(stream::pending()).await.unwrap();

    assert!(logs_contain("hello-from-child"));
}

// Only one test in this binary may run a reaper: waitpid(-1) would steal
// another test's supervised child.
#[tokio::test]
async fn configured_supervisor_applies_record_limit() {
    let (sink, calls) = RecordingSink::new();
    let cfg = Config {
        reap_orphans: false,
        max_record_len: Some(8),
        ..Config::default()
    };
    let sup = Supervisor::from_config(sh("printf 'abcdefghij' >&2"), Box::new(sink), &cfg);

    let reason = sup.run_with_signals(stream::pending()).await.unwrap();

    assert_eq!(reason, ExitReason::ChildExited);
    assert_eq!(calls.records(), vec!["abcdefgh", "ij"]);
    assert_eq!(calls.cleanup(), 1);
}

#[tokio::test]
#[traced_test]
async fn signal_after_child_reaped_is_not_forwarded() {
    let (sink, calls) = RecordingSink::new();
    let cfg = Config {
        reap_interval_ms: 20,
        ..Config::default()
    };
    // the background sleep keeps stderr open after the child itself is gone
    let sup = Supervisor::from_config(sh("sleep 2 & exit 0"), Box::new(sink), &cfg);
    let pid = sup.child_pid();

    let watch = pid.clone();
    let signals = stream::once(async move {
        for _ in 0..300 {
            if watch.has_exited() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        ShutdownSignal::Terminate
    })
    .chain(stream::pending());

    let reason = sup.run_with_signals(signals).await.unwrap();

    assert_eq!(reason, ExitReason::Signal(ShutdownSignal::Terminate));
    assert!(pid.has_exited());
    assert!(pid.get().is_none());
    assert_eq!(calls.cleanup(), 1);
    assert!(logs_contain("Supervised child exited"));
    assert!(logs_contain("child already exited; skipping forward"));
    assert!(!logs_contain("Forwarded signal to child"));
    assert!(!logs_contain("failed to forward signal"));
    assert!(!logs_contain("ESRCH"));
}
