use tracing_subscriber::fmt::{SubscriberBuilder};
use tracing_appender::non_blocking::WorkerGuard;



/*
    @@@
    @logs_tracing();
    . Wraps the supervisor's own stderr in a non-blocking writer so a slow terminal never stalls the drain loop.
    . Configures a tracing subscriber at `level` (with timestamps and targets) on that writer.
    . Keeps the writer alive by returning the guard; drop it before exiting to flush pending lines.
*/
pub fn logs_tracing(level: tracing::Level) -> anyhow::Result<WorkerGuard> {
    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());

    let subscriber = SubscriberBuilder::default()
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_writer(non_blocking)
        .with_max_level(level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(guard)
}
