use haberdasher::{config, logger, sink, Command, Supervisor};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load()?;
    let guard = logger::logs_tracing(cfg.level()?)?;

    info!("Initializing haberdasher.");
    info!(emitter = %cfg.emitter, "Configured emitter");

    let command = Command::from_args(std::env::args_os().skip(1))?;
    let sink = sink::build(&cfg)?;

    let reason = Supervisor::from_config(command, sink, &cfg).run().await?;
    info!(reason = ?reason, "Supervisor finished");

    // exit without waiting on the reaper or the child; flush diagnostics first
    drop(guard);
    std::process::exit(0);
}
