use crate::cmd::ConfigArgs;
use crate::{config, startup};

#[derive(clap::Args, Debug)]
pub struct Args {
    /// Overrides `application.host`/`application.port` from settings.
    #[arg(long)]
    addr: Option<String>,

    #[clap(flatten)]
    config: ConfigArgs,
}

/// Runs the gateway: loads settings, binds a listener, and serves the
/// Router until a shutdown signal arrives.
pub async fn run(args: Args) -> anyhow::Result<()> {
    let settings = config::load_settings(args.config.config_path.as_deref())?;
    tracing::info!(
        batcher_capacity = settings.replication.batcher_capacity,
        batcher_delay_ms = settings.replication.batcher_delay_ms,
        "loaded settings"
    );

    let addr = args.addr.unwrap_or_else(|| settings.application.address());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    startup::run(listener, startup::app_state()).await
}
