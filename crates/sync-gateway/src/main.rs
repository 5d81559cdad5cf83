use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "sync-gateway", about = "CouchDB-compatible sync gateway")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs the HTTP server.
    Serve(sync_gateway::cmd::serve::Args),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => sync_gateway::cmd::serve::run(args).await,
    }
}
