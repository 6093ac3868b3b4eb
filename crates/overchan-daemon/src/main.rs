//! `overchand` — federated overlay-chan NNTP relay.

use anyhow::Result;
use clap::Parser;
use overchan_daemon::{Args, Config, Daemon};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("starting overchand v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load(&args.config, &args)?;
    info!(instance = %config.daemon.instance_name, bind = %config.daemon.bind, feeds = config.feeds.len(), "configuration loaded");

    let daemon = Daemon::new(config)?;

    tokio::select! {
        result = daemon.run() => {
            if let Err(e) = result {
                tracing::error!("daemon error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    info!("overchand stopped");
    Ok(())
}
