//! Slack Agent binary entry point.

use slack_agent::bot::Bot;
use slack_agent::config::BotConfig;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = match BotConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();
    info!(config = ?config, "starting slack-agent");

    if let Err(e) = run(config).await {
        error!(error = %e, "slack-agent stopped with an error");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(config: BotConfig) -> slack_agent::error::Result<()> {
    let bot = Bot::connect(&config).await?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        signal.cancel();
    });

    bot.run(&config, shutdown).await
}
