use anyhow::{Context, Result};
use log::{error, info};
use std::sync::Arc;
use tokio::signal;

use bubblemaps_bot::{
    bot::{run_polling, Bot},
    composer::Composer,
    config::{BotConfig, RuntimeConfig},
    constants::Env,
    holders::HolderMapClient,
    market::CoinGeckoClient,
    metrics::install_exporter,
    pool::WorkerPool,
    telegram::TelegramClient,
    utils::setup_logger,
    visual::BrowserSession,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment and logging
    dotenv::dotenv().ok();
    let env = Env::new();
    setup_logger(&env.log_level)?;

    // Load and validate configurations
    let config = Arc::new(BotConfig::from_env(&env)?);
    config.validate_all()?;
    let runtime = RuntimeConfig::default();
    runtime.validate_all()?;
    info!("Starting Bubblemaps bot with {:?}", config);

    if let Some(port) = config.metrics_port {
        install_exporter(port)?;
    }

    // Shared resources
    let pool = WorkerPool::new(runtime.worker_pool_size);
    let holders = Arc::new(
        HolderMapClient::new(&config, &runtime, pool.clone())
            .context("building holder map client")?,
    );
    let market = Arc::new(
        CoinGeckoClient::new(&config, &runtime, pool.clone())
            .context("building market data client")?,
    );
    let browser = Arc::new(
        BrowserSession::new(&config, &runtime, pool.clone())
            .context("building webdriver client")?,
    );
    let composer = Arc::new(Composer::new(
        holders,
        market,
        browser.clone(),
        runtime.request_deadline,
    ));

    let telegram = Arc::new(TelegramClient::new(&config, &runtime).context("building telegram client")?);
    let me = telegram.get_me().await.context("checking bot token")?;
    info!(
        "Authorized as @{} ({})",
        me.username.as_deref().unwrap_or("unknown"),
        me.id
    );

    let bot = Arc::new(Bot::new(telegram.clone(), composer));

    tokio::select! {
        result = run_polling(telegram, bot) => {
            if let Err(e) = &result {
                error!("Polling stopped: {:#}", e);
            }
            result?;
        }
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    browser.shutdown().await;
    info!("Bubblemaps bot stopped");
    Ok(())
}
