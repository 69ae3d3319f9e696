use anyhow::{Context, Result};
use log::info;
use std::sync::Arc;

use rubiguard::bot::storage::UserStore;
use rubiguard::bot::GroupBot;
use rubiguard::platforms::rubika::{RubikaConfig, RubikaConnection};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables and initialize logging
    dotenv::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Starting RubiGuard v{}", rubiguard::VERSION);

    let config = RubikaConfig::from_env()?;
    let store = Arc::new(UserStore::load(config.data_file.clone()).await);

    let mut connection = RubikaConnection::new(config);
    connection.connect().await?;
    let events = connection
        .get_event_receiver()
        .context("No event receiver after connect")?;

    let bot = Arc::new(GroupBot::new(Arc::new(connection), store)?);
    bot.run(events).await;

    info!("RubiGuard stopped");
    Ok(())
}
