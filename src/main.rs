use anyhow::Result;

use ecosort::config::Config;
use ecosort::ecobot::{self, EcoState};

#[tokio::main]
async fn main() -> Result<()> {
    // Begin logger
    env_logger::init();

    // Load tokens, webhooks and database path from .env
    let config = Config::from_env()?;
    log::info!("Using database {} with {} day boundary", config.db_path, config.day_boundary);

    // Initialize database
    let state = EcoState::new(config)?;

    if let Err(why) = ecobot::run_ecobot(state).await {
        log::error!("Client error: {why:?}");
        return Err(why);
    }

    Ok(())
}
