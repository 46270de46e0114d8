use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use log::info;

use photolog::location::AlwaysGranted;
use photolog::reminder::LogNotifier;
use photolog::App;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("photolog starting up...");

    let data_dir = std::env::var_os("PHOTOLOG_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data"));

    let app = App::bootstrap(&data_dir, Arc::new(AlwaysGranted), Arc::new(LogNotifier))
        .context("failed to bootstrap photolog")?;

    // Re-arm the daily reminder from persisted settings so the alarm
    // survives restarts.
    app.apply_reminder_settings().await;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("photolog shutting down");
    app.reminders.disarm().await;

    Ok(())
}
