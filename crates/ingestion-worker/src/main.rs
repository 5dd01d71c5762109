use anyhow::Result;
use rag_core::{DbPool, KeyPool};
use std::sync::Arc;
use tracing::{error, info};

mod config;
mod document;
mod utils;
mod worker;

use config::Settings;
use worker::IngestionWorkerPool;

#[tokio::main]
async fn main() -> Result<()> {
    utils::logger::init_logger()?;

    info!("starting ingestion worker");

    let settings = Settings::load()?;
    info!("configuration loaded");

    let db_pool = DbPool::new(&settings.database).await?;
    db_pool.migrate().await?;
    info!("database connection established");

    let key_pool = Arc::new(KeyPool::new(&settings.key_pool));

    let pool = IngestionWorkerPool::new(settings, db_pool).await?;
    info!("ingestion worker pool initialized");

    match pool.run(key_pool).await {
        Ok(_) => info!("ingestion worker stopped gracefully"),
        Err(e) => error!("ingestion worker error: {}", e),
    }

    Ok(())
}
