mod config;
mod sweep;

use std::sync::Arc;

use optin_db::Database;
use tracing::info;

use crate::config::SweeperConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "optin_sweeper=info,optin_db=info".into()),
        )
        .init();

    let config = SweeperConfig::from_env();
    let db = Arc::new(Database::open(&config.db_path)?);

    if config.once {
        let removed = sweep::sweep_in_background(db).await?;
        info!("Pruned {} expired opt-in tokens", removed);
        return Ok(());
    }

    info!(
        "Opt-in sweeper running every {}s against {}",
        config.interval.as_secs(),
        config.db_path.display()
    );

    tokio::select! {
        _ = sweep::run_sweep_loop(db, config.interval) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}
