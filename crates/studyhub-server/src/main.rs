//! # StudyHub Server
//!
//! Realtime hub for StudyHub study groups.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! studyhub
//!
//! # Run with a custom config file
//! STUDYHUB_CONFIG=/path/to/studyhub.toml studyhub
//!
//! # Run with environment overrides
//! STUDYHUB_PORT=8080 STUDYHUB_HOST=0.0.0.0 STUDYHUB_DATABASE__BACKEND=memory studyhub
//! ```

use anyhow::Result;
use studyhub_server::{config, handlers, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studyhub=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::load()?;

    tracing::info!("Starting StudyHub server on {}:{}", config.host, config.port);

    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}
