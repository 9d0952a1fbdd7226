//! Gravwell game server.

use gravwell_server::{config::Config, server};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Gravwell Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load()?;
    info!("Loaded configuration");
    info!("  Port: {}", config.server.port);
    info!("  Map: {}x{}", config.map.width, config.map.height);
    info!("  Particle cap: {}", config.particle.cap);

    // Start the game server
    server::run(config).await?;

    Ok(())
}
