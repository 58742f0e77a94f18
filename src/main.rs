use std::sync::Arc;

use supportdesk::{config::Config, server, startup, Data};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration: {:?}", config);

    let data = Arc::new(Data::new(config)?);
    info!("Registered {} tools", data.tools.len());

    let ready = startup::connect_store(
        &data.store,
        data.config.startup_connect_attempts,
        data.config.startup_gate_policy,
    )
    .await;

    if ready {
        let seed = data.config.knowledge_seed.clone();
        if let Err(e) = startup::seed_configuration(&data.store, seed).await {
            error!("Failed to seed configuration: {}", e);
        }
    }

    let listener = tokio::net::TcpListener::bind(&data.config.http_bind).await?;
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutting down...");
    };

    let result = server::serve(data.clone(), listener, shutdown).await;
    data.store.close();
    result
}
