use std::sync::Arc;

use taskforge::config::ForgeConfig;
use taskforge::queue::RedisQueue;
use taskforge::{ForgeResult, HandlerRegistry, TaskForge, handlers, http, logging};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ForgeResult<()> {
    dotenvy::dotenv().ok();

    let config = ForgeConfig::from_env()?;
    logging::init(&config.logging)?;

    let queue = RedisQueue::from_config(&config.queue).await?;
    let registry = handlers::register_builtin(HandlerRegistry::builder()).build();

    // Bind before starting workers so a busy port fails fast.
    let listener = TcpListener::bind(&config.server.listen_addr).await?;

    let forge = TaskForge::new(config, Arc::new(queue), registry)?;
    forge.start().await?;

    let shutdown = CancellationToken::new();
    let server = tokio::spawn(http::serve(listener, forge.metrics(), shutdown.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");

    let report = forge.stop().await?;
    info!(?report, "Workers stopped");

    shutdown.cancel();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Metrics endpoint failed"),
        Err(e) => error!(error = %e, "Metrics endpoint task panicked"),
    }

    Ok(())
}
