use tenant_webhooks::config::Config;
use tenant_webhooks::pipeline::Pipeline;
use tenant_webhooks::server::Server;
use tenant_webhooks::telemetry;
use tokio::sync::watch;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    // Load configuration
    let config = Config::load()?;
    telemetry::init_tracing(config.log.format);
    tracing::info!("Loaded configuration: {:?}", config);

    let pipeline = Pipeline::from_config(&config)?;

    // Delivery workers run until the server stops
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = pipeline.worker.clone().spawn(shutdown_rx);

    // Create and run server
    let server = Server::new(&config, &pipeline).await?;
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await?;

    tracing::info!("Shutting down delivery workers");
    shutdown_tx.send(true)?;
    for worker in workers {
        worker.await?;
    }
    Ok(())
}
