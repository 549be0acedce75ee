use std::sync::Arc;

use clap::Parser;
use eyre::Result;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;

use worker::broker::Broker;
use worker::config::Cli;
use worker::hypervisor;
use worker::job;
use worker::lifecycle;
use worker::pool;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    hypervisor::sweep_orphan_sockets(std::process::id()).await;

    tracing::info!("connecting to broker at {}", cli.broker_url);
    let broker = Arc::new(Broker::connect(&cli.broker_url).await?);

    let shutdown = CancellationToken::new();
    lifecycle::install(shutdown.clone());

    let pool = Arc::new(tokio::sync::Mutex::new(pool::spawn(
        cli.hypervisor_config(),
        cli.pool_capacity,
        shutdown.clone(),
    )));

    tracing::info!("waiting for jobs...");

    let broker_for_loop = broker.clone();
    let pool_for_loop = pool.clone();
    let consume = tokio::spawn(async move {
        broker_for_loop
            .consume_jobs(|envelope| {
                let pool = pool_for_loop.clone();
                let broker = broker_for_loop.clone();
                tokio::spawn(job::run(envelope, pool, broker));
            })
            .await
    });

    tokio::select! {
        result = consume => {
            if let Ok(Err(e)) = result {
                tracing::error!(error = %e, "broker consumer exited with an error");
            }
        }
        _ = shutdown.cancelled() => {
            tracing::info!("shutdown signal received, exiting");
        }
    }

    pool::drain_and_teardown(&mut *pool.lock().await).await;
    hypervisor::sweep_orphan_sockets(std::process::id()).await;

    tracing::info!("worker gracefully exited");
    Ok(())
}
