use std::sync::Arc;

use tokio::sync::watch;
use uuid::Uuid;

use courier_common::config::AppConfig;
use courier_common::db::create_pool;
use courier_common::redis_pool::create_redis_pool;
use courier_common::types::Channel;
use courier_consumer::{StubNotifier, Worker};
use courier_queue::RedisBroker;
use courier_store::PgContactStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_consumer=info,courier_queue=info".into()),
        )
        .init();

    let channel: Channel = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: courier-consumer <email|sms>"))?
        .parse()?;

    tracing::info!(%channel, "Courier consumer starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;

    // An unreachable broker aborts startup.
    let redis = create_redis_pool(&config.redis_url).await?;
    let broker = RedisBroker::new(redis, format!("{}-{}", channel, Uuid::new_v4()));

    let worker = Worker::new(
        channel,
        Arc::new(PgContactStore::new(pool)),
        Arc::new(broker),
        Arc::new(StubNotifier),
        &config,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut run = tokio::spawn(async move { worker.run(shutdown_rx).await });

    // Run until the worker exits on its own (broker failure) or Ctrl+C asks
    // for a drain-and-stop.
    tokio::select! {
        result = &mut run => result??,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, draining in-flight delivery...");
            let _ = shutdown_tx.send(true);
            run.await??;
        }
    }

    tracing::info!(%channel, "Courier consumer stopped.");
    Ok(())
}
