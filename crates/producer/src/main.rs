use std::sync::Arc;

use uuid::Uuid;

use courier_common::config::AppConfig;
use courier_common::db::create_pool;
use courier_common::redis_pool::create_redis_pool;
use courier_producer::Producer;
use courier_queue::RedisBroker;
use courier_store::PgContactStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_producer=info,courier_queue=info".into()),
        )
        .init();

    tracing::info!("Courier producer starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database and apply migrations
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    // An unreachable broker aborts the run before any contact is created.
    let redis = create_redis_pool(&config.redis_url).await?;
    let broker = RedisBroker::new(redis, format!("producer-{}", Uuid::new_v4()));

    let producer = Producer::new(
        Arc::new(PgContactStore::new(pool)),
        Arc::new(broker),
        config.clone(),
    );

    let summary = producer.dispatch(config.dispatch_count).await?;

    tracing::info!(
        created = summary.created,
        published = summary.published,
        skipped = summary.skipped,
        "Courier producer finished"
    );

    // Store pool and broker connection are released on drop here.
    Ok(())
}
