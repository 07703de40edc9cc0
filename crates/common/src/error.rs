use thiserror::Error;

/// Common error types used across the application.
///
/// Recoverable consumer-side conditions (malformed bodies, stale contact
/// references) are classified here so the worker can decide between dropping
/// a delivery and routing it to the dead-letter queue; everything reaching a
/// binary boundary is reported through `anyhow`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("broker error: {0}")]
    Broker(#[from] redis::RedisError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("malformed task message: {0}")]
    MalformedMessage(String),

    #[error("notification delivery failed: {0}")]
    Notify(String),
}
