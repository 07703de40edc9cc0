use serde::Deserialize;

use crate::types::Channel;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string (broker queues + search cache)
    pub redis_url: String,

    /// Queue name for email notification tasks
    pub email_queue: String,

    /// Queue name for SMS notification tasks
    pub sms_queue: String,

    /// Number of contacts the producer creates per run (default: 10)
    pub dispatch_count: usize,

    /// How long a consumer blocks waiting for a delivery before re-checking
    /// the shutdown signal, in milliseconds (default: 1000)
    pub consumer_block_ms: u64,

    /// Maximum number of PostgreSQL connections in the pool (default: 10)
    pub db_max_connections: u32,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            email_queue: std::env::var("EMAIL_QUEUE")
                .unwrap_or_else(|_| "notify:email".to_string()),
            sms_queue: std::env::var("SMS_QUEUE").unwrap_or_else(|_| "notify:sms".to_string()),
            dispatch_count: std::env::var("DISPATCH_COUNT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DISPATCH_COUNT must be a valid usize"))?,
            consumer_block_ms: std::env::var("CONSUMER_BLOCK_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("CONSUMER_BLOCK_MS must be a valid u64"))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
        })
    }

    /// Resolve the queue a channel's tasks are routed to.
    ///
    /// This is the only routing rule in the system.
    pub fn queue_name(&self, channel: Channel) -> &str {
        match channel {
            Channel::Email => &self.email_queue,
            Channel::Sms => &self.sms_queue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AppConfig {
        AppConfig {
            database_url: "postgres://localhost/courier".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
            email_queue: "notify:email".to_string(),
            sms_queue: "notify:sms".to_string(),
            dispatch_count: 10,
            consumer_block_ms: 1000,
            db_max_connections: 10,
        }
    }

    #[test]
    fn test_queue_name_per_channel() {
        let config = test_config();
        assert_eq!(config.queue_name(Channel::Email), "notify:email");
        assert_eq!(config.queue_name(Channel::Sms), "notify:sms");
    }
}
