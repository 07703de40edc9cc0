//! Task broker contract and implementations.
//!
//! A queue here is a durable, named, at-least-once channel of task messages:
//! - declaration is idempotent (create-if-absent, both producer and consumer
//!   declare before first use)
//! - published messages survive a broker restart
//! - deliveries are removed only by explicit acknowledgment; an unacked
//!   delivery is eventually handed to another consumer
//! - messages that cannot be processed are routed to a per-queue dead-letter
//!   queue for later inspection instead of silent loss
//!
//! `RedisBroker` is the production implementation (Redis Streams + consumer
//! groups). `MemoryBroker` is an in-process implementation for tests and
//! local development.

use std::time::Duration;

use async_trait::async_trait;

use courier_common::error::AppError;

pub mod memory;
pub mod redis_broker;

pub use memory::MemoryBroker;
pub use redis_broker::RedisBroker;

/// A single message handed to a consumer, pending acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Broker-assigned delivery id, used for acknowledgment.
    pub id: String,
    /// Raw message body as published.
    pub body: Vec<u8>,
}

/// Durable task queue operations shared by producer and consumer.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Declare a queue, creating it if absent. Safe to call repeatedly and
    /// from multiple processes.
    async fn declare(&self, queue: &str) -> Result<(), AppError>;

    /// Publish a message body to a queue. The message is durable: it outlives
    /// both the publishing process and a broker restart.
    async fn publish(&self, queue: &str, body: &[u8]) -> Result<(), AppError>;

    /// Wait up to `timeout` for the next delivery. Returns `None` when the
    /// queue stayed empty, so callers can re-check their shutdown signal
    /// between attempts.
    async fn receive(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<Delivery>, AppError>;

    /// Acknowledge a delivery, removing it from the queue for good.
    async fn ack(&self, queue: &str, delivery: &Delivery) -> Result<(), AppError>;

    /// Copy a delivery's body onto the queue's dead-letter queue with a
    /// reason. The caller still acknowledges the original delivery.
    async fn dead_letter(
        &self,
        queue: &str,
        delivery: &Delivery,
        reason: &str,
    ) -> Result<(), AppError>;
}

/// Name of the dead-letter queue paired with `queue`.
pub fn dead_letter_queue(queue: &str) -> String {
    format!("{queue}:dlq")
}
