//! Redis Streams broker.
//!
//! Each queue is a stream consumed through a single consumer group:
//! - declare: `XGROUP CREATE <queue> <group> 0 MKSTREAM`, tolerating
//!   `BUSYGROUP` so producer and consumer can both declare
//! - publish: `XADD` (stream entries survive a broker restart)
//! - receive: reclaim a delivery left pending too long by a crashed or
//!   disconnected consumer (`XAUTOCLAIM`), otherwise block briefly on
//!   `XREADGROUP`
//! - ack: `XACK`
//!
//! Unacked deliveries stay in the group's pending entries list and are
//! eventually reclaimed by whichever consumer asks next, which is what makes
//! delivery at-least-once rather than at-most-once.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamAutoClaimOptions, StreamAutoClaimReply, StreamId, StreamReadOptions, StreamReadReply,
};

use courier_common::error::AppError;

use crate::{Delivery, TaskQueue, dead_letter_queue};

/// Consumer group every Courier process joins.
const GROUP: &str = "couriers";

/// How long a delivery may sit unacked before another consumer reclaims it,
/// in milliseconds.
const RECLAIM_IDLE_MS: u64 = 30_000;

/// Field holding the message body within a stream entry.
const BODY_FIELD: &str = "body";

/// Task broker backed by Redis Streams.
pub struct RedisBroker {
    redis: ConnectionManager,
    consumer: String,
}

impl RedisBroker {
    /// Wrap an established Redis connection. `consumer` names this process
    /// within the consumer group; competing consumers on the same queue must
    /// use distinct names.
    pub fn new(redis: ConnectionManager, consumer: impl Into<String>) -> Self {
        Self {
            redis,
            consumer: consumer.into(),
        }
    }

    fn delivery_from_entry(entry: StreamId) -> Delivery {
        // An entry without a body field decodes to an empty body, which the
        // consumer classifies as malformed and drops via ack.
        let body: Vec<u8> = entry.get(BODY_FIELD).unwrap_or_default();
        Delivery { id: entry.id, body }
    }
}

#[async_trait]
impl TaskQueue for RedisBroker {
    async fn declare(&self, queue: &str) -> Result<(), AppError> {
        let mut redis = self.redis.clone();

        let created: Result<(), redis::RedisError> = redis
            .xgroup_create_mkstream(queue, GROUP, "0")
            .await;

        match created {
            Ok(()) => {
                tracing::info!(queue, group = GROUP, "Declared queue");
                Ok(())
            }
            // The group already exists: another process declared first.
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn publish(&self, queue: &str, body: &[u8]) -> Result<(), AppError> {
        let mut redis = self.redis.clone();

        let id: String = redis.xadd(queue, "*", &[(BODY_FIELD, body)]).await?;

        tracing::debug!(queue, delivery_id = %id, "Published task");
        Ok(())
    }

    async fn receive(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<Delivery>, AppError> {
        let mut redis = self.redis.clone();

        // Prefer deliveries abandoned by other consumers over new ones so a
        // crash doesn't leave messages parked in the pending list.
        let reclaimed: StreamAutoClaimReply = redis
            .xautoclaim_options(
                queue,
                GROUP,
                &self.consumer,
                RECLAIM_IDLE_MS,
                "0-0",
                StreamAutoClaimOptions::default().count(1),
            )
            .await?;

        if let Some(entry) = reclaimed.claimed.into_iter().next() {
            tracing::debug!(queue, delivery_id = %entry.id, "Reclaimed pending delivery");
            return Ok(Some(Self::delivery_from_entry(entry)));
        }

        let opts = StreamReadOptions::default()
            .group(GROUP, &self.consumer)
            .count(1)
            .block(timeout.as_millis() as usize);

        let reply: StreamReadReply = redis.xread_options(&[queue], &[">"], &opts).await?;

        for key in reply.keys {
            if let Some(entry) = key.ids.into_iter().next() {
                return Ok(Some(Self::delivery_from_entry(entry)));
            }
        }

        Ok(None)
    }

    async fn ack(&self, queue: &str, delivery: &Delivery) -> Result<(), AppError> {
        let mut redis = self.redis.clone();

        let _acked: i64 = redis.xack(queue, GROUP, &[&delivery.id]).await?;
        Ok(())
    }

    async fn dead_letter(
        &self,
        queue: &str,
        delivery: &Delivery,
        reason: &str,
    ) -> Result<(), AppError> {
        let mut redis = self.redis.clone();
        let dlq = dead_letter_queue(queue);

        let id: String = redis
            .xadd(
                &dlq,
                "*",
                &[
                    (BODY_FIELD, delivery.body.as_slice()),
                    ("reason", reason.as_bytes()),
                    ("source_id", delivery.id.as_bytes()),
                ],
            )
            .await?;

        tracing::warn!(
            queue,
            dead_letter_id = %id,
            source_id = %delivery.id,
            reason,
            "Routed delivery to dead-letter queue"
        );
        Ok(())
    }
}
