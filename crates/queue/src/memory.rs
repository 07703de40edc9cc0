//! In-memory broker for tests and local development.
//!
//! Mirrors the at-least-once contract of the Redis implementation: deliveries
//! move to a pending set until acked, and `redeliver_pending` hands copies of
//! unacked deliveries out again, the way a real broker redelivers after a
//! consumer crash or a reclaim timeout.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use courier_common::error::AppError;

use crate::{Delivery, TaskQueue};

/// A message parked on a dead-letter queue, with the reason it landed there.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub body: Vec<u8>,
    pub reason: String,
    pub source_id: String,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Delivery>,
    pending: HashMap<String, Delivery>,
    dead: Vec<DeadLetter>,
    next_id: u64,
}

/// In-process task broker.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    queues: Arc<Mutex<HashMap<String, QueueState>>>,
    notify: Arc<Notify>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out fresh copies of every unacked delivery on `queue`, as a real
    /// broker would after a consumer crash. The originals stay pending until
    /// acked, so two consumers can briefly hold the same message.
    pub async fn redeliver_pending(&self, queue: &str) -> usize {
        let mut queues = self.queues.lock().await;
        let state = queues.entry(queue.to_string()).or_default();

        let copies: Vec<Delivery> = state.pending.values().cloned().collect();
        let count = copies.len();
        state.ready.extend(copies);

        drop(queues);
        if count > 0 {
            self.notify.notify_one();
        }
        count
    }

    /// Number of deliveries waiting to be received on `queue`.
    pub async fn depth(&self, queue: &str) -> usize {
        let mut queues = self.queues.lock().await;
        queues.entry(queue.to_string()).or_default().ready.len()
    }

    /// Number of received-but-unacked deliveries on `queue`.
    pub async fn pending_count(&self, queue: &str) -> usize {
        let mut queues = self.queues.lock().await;
        queues.entry(queue.to_string()).or_default().pending.len()
    }

    /// Messages routed to `queue`'s dead-letter queue so far.
    pub async fn dead_letters(&self, queue: &str) -> Vec<DeadLetter> {
        let mut queues = self.queues.lock().await;
        queues.entry(queue.to_string()).or_default().dead.clone()
    }
}

#[async_trait]
impl TaskQueue for MemoryBroker {
    async fn declare(&self, queue: &str) -> Result<(), AppError> {
        let mut queues = self.queues.lock().await;
        queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn publish(&self, queue: &str, body: &[u8]) -> Result<(), AppError> {
        {
            let mut queues = self.queues.lock().await;
            let state = queues.entry(queue.to_string()).or_default();

            state.next_id += 1;
            let delivery = Delivery {
                id: state.next_id.to_string(),
                body: body.to_vec(),
            };
            state.ready.push_back(delivery);
        }

        // notify_one stores a permit, so a receiver registering just after
        // this publish still wakes immediately.
        self.notify.notify_one();
        Ok(())
    }

    async fn receive(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<Delivery>, AppError> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            {
                let mut queues = self.queues.lock().await;
                let state = queues.entry(queue.to_string()).or_default();

                if let Some(delivery) = state.ready.pop_front() {
                    state.pending.insert(delivery.id.clone(), delivery.clone());
                    return Ok(Some(delivery));
                }
            }

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(None),
            }
        }
    }

    async fn ack(&self, queue: &str, delivery: &Delivery) -> Result<(), AppError> {
        let mut queues = self.queues.lock().await;
        let state = queues.entry(queue.to_string()).or_default();

        state.pending.remove(&delivery.id);
        Ok(())
    }

    async fn dead_letter(
        &self,
        queue: &str,
        delivery: &Delivery,
        reason: &str,
    ) -> Result<(), AppError> {
        let mut queues = self.queues.lock().await;
        let state = queues.entry(queue.to_string()).or_default();

        state.dead.push(DeadLetter {
            body: delivery.body.clone(),
            reason: reason.to_string(),
            source_id: delivery.id.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_receive_ack() {
        let broker = MemoryBroker::new();
        broker.declare("q").await.unwrap();
        broker.publish("q", b"hello").await.unwrap();

        let delivery = broker
            .receive("q", Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.body, b"hello");
        assert_eq!(broker.pending_count("q").await, 1);

        broker.ack("q", &delivery).await.unwrap();
        assert_eq!(broker.pending_count("q").await, 0);
        assert_eq!(broker.depth("q").await, 0);
    }

    #[tokio::test]
    async fn test_receive_times_out_on_empty_queue() {
        let broker = MemoryBroker::new();
        broker.declare("q").await.unwrap();

        let received = broker.receive("q", Duration::from_millis(20)).await.unwrap();
        assert!(received.is_none());
    }

    #[tokio::test]
    async fn test_receive_wakes_on_publish() {
        let broker = MemoryBroker::new();
        broker.declare("q").await.unwrap();

        let waiter = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.receive("q", Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        broker.publish("q", b"late").await.unwrap();

        let delivery = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(delivery.body, b"late");
    }

    #[tokio::test]
    async fn test_redeliver_pending_copies_unacked() {
        let broker = MemoryBroker::new();
        broker.declare("q").await.unwrap();
        broker.publish("q", b"m1").await.unwrap();

        let first = broker
            .receive("q", Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(broker.redeliver_pending("q").await, 1);

        let second = broker
            .receive("q", Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.body, first.body);

        // Acking one copy clears the pending entry; the other ack is a no-op.
        broker.ack("q", &first).await.unwrap();
        broker.ack("q", &second).await.unwrap();
        assert_eq!(broker.pending_count("q").await, 0);
    }

    #[tokio::test]
    async fn test_dead_letter_records_reason() {
        let broker = MemoryBroker::new();
        broker.declare("q").await.unwrap();
        broker.publish("q", b"bad").await.unwrap();

        let delivery = broker
            .receive("q", Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        broker.dead_letter("q", &delivery, "store write failed").await.unwrap();
        broker.ack("q", &delivery).await.unwrap();

        let dead = broker.dead_letters("q").await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].body, b"bad");
        assert_eq!(dead[0].reason, "store write failed");
        assert_eq!(dead[0].source_id, delivery.id);
    }
}
