//! Task consumer — one logical worker design, instantiated per channel.
//!
//! The worker runs a cancellable receive loop against its channel's queue
//! with manual acknowledgment. Each delivery ends in exactly one
//! `Disposition`, and every disposition ends in an ack: successfully handled
//! work, intentionally dropped garbage, and dead-lettered failures all leave
//! the queue. The only fatal condition is a broker error, which terminates
//! the loop.
//!
//! Redelivery safety: the notify side effect is gated on winning the store's
//! compare-and-set, so however many consumers hold copies of the same task,
//! at most one sends.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use courier_common::config::AppConfig;
use courier_common::error::AppError;
use courier_common::types::{Channel, Contact, TaskMessage};
use courier_queue::{Delivery, TaskQueue};
use courier_store::ContactStore;

/// How a single delivery was resolved. Every variant is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The contact was claimed and the notification side effect fired.
    Notified,
    /// The contact was already sent (or another consumer won the claim);
    /// idempotent no-op.
    AlreadySent,
    /// The body was not a valid task message; dropped.
    DroppedMalformed,
    /// The referenced contact does not exist; the reference is permanently
    /// stale; dropped.
    DroppedStale,
    /// An unexpected processing failure; the body was copied to the
    /// dead-letter queue for inspection.
    DeadLettered,
}

/// Delivers a notification to a contact over its preferred channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, contact: &Contact) -> Result<(), AppError>;
}

/// Logging stand-in for real email/SMS transport.
pub struct StubNotifier;

#[async_trait]
impl Notifier for StubNotifier {
    async fn notify(&self, contact: &Contact) -> Result<(), AppError> {
        match contact.channel {
            Channel::Email => {
                tracing::info!(
                    contact_id = %contact.id,
                    full_name = %contact.full_name,
                    email = %contact.email,
                    "Sending email (stub)"
                );
            }
            Channel::Sms => {
                let phone = contact.phone_number.as_deref().unwrap_or("<no phone on file>");
                tracing::info!(
                    contact_id = %contact.id,
                    full_name = %contact.full_name,
                    phone,
                    "Sending SMS (stub)"
                );
            }
        }
        Ok(())
    }
}

/// Per-channel notification worker.
pub struct Worker {
    channel: Channel,
    queue: String,
    store: Arc<dyn ContactStore>,
    broker: Arc<dyn TaskQueue>,
    notifier: Arc<dyn Notifier>,
    block_timeout: Duration,
}

impl Worker {
    pub fn new(
        channel: Channel,
        store: Arc<dyn ContactStore>,
        broker: Arc<dyn TaskQueue>,
        notifier: Arc<dyn Notifier>,
        config: &AppConfig,
    ) -> Self {
        Self {
            channel,
            queue: config.queue_name(channel).to_string(),
            store,
            broker,
            notifier,
            block_timeout: Duration::from_millis(config.consumer_block_ms),
        }
    }

    /// Consume the channel queue until `shutdown` flips to true.
    ///
    /// The in-flight delivery is always handled and acknowledged before the
    /// loop observes the signal and exits, so shutdown never abandons work
    /// the broker would have to redeliver.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        self.broker.declare(&self.queue).await?;
        tracing::info!(channel = %self.channel, queue = %self.queue, "Worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let received = tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender counts as a shutdown request.
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                received = self.broker.receive(&self.queue, self.block_timeout) => received?,
            };

            let Some(delivery) = received else {
                continue;
            };

            let disposition = self.handle_delivery(&delivery).await?;

            // Single ack point: handled, dropped, and dead-lettered
            // deliveries all leave the queue here.
            self.broker.ack(&self.queue, &delivery).await?;
            tracing::debug!(
                delivery_id = %delivery.id,
                ?disposition,
                "Delivery acknowledged"
            );
        }

        tracing::info!(channel = %self.channel, queue = %self.queue, "Worker stopped");
        Ok(())
    }

    /// Resolve one delivery to a disposition. The caller acknowledges.
    ///
    /// Errors surface only for broker failures (dead-letter publication);
    /// store and notifier failures are captured in the disposition.
    pub async fn handle_delivery(&self, delivery: &Delivery) -> Result<Disposition, AppError> {
        let message = match TaskMessage::from_bytes(&delivery.body) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(
                    delivery_id = %delivery.id,
                    error = %e,
                    "Dropping malformed task message"
                );
                return Ok(Disposition::DroppedMalformed);
            }
        };

        let contact = match self.store.find_by_id(&message.contact_id).await {
            Ok(contact) => contact,
            Err(e) => {
                return self
                    .to_dead_letter(delivery, &format!("contact lookup failed: {e}"))
                    .await;
            }
        };

        let Some(contact) = contact else {
            tracing::warn!(
                contact_id = %message.contact_id,
                "Dropping task for unknown contact"
            );
            return Ok(Disposition::DroppedStale);
        };

        if contact.sent {
            tracing::debug!(contact_id = %contact.id, "Contact already notified");
            return Ok(Disposition::AlreadySent);
        }

        // Claim before sending: of all consumers holding copies of this
        // task, only the compare-and-set winner performs the side effect.
        let claimed = match self.store.mark_sent(&message.contact_id).await {
            Ok(claimed) => claimed,
            Err(e) => {
                return self
                    .to_dead_letter(delivery, &format!("state update failed: {e}"))
                    .await;
            }
        };

        if !claimed {
            tracing::debug!(
                contact_id = %contact.id,
                "Another consumer claimed the send first"
            );
            return Ok(Disposition::AlreadySent);
        }

        if let Err(e) = self.notifier.notify(&contact).await {
            return self
                .to_dead_letter(delivery, &format!("notification failed: {e}"))
                .await;
        }

        tracing::info!(
            contact_id = %contact.id,
            channel = %self.channel,
            "Contact notified"
        );
        Ok(Disposition::Notified)
    }

    async fn to_dead_letter(
        &self,
        delivery: &Delivery,
        reason: &str,
    ) -> Result<Disposition, AppError> {
        self.broker.dead_letter(&self.queue, delivery, reason).await?;
        Ok(Disposition::DeadLettered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use courier_common::types::NewContact;
    use courier_queue::MemoryBroker;
    use courier_store::{ContactStore, MemoryContactStore};

    fn test_config() -> AppConfig {
        AppConfig {
            database_url: "postgres://localhost/courier".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
            email_queue: "notify:email".to_string(),
            sms_queue: "notify:sms".to_string(),
            dispatch_count: 10,
            consumer_block_ms: 50,
            db_max_connections: 10,
        }
    }

    fn sample(channel: Channel, email: &str) -> NewContact {
        NewContact {
            full_name: "Test Contact".to_string(),
            email: email.to_string(),
            phone_number: Some("+1 555 0100".to_string()),
            channel,
        }
    }

    /// Notifier that counts sends instead of logging them.
    #[derive(Default)]
    struct CountingNotifier {
        sends: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn notify(&self, _contact: &Contact) -> Result<(), AppError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Store whose writes fail after the contact is visible, for exercising
    /// the dead-letter path.
    struct BrokenCasStore {
        inner: MemoryContactStore,
    }

    #[async_trait]
    impl ContactStore for BrokenCasStore {
        async fn create(&self, new: NewContact) -> Result<Contact, AppError> {
            self.inner.create(new).await
        }

        async fn find_by_id(&self, id: &str) -> Result<Option<Contact>, AppError> {
            self.inner.find_by_id(id).await
        }

        async fn mark_sent(&self, _id: &str) -> Result<bool, AppError> {
            Err(AppError::Config("write path offline".to_string()))
        }
    }

    fn worker_with(
        store: Arc<dyn ContactStore>,
        broker: Arc<dyn TaskQueue>,
        notifier: Arc<CountingNotifier>,
    ) -> Worker {
        Worker::new(Channel::Email, store, broker, notifier, &test_config())
    }

    #[tokio::test]
    async fn test_malformed_body_is_dropped() {
        let store = MemoryContactStore::new();
        let broker = MemoryBroker::new();
        let notifier = Arc::new(CountingNotifier::default());
        let worker = worker_with(Arc::new(store), Arc::new(broker), notifier.clone());

        let delivery = Delivery {
            id: "1".to_string(),
            body: b"not json".to_vec(),
        };
        let disposition = worker.handle_delivery(&delivery).await.unwrap();

        assert_eq!(disposition, Disposition::DroppedMalformed);
        assert_eq!(notifier.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_body_missing_contact_id_is_dropped() {
        let store = MemoryContactStore::new();
        let broker = MemoryBroker::new();
        let notifier = Arc::new(CountingNotifier::default());
        let worker = worker_with(Arc::new(store), Arc::new(broker), notifier.clone());

        let delivery = Delivery {
            id: "1".to_string(),
            body: b"{\"something_else\": \"x\"}".to_vec(),
        };
        let disposition = worker.handle_delivery(&delivery).await.unwrap();

        assert_eq!(disposition, Disposition::DroppedMalformed);
        assert_eq!(notifier.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_contact_is_dropped_stale() {
        let store = MemoryContactStore::new();
        let broker = MemoryBroker::new();
        let notifier = Arc::new(CountingNotifier::default());
        let worker = worker_with(Arc::new(store), Arc::new(broker), notifier.clone());

        let body = TaskMessage {
            contact_id: uuid::Uuid::new_v4().to_string(),
        }
        .to_bytes();
        let delivery = Delivery {
            id: "1".to_string(),
            body,
        };

        let disposition = worker.handle_delivery(&delivery).await.unwrap();
        assert_eq!(disposition, Disposition::DroppedStale);
        assert_eq!(notifier.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsent_contact_is_notified_and_marked() {
        let store = MemoryContactStore::new();
        let broker = MemoryBroker::new();
        let notifier = Arc::new(CountingNotifier::default());
        let worker = worker_with(
            Arc::new(store.clone()),
            Arc::new(broker),
            notifier.clone(),
        );

        let contact = store
            .create(sample(Channel::Email, "n@example.com"))
            .await
            .unwrap();
        let delivery = Delivery {
            id: "1".to_string(),
            body: TaskMessage::for_contact(contact.id).to_bytes(),
        };

        let disposition = worker.handle_delivery(&delivery).await.unwrap();
        assert_eq!(disposition, Disposition::Notified);
        assert_eq!(notifier.sends.load(Ordering::SeqCst), 1);
        assert!(store.get(contact.id).await.unwrap().sent);
    }

    #[tokio::test]
    async fn test_already_sent_contact_is_a_no_op() {
        let store = MemoryContactStore::new();
        let broker = MemoryBroker::new();
        let notifier = Arc::new(CountingNotifier::default());
        let worker = worker_with(
            Arc::new(store.clone()),
            Arc::new(broker),
            notifier.clone(),
        );

        let contact = store
            .create(sample(Channel::Email, "dup@example.com"))
            .await
            .unwrap();
        store.mark_sent(&contact.id.to_string()).await.unwrap();

        let delivery = Delivery {
            id: "1".to_string(),
            body: TaskMessage::for_contact(contact.id).to_bytes(),
        };

        let disposition = worker.handle_delivery(&delivery).await.unwrap();
        assert_eq!(disposition, Disposition::AlreadySent);
        assert_eq!(notifier.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_state_update_failure_routes_to_dead_letter() {
        let inner = MemoryContactStore::new();
        let broker = MemoryBroker::new();
        let notifier = Arc::new(CountingNotifier::default());
        let worker = worker_with(
            Arc::new(BrokenCasStore {
                inner: inner.clone(),
            }),
            Arc::new(broker.clone()),
            notifier.clone(),
        );

        let contact = inner
            .create(sample(Channel::Email, "dead@example.com"))
            .await
            .unwrap();
        let delivery = Delivery {
            id: "1".to_string(),
            body: TaskMessage::for_contact(contact.id).to_bytes(),
        };

        let disposition = worker.handle_delivery(&delivery).await.unwrap();
        assert_eq!(disposition, Disposition::DeadLettered);
        // The side effect never fired: the claim failed before any send.
        assert_eq!(notifier.sends.load(Ordering::SeqCst), 0);

        let dead = broker.dead_letters("notify:email").await;
        assert_eq!(dead.len(), 1);
        assert!(dead[0].reason.contains("state update failed"));
        assert_eq!(dead[0].body, delivery.body);
    }
}
