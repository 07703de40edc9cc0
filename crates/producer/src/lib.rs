//! Task producer — seeds contact records and routes one notification task
//! per contact into the queue matching its preferred channel.
//!
//! Per-contact failures (a contact that fails to persist, a task that fails
//! to publish) are logged and skipped; the batch continues. Only an
//! unreachable broker at startup or a failed queue declaration is fatal.

use std::sync::Arc;

use rand::Rng;
use rand::seq::SliceRandom;

use courier_common::config::AppConfig;
use courier_common::types::{Channel, NewContact, TaskMessage};
use courier_queue::TaskQueue;
use courier_store::ContactStore;

/// Sample names used when seeding contacts.
const FIRST_NAMES: &[&str] = &[
    "Ada", "Alan", "Barbara", "Dennis", "Donald", "Edsger", "Grace", "John", "Katherine",
    "Margaret", "Niklaus", "Radia",
];
const LAST_NAMES: &[&str] = &[
    "Hopper", "Turing", "Liskov", "Ritchie", "Knuth", "Dijkstra", "Kemeny", "Backus", "Johnson",
    "Hamilton", "Wirth", "Perlman",
];

/// Counts for one `dispatch` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Contacts persisted to the store.
    pub created: usize,
    /// Tasks published to a queue.
    pub published: usize,
    /// Contacts skipped because persistence or publication failed.
    pub skipped: usize,
}

/// Creates contacts and publishes their notification tasks.
pub struct Producer {
    store: Arc<dyn ContactStore>,
    broker: Arc<dyn TaskQueue>,
    config: AppConfig,
}

impl Producer {
    pub fn new(store: Arc<dyn ContactStore>, broker: Arc<dyn TaskQueue>, config: AppConfig) -> Self {
        Self {
            store,
            broker,
            config,
        }
    }

    /// Create `count` sample contacts with randomly assigned preferred
    /// channels and dispatch one task each.
    pub async fn dispatch(&self, count: usize) -> anyhow::Result<DispatchSummary> {
        self.dispatch_contacts(sample_batch(count)).await
    }

    /// Persist the given contacts and publish one task per persisted contact
    /// to the queue its channel routes to.
    pub async fn dispatch_contacts(
        &self,
        contacts: Vec<NewContact>,
    ) -> anyhow::Result<DispatchSummary> {
        // Both queues are declared up front so routing never hits an
        // undeclared queue, no matter how channels are distributed.
        for channel in Channel::ALL {
            self.broker.declare(self.config.queue_name(channel)).await?;
        }

        let mut summary = DispatchSummary::default();

        for new in contacts {
            let channel = new.channel;
            let full_name = new.full_name.clone();

            let contact = match self.store.create(new).await {
                Ok(contact) => contact,
                Err(e) => {
                    tracing::warn!(
                        full_name,
                        error = %e,
                        "Skipping contact that failed to persist"
                    );
                    summary.skipped += 1;
                    continue;
                }
            };
            summary.created += 1;

            let queue = self.config.queue_name(channel);
            let body = TaskMessage::for_contact(contact.id).to_bytes();

            match self.broker.publish(queue, &body).await {
                Ok(()) => {
                    tracing::info!(
                        contact_id = %contact.id,
                        channel = %channel,
                        queue,
                        "Dispatched notification task"
                    );
                    summary.published += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        contact_id = %contact.id,
                        queue,
                        error = %e,
                        "Skipping contact whose task failed to publish"
                    );
                    summary.skipped += 1;
                }
            }
        }

        tracing::info!(
            created = summary.created,
            published = summary.published,
            skipped = summary.skipped,
            "Dispatch run finished"
        );

        Ok(summary)
    }
}

/// Generate `count` sample contacts with random names and channels.
pub fn sample_batch(count: usize) -> Vec<NewContact> {
    let mut rng = rand::thread_rng();

    (0..count)
        .map(|_| {
            let first = FIRST_NAMES.choose(&mut rng).copied().unwrap_or("Ada");
            let last = LAST_NAMES.choose(&mut rng).copied().unwrap_or("Hopper");
            let channel = Channel::ALL
                .choose(&mut rng)
                .copied()
                .unwrap_or(Channel::Email);

            NewContact {
                full_name: format!("{first} {last}"),
                email: format!(
                    "{}.{}.{:06x}@example.com",
                    first.to_lowercase(),
                    last.to_lowercase(),
                    rng.gen_range(0..0xff_ffffu32)
                ),
                phone_number: Some(format!("+1 555 {:04}", rng.gen_range(0..10_000))),
                channel,
            }
        })
        .collect()
}
