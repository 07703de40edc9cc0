//! Contact store contract and implementations.
//!
//! The store owns the one piece of mutable state in the pipeline: the
//! contact's `sent` flag. `mark_sent` is an atomic compare-and-set
//! (`sent = true` only if currently `false`) so that concurrent consumers
//! handed copies of the same redelivered task cannot both claim the
//! transition.

use async_trait::async_trait;

use courier_common::error::AppError;
use courier_common::types::{Contact, NewContact};

pub mod memory;
pub mod pg;

pub use memory::MemoryContactStore;
pub use pg::PgContactStore;

/// Persistent contact record store keyed by identifier.
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Persist a new contact with `sent = false` and return the stored record
    /// (including its assigned id).
    async fn create(&self, new: NewContact) -> Result<Contact, AppError>;

    /// Look up a contact by its string identifier. A syntactically invalid
    /// identifier resolves to `None`, the same as an unknown one — the task
    /// reference is stale either way.
    async fn find_by_id(&self, id: &str) -> Result<Option<Contact>, AppError>;

    /// Atomically flip `sent` from false to true. Returns `true` only if this
    /// call performed the transition; `false` means another caller already
    /// claimed it (or the contact does not exist).
    async fn mark_sent(&self, id: &str) -> Result<bool, AppError>;
}
