//! In-memory contact store for tests and local development.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{Contact, NewContact};

use crate::ContactStore;

/// Contact store held in a process-local map.
#[derive(Clone, Default)]
pub struct MemoryContactStore {
    contacts: Arc<Mutex<HashMap<Uuid, Contact>>>,
}

impl MemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot a contact for assertions.
    pub async fn get(&self, id: Uuid) -> Option<Contact> {
        let contacts = self.contacts.lock().await;
        contacts.get(&id).cloned()
    }
}

#[async_trait]
impl ContactStore for MemoryContactStore {
    async fn create(&self, new: NewContact) -> Result<Contact, AppError> {
        let contact = Contact {
            id: Uuid::new_v4(),
            full_name: new.full_name,
            email: new.email,
            phone_number: new.phone_number,
            channel: new.channel,
            sent: false,
            created_at: Utc::now(),
        };

        let mut contacts = self.contacts.lock().await;
        contacts.insert(contact.id, contact.clone());
        Ok(contact)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Contact>, AppError> {
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(None);
        };

        let contacts = self.contacts.lock().await;
        Ok(contacts.get(&id).cloned())
    }

    async fn mark_sent(&self, id: &str) -> Result<bool, AppError> {
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(false);
        };

        // The map lock makes the read-modify-write atomic, mirroring the SQL
        // `UPDATE ... WHERE sent = false`.
        let mut contacts = self.contacts.lock().await;
        match contacts.get_mut(&id) {
            Some(contact) if !contact.sent => {
                contact.sent = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_common::types::Channel;

    fn sample() -> NewContact {
        NewContact {
            full_name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone_number: Some("+1 555 0100".to_string()),
            channel: Channel::Email,
        }
    }

    #[tokio::test]
    async fn test_create_starts_unsent() {
        let store = MemoryContactStore::new();
        let contact = store.create(sample()).await.unwrap();

        assert!(!contact.sent);
        let found = store
            .find_by_id(&contact.id.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.email, "ada@example.com");
    }

    #[tokio::test]
    async fn test_find_by_invalid_id_is_none() {
        let store = MemoryContactStore::new();
        assert!(store.find_by_id("not-a-uuid").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_sent_transitions_exactly_once() {
        let store = MemoryContactStore::new();
        let contact = store.create(sample()).await.unwrap();
        let id = contact.id.to_string();

        assert!(store.mark_sent(&id).await.unwrap());
        assert!(!store.mark_sent(&id).await.unwrap());
        assert!(store.get(contact.id).await.unwrap().sent);
    }

    #[tokio::test]
    async fn test_mark_sent_unknown_contact_is_false() {
        let store = MemoryContactStore::new();
        assert!(!store.mark_sent(&Uuid::new_v4().to_string()).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_mark_sent_single_winner() {
        let store = MemoryContactStore::new();
        let contact = store.create(sample()).await.unwrap();
        let id = contact.id.to_string();

        let a = {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move { store.mark_sent(&id).await.unwrap() })
        };
        let b = {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move { store.mark_sent(&id).await.unwrap() })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert!(a ^ b, "exactly one caller must win the transition");
    }
}
