//! PostgreSQL contact store.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{Contact, NewContact};

use crate::ContactStore;

/// Contact store backed by the `contacts` table.
pub struct PgContactStore {
    pool: PgPool,
}

impl PgContactStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactStore for PgContactStore {
    async fn create(&self, new: NewContact) -> Result<Contact, AppError> {
        let contact: Contact = sqlx::query_as(
            r#"
            INSERT INTO contacts (id, full_name, email, phone_number, channel, sent, created_at)
            VALUES ($1, $2, $3, $4, $5, false, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.full_name)
        .bind(&new.email)
        .bind(&new.phone_number)
        .bind(new.channel)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(
            contact_id = %contact.id,
            channel = %contact.channel,
            "Contact created"
        );

        Ok(contact)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Contact>, AppError> {
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(None);
        };

        let contact: Option<Contact> = sqlx::query_as("SELECT * FROM contacts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(contact)
    }

    async fn mark_sent(&self, id: &str) -> Result<bool, AppError> {
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(false);
        };

        // Compare-and-set: the WHERE clause only matches while sent is still
        // false, so exactly one concurrent caller observes rows_affected = 1.
        let result = sqlx::query("UPDATE contacts SET sent = true WHERE id = $1 AND sent = false")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
