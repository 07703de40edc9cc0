use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Notification channels a contact can prefer.
///
/// Routing is a total function from `Channel` to a configured queue name
/// (see `AppConfig::queue_name`), so adding a channel is a new variant plus
/// a configuration value rather than a new string comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
}

impl Channel {
    /// All channels, in routing-table order.
    pub const ALL: [Channel; 2] = [Channel::Email, Channel::Sms];
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Email => write!(f, "email"),
            Channel::Sms => write!(f, "sms"),
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Channel::Email),
            "sms" => Ok(Channel::Sms),
            other => Err(AppError::Config(format!(
                "Unknown channel '{}'. Valid channels: email, sms",
                other
            ))),
        }
    }
}

/// A contact record as persisted in the `contacts` table.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Contact {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub channel: Channel,
    /// False until the first successful notify-and-mark-sent transition;
    /// never reverts to false afterwards.
    pub sent: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when creating a contact. The store assigns `id`,
/// `sent = false`, and `created_at`.
#[derive(Debug, Clone)]
pub struct NewContact {
    pub full_name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub channel: Channel,
}

/// The queue wire format: a minimal reference to a contact.
///
/// Deliberately carries no other payload — consumers always re-read the
/// contact from the store, so producer-time and consume-time views may differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub contact_id: String,
}

impl TaskMessage {
    pub fn for_contact(id: Uuid) -> Self {
        Self {
            contact_id: id.to_string(),
        }
    }

    /// Encode as the UTF-8 JSON queue body.
    pub fn to_bytes(&self) -> Vec<u8> {
        // A struct of one string field cannot fail to serialize
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Decode a queue body. Invalid JSON and a missing `contact_id` key are
    /// both reported as `MalformedMessage`.
    pub fn from_bytes(body: &[u8]) -> Result<Self, AppError> {
        serde_json::from_slice(body).map_err(|e| {
            AppError::MalformedMessage(format!(
                "{} (body: {:?})",
                e,
                String::from_utf8_lossy(body)
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_roundtrip() {
        for channel in Channel::ALL {
            let parsed: Channel = channel.to_string().parse().unwrap();
            assert_eq!(parsed, channel);
        }
    }

    #[test]
    fn test_channel_rejects_unknown() {
        assert!("pigeon".parse::<Channel>().is_err());
    }

    #[test]
    fn test_task_message_roundtrip() {
        let id = Uuid::new_v4();
        let body = TaskMessage::for_contact(id).to_bytes();
        let decoded = TaskMessage::from_bytes(&body).unwrap();
        assert_eq!(decoded.contact_id, id.to_string());
    }

    #[test]
    fn test_task_message_rejects_invalid_json() {
        assert!(TaskMessage::from_bytes(b"not json").is_err());
    }

    #[test]
    fn test_task_message_rejects_missing_key() {
        assert!(TaskMessage::from_bytes(b"{\"other\":\"x\"}").is_err());
    }
}
