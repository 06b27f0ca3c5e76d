//! Thread and message data model, plus the inbound payload shape.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Stored thread state ─────────────────────────────────────────────

/// A single message. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Upstream message id, unique within its thread.
    pub id: String,
    pub thread_id: String,
    pub sender: String,
    #[serde(default)]
    pub recipients: Vec<String>,
    pub sent_date: DateTime<Utc>,
    pub body: String,
    /// Opaque references into document storage.
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// A matter-scoped, chronologically ordered conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationThread {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub matter_id: String,
    /// Lowercased union of every sender and recipient seen.
    pub participants: BTreeSet<String>,
    /// Ordered by `(sent_date, id)`.
    pub messages: Vec<Message>,
    pub is_processed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    pub last_message_date: DateTime<Utc>,
    /// Last message covered by a successful extraction run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_processed_message_id: Option<String>,
    #[serde(default)]
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommunicationThread {
    /// Sent date of the first message.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.messages
            .first()
            .map(|m| m.sent_date)
            .unwrap_or(self.created_at)
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn contains_message(&self, id: &str) -> bool {
        self.message(id).is_some()
    }

    /// Id of the newest message.
    pub fn last_message_id(&self) -> Option<&str> {
        self.messages.last().map(|m| m.id.as_str())
    }

    /// Messages strictly after `since`. An unknown or absent id yields the
    /// whole thread.
    pub fn messages_after(&self, since: Option<&str>) -> &[Message] {
        match since.and_then(|id| self.messages.iter().position(|m| m.id == id)) {
            Some(pos) => &self.messages[pos + 1..],
            None => &self.messages,
        }
    }

    /// Case-insensitive roster lookup.
    pub fn is_participant(&self, name: &str) -> bool {
        self.participants.contains(&normalize_address(name))
    }
}

/// Canonical form for roster entries.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Sort key that makes message order total.
pub(crate) fn sort_messages(messages: &mut [Message]) {
    messages.sort_by(|a, b| a.sent_date.cmp(&b.sent_date).then_with(|| a.id.cmp(&b.id)));
}

// ── Inbound payload ─────────────────────────────────────────────────

/// A batch of messages for one thread, as delivered upstream.
///
/// Every field is optional at the serde level so a malformed payload
/// surfaces as a validation error naming the field, not a parse error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub matter_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<MessagePayload>,
}

/// One inbound message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub sent_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<String>,
}
