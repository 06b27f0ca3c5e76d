//! Thread ingestor — validates upstream payloads and merges them into
//! stored threads.
//!
//! The whole payload is validated before the thread is loaded, so a bad
//! message anywhere in the batch persists nothing. Merging is keyed on
//! message id, so re-delivery of the same batch changes nothing.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::error::IngestError;
use crate::pipeline::lock::KeyedLock;
use crate::store::Database;

use super::model::{
    CommunicationThread, Message, MessagePayload, ThreadPayload, normalize_address, sort_messages,
};

/// A payload that passed validation.
#[derive(Debug, Clone)]
struct ValidatedPayload {
    thread_id: String,
    subject: Option<String>,
    matter_id: Option<String>,
    messages: Vec<Message>,
}

pub struct ThreadIngestor {
    db: Arc<dyn Database>,
    locks: KeyedLock<String>,
}

impl ThreadIngestor {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            locks: KeyedLock::new(),
        }
    }

    /// Validate and merge a payload, returning the stored thread.
    pub async fn accept(&self, payload: ThreadPayload) -> Result<CommunicationThread, IngestError> {
        let payload = validate(payload)?;
        let _guard = self.locks.lock(payload.thread_id.clone()).await;

        let (mut thread, is_new) = match self.db.get_thread(&payload.thread_id).await? {
            Some(existing) => {
                if existing.archived {
                    return Err(IngestError::Archived {
                        thread_id: existing.id,
                    });
                }
                if let Some(ref matter_id) = payload.matter_id
                    && *matter_id != existing.matter_id
                {
                    return Err(IngestError::validation(
                        "matter_id",
                        format!("thread belongs to matter {}", existing.matter_id),
                    ));
                }
                (existing, false)
            }
            None => (new_thread(&payload)?, true),
        };

        let appended = merge(&mut thread, payload);

        if is_new || appended > 0 {
            self.db.save_thread(&thread).await?;
            info!(
                thread_id = %thread.id,
                appended,
                total = thread.messages.len(),
                new_thread = is_new,
                "Thread ingested"
            );
        } else {
            debug!(thread_id = %thread.id, "No new messages in payload");
        }

        Ok(thread)
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, IngestError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| IngestError::validation(field, "missing or blank"))
}

fn validate(payload: ThreadPayload) -> Result<ValidatedPayload, IngestError> {
    let thread_id = required(payload.id.as_deref(), "id")?.to_string();

    let mut seen = HashSet::new();
    let mut messages = Vec::with_capacity(payload.messages.len());
    for (i, raw) in payload.messages.into_iter().enumerate() {
        let message = validate_message(&thread_id, i, raw)?;
        // Repeats inside one payload collapse to the first copy
        if seen.insert(message.id.clone()) {
            messages.push(message);
        }
    }

    Ok(ValidatedPayload {
        thread_id,
        subject: payload.subject.filter(|s| !s.trim().is_empty()),
        matter_id: payload
            .matter_id
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty()),
        messages,
    })
}

fn validate_message(thread_id: &str, index: usize, raw: MessagePayload) -> Result<Message, IngestError> {
    let field = |name: &str| format!("messages[{index}].{name}");

    let id = required(raw.id.as_deref(), &field("id"))?.to_string();
    let sender = required(raw.sender.as_deref(), &field("sender"))?.to_string();
    let sent_date = raw
        .sent_date
        .ok_or_else(|| IngestError::validation(field("sent_date"), "missing"))?;

    Ok(Message {
        id,
        thread_id: thread_id.to_string(),
        sender,
        recipients: raw
            .recipients
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect(),
        sent_date,
        body: raw.body,
        attachments: raw.attachments,
    })
}

fn new_thread(payload: &ValidatedPayload) -> Result<CommunicationThread, IngestError> {
    if payload.messages.is_empty() {
        return Err(IngestError::validation("messages", "new thread has no messages"));
    }
    let matter_id = payload
        .matter_id
        .clone()
        .ok_or_else(|| IngestError::validation("matter_id", "required for a new thread"))?;

    let now = Utc::now();
    Ok(CommunicationThread {
        id: payload.thread_id.clone(),
        subject: None,
        matter_id,
        participants: Default::default(),
        messages: Vec::new(),
        is_processed: false,
        processed_at: None,
        last_message_date: now,
        last_processed_message_id: None,
        archived: false,
        created_at: now,
        updated_at: now,
    })
}

/// Append unknown messages and refresh derived fields. Returns how many
/// messages were appended.
fn merge(thread: &mut CommunicationThread, payload: ValidatedPayload) -> usize {
    if thread.subject.is_none() {
        thread.subject = payload.subject;
    }

    let watermark = thread
        .last_processed_message_id
        .as_deref()
        .and_then(|id| thread.message(id))
        .map(|m| (m.sent_date, m.id.clone()));

    let mut appended = 0;
    let mut late_arrival = false;
    for message in payload.messages {
        if thread.contains_message(&message.id) {
            continue;
        }
        if let Some((ref date, ref id)) = watermark
            && (message.sent_date, &message.id) < (*date, id)
        {
            late_arrival = true;
        }
        thread.participants.insert(normalize_address(&message.sender));
        for recipient in &message.recipients {
            thread.participants.insert(normalize_address(recipient));
        }
        thread.messages.push(message);
        appended += 1;
    }

    if appended == 0 {
        return 0;
    }

    sort_messages(&mut thread.messages);
    if let Some(latest) = thread.messages.iter().map(|m| m.sent_date).max() {
        thread.last_message_date = latest;
    }
    thread.is_processed = false;
    if late_arrival {
        // A message slotted in before the watermark would otherwise be skipped.
        thread.last_processed_message_id = None;
    }
    thread.updated_at = Utc::now();
    appended
}
