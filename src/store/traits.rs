//! Unified `Database` trait — single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::extraction::model::{ExtractedItem, ExtractionRun};
use crate::threads::model::CommunicationThread;

/// Backend-agnostic database trait covering threads, items, and runs.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Threads ─────────────────────────────────────────────────────

    /// Load a thread with its messages in `(sent_date, id)` order.
    async fn get_thread(&self, id: &str) -> Result<Option<CommunicationThread>, DatabaseError>;

    /// Upsert the thread row and insert any messages not yet stored.
    async fn save_thread(&self, thread: &CommunicationThread) -> Result<(), DatabaseError>;

    /// Mark a thread processed up to `last_message_id`.
    ///
    /// Applies only if the stored message count still equals
    /// `expected_message_count`; returns false when messages arrived since
    /// the caller loaded the thread.
    async fn mark_thread_processed(
        &self,
        id: &str,
        processed_at: DateTime<Utc>,
        last_message_id: Option<&str>,
        expected_message_count: usize,
    ) -> Result<bool, DatabaseError>;

    /// Flag a thread archived. Returns false if no such thread.
    async fn archive_thread(&self, id: &str) -> Result<bool, DatabaseError>;

    /// Ids of unprocessed, unarchived threads, oldest activity first.
    async fn threads_needing_extraction(&self, limit: usize) -> Result<Vec<String>, DatabaseError>;

    // ── Extracted items ─────────────────────────────────────────────

    /// Insert an item unless its `(thread_id, fingerprint)` already exists.
    /// Returns whether a row was written.
    async fn insert_item(&self, item: &ExtractedItem) -> Result<bool, DatabaseError>;

    /// Insert a batch of items for `thread_id` in one statement, gated on the
    /// thread being present and unarchived.
    ///
    /// Returns `None` when the gate failed and nothing was written, otherwise
    /// the ids of the rows written. Items whose fingerprint already exists,
    /// in the table or earlier in the batch, are left out.
    async fn insert_items(
        &self,
        thread_id: &str,
        items: &[ExtractedItem],
    ) -> Result<Option<Vec<Uuid>>, DatabaseError>;

    async fn get_item(&self, id: Uuid) -> Result<Option<ExtractedItem>, DatabaseError>;

    /// Every item of a thread, oldest first.
    async fn list_items_for_thread(&self, thread_id: &str) -> Result<Vec<ExtractedItem>, DatabaseError>;

    /// Write `item`'s lifecycle columns and version if the stored version is
    /// still `expected_version`. Returns false on a lost race.
    async fn update_item_state(
        &self,
        item: &ExtractedItem,
        expected_version: i64,
    ) -> Result<bool, DatabaseError>;

    // ── Extraction runs ─────────────────────────────────────────────

    async fn record_run(&self, run: &ExtractionRun) -> Result<(), DatabaseError>;

    /// Runs for a thread, newest first.
    async fn list_runs(&self, thread_id: &str) -> Result<Vec<ExtractionRun>, DatabaseError>;
}
