//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params, params_from_iter};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::extraction::model::{
    DismissReason, ExtractedItem, ExtractionRun, ItemPayload, LifecycleState,
};
use crate::store::migrations;
use crate::store::traits::Database;
use crate::tasks::TaskId;
use crate::threads::model::{CommunicationThread, Message, sort_messages};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn load_messages(&self, thread_id: &str) -> Result<Vec<Message>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {MESSAGE_COLUMNS} FROM thread_messages WHERE thread_id = ?1"),
                params![thread_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_messages: {e}")))?;

        let mut messages = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            messages.push(row_to_message(&row)?);
        }
        sort_messages(&mut messages);
        Ok(messages)
    }

    async fn thread_is_open(&self, thread_id: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM threads WHERE id = ?1 AND archived = 0",
                params![thread_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("thread_is_open: {e}")))?;

        match rows.next().await {
            Ok(row) => Ok(row.is_some()),
            Err(e) => Err(DatabaseError::Query(format!("thread_is_open row: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    // Try RFC 3339 first (our canonical write format)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    // SQLite datetime() output
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

/// Convert `Option<String>` to libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn string_list(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

/// Lifecycle columns for an item state:
/// `(state, converted_task_id, converted_at, dismiss_reason, dismiss_note, dismissed_at)`.
fn state_columns(
    state: &LifecycleState,
) -> (
    &'static str,
    libsql::Value,
    libsql::Value,
    libsql::Value,
    libsql::Value,
    libsql::Value,
) {
    match state {
        LifecycleState::Open => (
            "open",
            libsql::Value::Null,
            libsql::Value::Null,
            libsql::Value::Null,
            libsql::Value::Null,
            libsql::Value::Null,
        ),
        LifecycleState::Converted {
            task_id,
            converted_at,
        } => (
            "converted",
            libsql::Value::Text(task_id.as_str().to_string()),
            libsql::Value::Text(converted_at.to_rfc3339()),
            libsql::Value::Null,
            libsql::Value::Null,
            libsql::Value::Null,
        ),
        LifecycleState::Dismissed {
            reason,
            note,
            dismissed_at,
        } => (
            "dismissed",
            libsql::Value::Null,
            libsql::Value::Null,
            libsql::Value::Text(reason.as_str().to_string()),
            opt_text_owned(note.clone()),
            libsql::Value::Text(dismissed_at.to_rfc3339()),
        ),
    }
}

// ── Row mapping ─────────────────────────────────────────────────────

const THREAD_COLUMNS: &str = "id, subject, matter_id, participants, is_processed, processed_at, last_message_date, last_processed_message_id, archived, created_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, thread_id, sender, recipients, sent_date, body, attachments";

/// Column list for item SELECT queries (17 columns).
const ITEM_COLUMNS: &str = "id, thread_id, matter_id, source_message_id, kind, confidence, payload, fingerprint, state, converted_task_id, converted_at, dismiss_reason, dismiss_note, dismissed_at, version, created_at, updated_at";

const ITEM_COLUMN_COUNT: usize = 17;

const RUN_COLUMNS: &str = "id, thread_id, status, since_message_id, candidates_returned, candidates_dropped, items_created, error, started_at, finished_at";

/// `?, ?, ...` with `n` placeholders.
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Bind values for one item, in `ITEM_COLUMNS` order.
fn item_values(item: &ExtractedItem) -> Result<Vec<libsql::Value>, DatabaseError> {
    use libsql::Value;

    let (state, task_id, converted_at, reason, note, dismissed_at) = state_columns(&item.state);
    Ok(vec![
        Value::Text(item.id.to_string()),
        Value::Text(item.thread_id.clone()),
        Value::Text(item.matter_id.clone()),
        Value::Text(item.source_message_id.clone()),
        Value::Text(item.kind().as_str().to_string()),
        Value::Text(item.confidence.as_str().to_string()),
        Value::Text(to_json(&item.payload)?),
        Value::Text(item.fingerprint.clone()),
        Value::Text(state.to_string()),
        task_id,
        converted_at,
        reason,
        note,
        dismissed_at,
        Value::Integer(item.version),
        Value::Text(item.created_at.to_rfc3339()),
        Value::Text(item.updated_at.to_rfc3339()),
    ])
}

/// Map a thread row. Messages are loaded separately.
fn row_to_thread(row: &libsql::Row) -> Result<CommunicationThread, DatabaseError> {
    let field = |name: &str, e: libsql::Error| DatabaseError::Query(format!("thread.{name}: {e}"));

    let participants: String = row.get(3).map_err(|e| field("participants", e))?;
    let is_processed: i64 = row.get(4).map_err(|e| field("is_processed", e))?;
    let processed_at: Option<String> = row.get(5).ok();
    let last_message_date: String = row.get(6).map_err(|e| field("last_message_date", e))?;
    let archived: i64 = row.get(8).map_err(|e| field("archived", e))?;
    let created_at: String = row.get(9).map_err(|e| field("created_at", e))?;
    let updated_at: String = row.get(10).map_err(|e| field("updated_at", e))?;

    Ok(CommunicationThread {
        id: row.get(0).map_err(|e| field("id", e))?,
        subject: row.get(1).ok(),
        matter_id: row.get(2).map_err(|e| field("matter_id", e))?,
        participants: string_list(&participants).into_iter().collect(),
        messages: Vec::new(),
        is_processed: is_processed != 0,
        processed_at: parse_optional_datetime(&processed_at),
        last_message_date: parse_datetime(&last_message_date),
        last_processed_message_id: row.get(7).ok(),
        archived: archived != 0,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

fn row_to_message(row: &libsql::Row) -> Result<Message, DatabaseError> {
    let field = |name: &str, e: libsql::Error| DatabaseError::Query(format!("message.{name}: {e}"));

    let recipients: String = row.get(3).unwrap_or_default();
    let sent_date: String = row.get(4).map_err(|e| field("sent_date", e))?;
    let attachments: String = row.get(6).unwrap_or_default();

    Ok(Message {
        id: row.get(0).map_err(|e| field("id", e))?,
        thread_id: row.get(1).map_err(|e| field("thread_id", e))?,
        sender: row.get(2).map_err(|e| field("sender", e))?,
        recipients: string_list(&recipients),
        sent_date: parse_datetime(&sent_date),
        body: row.get(5).map_err(|e| field("body", e))?,
        attachments: string_list(&attachments),
    })
}

fn row_to_item(row: &libsql::Row) -> Result<ExtractedItem, DatabaseError> {
    let field = |name: &str, e: libsql::Error| DatabaseError::Query(format!("item.{name}: {e}"));

    let id_str: String = row.get(0).map_err(|e| field("id", e))?;
    let id = Uuid::parse_str(&id_str).map_err(|e| DatabaseError::Query(format!("item.id parse: {e}")))?;

    let confidence_str: String = row.get(5).map_err(|e| field("confidence", e))?;
    let confidence = confidence_str
        .parse()
        .map_err(DatabaseError::Serialization)?;

    let payload_str: String = row.get(6).map_err(|e| field("payload", e))?;
    let payload: ItemPayload = serde_json::from_str(&payload_str)
        .map_err(|e| DatabaseError::Serialization(format!("item {id} payload: {e}")))?;

    let state_str: String = row.get(8).map_err(|e| field("state", e))?;
    let state = match state_str.as_str() {
        "open" => LifecycleState::Open,
        "converted" => {
            let task_id: String = row.get(9).map_err(|e| field("converted_task_id", e))?;
            let converted_at: Option<String> = row.get(10).ok();
            LifecycleState::Converted {
                task_id: TaskId(task_id),
                converted_at: parse_optional_datetime(&converted_at).unwrap_or(DateTime::<Utc>::MIN_UTC),
            }
        }
        "dismissed" => {
            let reason: String = row.get(11).map_err(|e| field("dismiss_reason", e))?;
            let dismissed_at: String = row.get(13).map_err(|e| field("dismissed_at", e))?;
            LifecycleState::Dismissed {
                reason: reason.parse::<DismissReason>().map_err(DatabaseError::Serialization)?,
                note: row.get(12).ok(),
                dismissed_at: parse_datetime(&dismissed_at),
            }
        }
        other => {
            return Err(DatabaseError::Serialization(format!(
                "item {id}: unknown state {other}"
            )));
        }
    };

    let created_at: String = row.get(15).map_err(|e| field("created_at", e))?;
    let updated_at: String = row.get(16).map_err(|e| field("updated_at", e))?;

    Ok(ExtractedItem {
        id,
        thread_id: row.get(1).map_err(|e| field("thread_id", e))?,
        matter_id: row.get(2).map_err(|e| field("matter_id", e))?,
        source_message_id: row.get(3).map_err(|e| field("source_message_id", e))?,
        confidence,
        payload,
        fingerprint: row.get(7).map_err(|e| field("fingerprint", e))?,
        state,
        version: row.get(14).map_err(|e| field("version", e))?,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

fn row_to_run(row: &libsql::Row) -> Result<ExtractionRun, DatabaseError> {
    let field = |name: &str, e: libsql::Error| DatabaseError::Query(format!("run.{name}: {e}"));

    let id_str: String = row.get(0).map_err(|e| field("id", e))?;
    let status: String = row.get(2).map_err(|e| field("status", e))?;
    let returned: i64 = row.get(4).unwrap_or(0);
    let dropped: i64 = row.get(5).unwrap_or(0);
    let created: i64 = row.get(6).unwrap_or(0);
    let started_at: String = row.get(8).map_err(|e| field("started_at", e))?;
    let finished_at: String = row.get(9).map_err(|e| field("finished_at", e))?;

    Ok(ExtractionRun {
        id: Uuid::parse_str(&id_str).map_err(|e| DatabaseError::Query(format!("run.id parse: {e}")))?,
        thread_id: row.get(1).map_err(|e| field("thread_id", e))?,
        status: status.parse().map_err(DatabaseError::Serialization)?,
        since_message_id: row.get(3).ok(),
        candidates_returned: returned.max(0) as usize,
        candidates_dropped: dropped.max(0) as usize,
        items_created: created.max(0) as usize,
        error: row.get(7).ok(),
        started_at: parse_datetime(&started_at),
        finished_at: parse_datetime(&finished_at),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Threads ─────────────────────────────────────────────────────

    async fn get_thread(&self, id: &str) -> Result<Option<CommunicationThread>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_thread: {e}")))?;

        let mut thread = match rows.next().await {
            Ok(Some(row)) => row_to_thread(&row)?,
            Ok(None) => return Ok(None),
            Err(e) => return Err(DatabaseError::Query(format!("get_thread: {e}"))),
        };
        thread.messages = self.load_messages(id).await?;
        Ok(Some(thread))
    }

    async fn save_thread(&self, thread: &CommunicationThread) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let participants = to_json(&thread.participants)?;

        // Thread row first: a partial message write then leaves the stored
        // count ahead of the real rows, which blocks mark_thread_processed.
        conn.execute(
            "INSERT INTO threads (id, subject, matter_id, participants, is_processed, processed_at, last_message_date, last_processed_message_id, message_count, archived, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                subject = excluded.subject,
                matter_id = excluded.matter_id,
                participants = excluded.participants,
                is_processed = excluded.is_processed,
                processed_at = excluded.processed_at,
                last_message_date = excluded.last_message_date,
                last_processed_message_id = excluded.last_processed_message_id,
                message_count = excluded.message_count,
                updated_at = excluded.updated_at",
            params![
                thread.id.as_str(),
                thread.subject.as_deref(),
                thread.matter_id.as_str(),
                participants,
                thread.is_processed as i64,
                thread.processed_at.map(|d| d.to_rfc3339()),
                thread.last_message_date.to_rfc3339(),
                thread.last_processed_message_id.as_deref(),
                thread.messages.len() as i64,
                thread.archived as i64,
                thread.created_at.to_rfc3339(),
                thread.updated_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("save_thread: {e}")))?;

        for message in &thread.messages {
            conn.execute(
                "INSERT OR IGNORE INTO thread_messages (thread_id, id, sender, recipients, sent_date, body, attachments)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    thread.id.as_str(),
                    message.id.as_str(),
                    message.sender.as_str(),
                    to_json(&message.recipients)?,
                    message.sent_date.to_rfc3339(),
                    message.body.as_str(),
                    to_json(&message.attachments)?,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_thread message {}: {e}", message.id)))?;
        }

        debug!(thread_id = %thread.id, messages = thread.messages.len(), "Thread saved");
        Ok(())
    }

    async fn mark_thread_processed(
        &self,
        id: &str,
        processed_at: DateTime<Utc>,
        last_message_id: Option<&str>,
        expected_message_count: usize,
    ) -> Result<bool, DatabaseError> {
        let ts = processed_at.to_rfc3339();
        let affected = self
            .conn()
            .execute(
                "UPDATE threads SET is_processed = 1, processed_at = ?1, last_processed_message_id = ?2, updated_at = ?1
                 WHERE id = ?3 AND message_count = ?4 AND archived = 0",
                params![ts, last_message_id, id, expected_message_count as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_thread_processed: {e}")))?;
        Ok(affected > 0)
    }

    async fn archive_thread(&self, id: &str) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn()
            .execute(
                "UPDATE threads SET archived = 1, updated_at = ?1 WHERE id = ?2",
                params![now, id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("archive_thread: {e}")))?;
        Ok(affected > 0)
    }

    async fn threads_needing_extraction(&self, limit: usize) -> Result<Vec<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id FROM threads WHERE is_processed = 0 AND archived = 0
                 ORDER BY last_message_date ASC LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("threads_needing_extraction: {e}")))?;

        let mut ids = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let id: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("threads_needing_extraction row: {e}")))?;
            ids.push(id);
        }
        Ok(ids)
    }

    // ── Extracted items ─────────────────────────────────────────────

    async fn insert_item(&self, item: &ExtractedItem) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                &format!(
                    "INSERT OR IGNORE INTO extracted_items ({ITEM_COLUMNS}) VALUES ({})",
                    placeholders(ITEM_COLUMN_COUNT)
                ),
                params_from_iter(item_values(item)?),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_item: {e}")))?;

        if affected > 0 {
            debug!(item_id = %item.id, thread_id = %item.thread_id, kind = %item.kind(), "Item inserted");
        }
        Ok(affected > 0)
    }

    async fn insert_items(
        &self,
        thread_id: &str,
        items: &[ExtractedItem],
    ) -> Result<Option<Vec<Uuid>>, DatabaseError> {
        if items.is_empty() {
            return Ok(self.thread_is_open(thread_id).await?.then(Vec::new));
        }

        // One statement, so an archive lands entirely before or after it.
        let row = format!("({})", placeholders(ITEM_COLUMN_COUNT));
        let sql = format!(
            "INSERT OR IGNORE INTO extracted_items ({ITEM_COLUMNS})
             SELECT * FROM (VALUES {})
             WHERE EXISTS (SELECT 1 FROM threads WHERE id = ? AND archived = 0)",
            vec![row.as_str(); items.len()].join(", ")
        );
        let mut values = Vec::with_capacity(items.len() * ITEM_COLUMN_COUNT + 1);
        for item in items {
            values.extend(item_values(item)?);
        }
        values.push(libsql::Value::Text(thread_id.to_string()));

        let affected = self
            .conn()
            .execute(&sql, params_from_iter(values))
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_items: {e}")))?;

        if affected == 0 {
            return Ok(self.thread_is_open(thread_id).await?.then(Vec::new));
        }

        // Ids are fresh, so every one found was written above.
        let ids: Vec<libsql::Value> = items
            .iter()
            .map(|i| libsql::Value::Text(i.id.to_string()))
            .collect();
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT id FROM extracted_items WHERE id IN ({})",
                    placeholders(items.len())
                ),
                params_from_iter(ids),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_items lookup: {e}")))?;

        let mut written = HashSet::new();
        while let Ok(Some(row)) = rows.next().await {
            let id: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("insert_items id: {e}")))?;
            let id = id
                .parse::<Uuid>()
                .map_err(|e| DatabaseError::Serialization(format!("item id {id}: {e}")))?;
            written.insert(id);
        }

        debug!(thread_id, written = written.len(), batch = items.len(), "Items inserted");
        Ok(Some(
            items
                .iter()
                .map(|i| i.id)
                .filter(|id| written.contains(id))
                .collect(),
        ))
    }

    async fn get_item(&self, id: Uuid) -> Result<Option<ExtractedItem>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ITEM_COLUMNS} FROM extracted_items WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_item: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_item(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_item row: {e}"))),
        }
    }

    async fn list_items_for_thread(&self, thread_id: &str) -> Result<Vec<ExtractedItem>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ITEM_COLUMNS} FROM extracted_items WHERE thread_id = ?1 ORDER BY created_at ASC"),
                params![thread_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_items_for_thread: {e}")))?;

        let mut items = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            items.push(row_to_item(&row)?);
        }
        Ok(items)
    }

    async fn update_item_state(
        &self,
        item: &ExtractedItem,
        expected_version: i64,
    ) -> Result<bool, DatabaseError> {
        let (state, task_id, converted_at, reason, note, dismissed_at) = state_columns(&item.state);

        let affected = self
            .conn()
            .execute(
                "UPDATE extracted_items SET state = ?1, converted_task_id = ?2, converted_at = ?3, dismiss_reason = ?4, dismiss_note = ?5, dismissed_at = ?6, version = ?7, updated_at = ?8
                 WHERE id = ?9 AND version = ?10",
                params![
                    state,
                    task_id,
                    converted_at,
                    reason,
                    note,
                    dismissed_at,
                    item.version,
                    item.updated_at.to_rfc3339(),
                    item.id.to_string(),
                    expected_version,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_item_state: {e}")))?;

        debug!(item_id = %item.id, state, version = item.version, applied = affected > 0, "Item state write");
        Ok(affected > 0)
    }

    // ── Extraction runs ─────────────────────────────────────────────

    async fn record_run(&self, run: &ExtractionRun) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO extraction_runs ({RUN_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
                params![
                    run.id.to_string(),
                    run.thread_id.as_str(),
                    run.status.as_str(),
                    run.since_message_id.as_deref(),
                    run.candidates_returned as i64,
                    run.candidates_dropped as i64,
                    run.items_created as i64,
                    run.error.as_deref(),
                    run.started_at.to_rfc3339(),
                    run.finished_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_run: {e}")))?;
        Ok(())
    }

    async fn list_runs(&self, thread_id: &str) -> Result<Vec<ExtractionRun>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {RUN_COLUMNS} FROM extraction_runs WHERE thread_id = ?1 ORDER BY started_at DESC"),
                params![thread_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_runs: {e}")))?;

        let mut runs = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            runs.push(row_to_run(&row)?);
        }
        Ok(runs)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
