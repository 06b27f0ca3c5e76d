//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "threads_and_messages",
        sql: r#"
            CREATE TABLE IF NOT EXISTS threads (
                id TEXT PRIMARY KEY,
                subject TEXT,
                matter_id TEXT NOT NULL,
                participants TEXT NOT NULL DEFAULT '[]',
                is_processed INTEGER NOT NULL DEFAULT 0,
                processed_at TEXT,
                last_message_date TEXT NOT NULL,
                last_processed_message_id TEXT,
                message_count INTEGER NOT NULL DEFAULT 0,
                archived INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_threads_pending
                ON threads(is_processed, archived, last_message_date);
            CREATE INDEX IF NOT EXISTS idx_threads_matter ON threads(matter_id);

            CREATE TABLE IF NOT EXISTS thread_messages (
                thread_id TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
                id TEXT NOT NULL,
                sender TEXT NOT NULL,
                recipients TEXT NOT NULL DEFAULT '[]',
                sent_date TEXT NOT NULL,
                body TEXT NOT NULL,
                attachments TEXT NOT NULL DEFAULT '[]',
                PRIMARY KEY (thread_id, id)
            );
        "#,
    },
    Migration {
        version: 2,
        name: "extracted_items",
        sql: r#"
            CREATE TABLE IF NOT EXISTS extracted_items (
                id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
                matter_id TEXT NOT NULL,
                source_message_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                confidence TEXT NOT NULL,
                payload TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                state TEXT NOT NULL DEFAULT 'open',
                converted_task_id TEXT,
                converted_at TEXT,
                dismiss_reason TEXT,
                dismiss_note TEXT,
                dismissed_at TEXT,
                version INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (thread_id, fingerprint),
                CHECK (state IN ('open', 'converted', 'dismissed')),
                CHECK ((state = 'converted') = (converted_task_id IS NOT NULL)),
                CHECK ((state = 'dismissed') = (dismiss_reason IS NOT NULL AND dismissed_at IS NOT NULL))
            );
            CREATE INDEX IF NOT EXISTS idx_items_thread ON extracted_items(thread_id);
            CREATE INDEX IF NOT EXISTS idx_items_state ON extracted_items(state);
        "#,
    },
    Migration {
        version: 3,
        name: "extraction_runs",
        sql: r#"
            CREATE TABLE IF NOT EXISTS extraction_runs (
                id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL,
                status TEXT NOT NULL,
                since_message_id TEXT,
                candidates_returned INTEGER NOT NULL DEFAULT 0,
                candidates_dropped INTEGER NOT NULL DEFAULT 0,
                items_created INTEGER NOT NULL DEFAULT 0,
                error TEXT,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_runs_thread ON extraction_runs(thread_id, started_at);
        "#,
    },
];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    let version = get_current_version(conn).await?;
    tracing::info!(version, "Database migrations complete");

    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
