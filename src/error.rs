//! Error types for the extraction engine.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Task bridge error: {0}")]
    TaskBridge(#[from] TaskBridgeError),

    #[error("Legacy record conflict: {0}")]
    Legacy(#[from] LegacyConflict),
}

impl Error {
    /// Whether retrying the same call later could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Extraction(e) => e.is_retryable(),
            Self::TaskBridge(e) => e.is_retryable(),
            Self::Lifecycle(e) => e.is_retryable(),
            Self::Database(_) => true,
            _ => false,
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Thread ingestion errors. Nothing is persisted when these are returned.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Invalid payload field {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Thread {thread_id} is archived")]
    Archived { thread_id: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl IngestError {
    pub(crate) fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Extraction failures.
///
/// The orchestrator records these on a Failed run instead of raising them,
/// so a broken AI capability never blocks ingestion.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Extraction capability {capability} unavailable: {reason}")]
    Unavailable { capability: String, reason: String },

    #[error("Extraction capability {capability} timed out after {timeout:?}")]
    Timeout {
        capability: String,
        timeout: Duration,
    },

    #[error("Extraction for thread {thread_id} cancelled")]
    Cancelled { thread_id: String },

    #[error("Thread {thread_id} not found")]
    ThreadNotFound { thread_id: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl ExtractionError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::Timeout { .. } | Self::Database(_)
        )
    }
}

/// Lifecycle transition errors. Always surfaced to the caller.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Extracted item {id} not found")]
    NotFound { id: Uuid },

    #[error("Extracted item {id} is {state}, cannot {action}")]
    InvalidState {
        id: Uuid,
        state: String,
        action: String,
    },

    #[error("Extracted item {id} changed: expected version {expected_version}, found {actual_version}")]
    Conflict {
        id: Uuid,
        expected_version: i64,
        actual_version: i64,
    },

    #[error("Task creation failed: {0}")]
    TaskBridge(#[from] TaskBridgeError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl LifecycleError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Conflict { .. } | Self::Database(_) => true,
            Self::TaskBridge(e) => e.is_retryable(),
            Self::NotFound { .. } | Self::InvalidState { .. } => false,
        }
    }
}

/// External task service errors.
#[derive(Debug, thiserror::Error)]
pub enum TaskBridgeError {
    #[error("Task service request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Task service rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Task service timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Invalid response from task service: {reason}")]
    InvalidResponse { reason: String },
}

impl TaskBridgeError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RequestFailed { .. } | Self::Timeout { .. } => true,
            Self::Rejected { status, .. } => *status >= 500 || *status == 429,
            Self::InvalidResponse { .. } => false,
        }
    }
}

/// A legacy item record that cannot be mapped onto a single lifecycle state.
///
/// Surfaced for owner review; never resolved automatically.
#[derive(Debug, thiserror::Error)]
pub enum LegacyConflict {
    #[error("Record is both dismissed and converted to task {task_id}")]
    BothDismissedAndConverted { task_id: String },

    #[error("Legacy thread {thread_id} not found")]
    ThreadNotFound { thread_id: String },

    #[error("Legacy source message {message_id} is not in thread {thread_id}")]
    UnknownSourceMessage {
        thread_id: String,
        message_id: String,
    },

    #[error("Legacy item for thread {thread_id} is invalid: {reason}")]
    InvalidPayload { thread_id: String, reason: String },
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
