//! Extracted item data model: variants, confidence, lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tasks::TaskId;

/// Coarse trust grade attached by the AI capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Ranking weight: High=3, Medium=2, Low=1.
    pub fn weight(self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Confidence {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(format!("Unknown confidence: {}", s)),
        }
    }
}

/// Action item urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" | "normal" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" | "critical" => Ok(Self::Urgent),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}

/// Which variant an item is, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Deadline,
    Commitment,
    ActionItem,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deadline => "deadline",
            Self::Commitment => "commitment",
            Self::ActionItem => "action_item",
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "deadline" => Ok(Self::Deadline),
            "commitment" => Ok(Self::Commitment),
            "action_item" | "actionitem" | "action" => Ok(Self::ActionItem),
            _ => Err(format!("Unknown item kind: {}", s)),
        }
    }
}

/// Variant-specific fields, fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemPayload {
    Deadline {
        description: String,
        due_date: DateTime<Utc>,
    },
    Commitment {
        /// Participant who made the commitment.
        party: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        date: Option<DateTime<Utc>>,
    },
    ActionItem {
        description: String,
        #[serde(default)]
        priority: Priority,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        suggested_assignee: Option<String>,
    },
}

impl ItemPayload {
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Deadline { .. } => ItemKind::Deadline,
            Self::Commitment { .. } => ItemKind::Commitment,
            Self::ActionItem { .. } => ItemKind::ActionItem,
        }
    }

    /// Text that identifies this item for duplicate detection.
    pub fn fingerprint_text(&self) -> String {
        match self {
            Self::Deadline { description, .. } => description.clone(),
            Self::Commitment { party, text, .. } => format!("{party} {text}"),
            Self::ActionItem { description, .. } => description.clone(),
        }
    }

    /// Short human-readable line, used for task titles.
    pub fn summary(&self) -> &str {
        match self {
            Self::Deadline { description, .. } => description,
            Self::Commitment { text, .. } => text,
            Self::ActionItem { description, .. } => description,
        }
    }
}

/// Why a user dismissed an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DismissReason {
    NotRelevant,
    AlreadyHandled,
    IncorrectInformation,
    Other,
}

impl DismissReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotRelevant => "not_relevant",
            Self::AlreadyHandled => "already_handled",
            Self::IncorrectInformation => "incorrect_information",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for DismissReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DismissReason {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_relevant" => Ok(Self::NotRelevant),
            "already_handled" => Ok(Self::AlreadyHandled),
            "incorrect_information" => Ok(Self::IncorrectInformation),
            "other" => Ok(Self::Other),
            _ => Err(format!("Unknown dismiss reason: {}", s)),
        }
    }
}

/// Lifecycle of an extracted item: Open → Converted | Dismissed.
///
/// Terminal states carry their own audit data, so "converted task id iff
/// Converted" and "dismissal reason iff Dismissed" cannot be violated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LifecycleState {
    Open,
    Converted {
        task_id: TaskId,
        converted_at: DateTime<Utc>,
    },
    Dismissed {
        reason: DismissReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
        dismissed_at: DateTime<Utc>,
    },
}

impl LifecycleState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Converted { .. } => "converted",
            Self::Dismissed { .. } => "dismissed",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

/// A persisted extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub id: Uuid,
    pub thread_id: String,
    pub matter_id: String,
    /// Always a message of `thread_id`.
    pub source_message_id: String,
    pub confidence: Confidence,
    pub payload: ItemPayload,
    pub fingerprint: String,
    #[serde(flatten)]
    pub state: LifecycleState,
    /// Bumped on every write; transitions compare against it.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExtractedItem {
    /// Create a new Open item from a validated candidate.
    pub fn new(
        thread_id: impl Into<String>,
        matter_id: impl Into<String>,
        candidate: CandidateExtraction,
        fingerprint: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            thread_id: thread_id.into(),
            matter_id: matter_id.into(),
            source_message_id: candidate.source_message_id,
            confidence: candidate.confidence,
            payload: candidate.payload,
            fingerprint: fingerprint.into(),
            state: LifecycleState::Open,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.payload.kind()
    }

    pub fn converted_task_id(&self) -> Option<&TaskId> {
        match &self.state {
            LifecycleState::Converted { task_id, .. } => Some(task_id),
            _ => None,
        }
    }
}

/// A validated candidate produced by one orchestrator run, before storage.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateExtraction {
    pub source_message_id: String,
    pub confidence: Confidence,
    pub payload: ItemPayload,
}

/// Outcome of one orchestrator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    /// Capability unavailable or timed out; retried on the next sweep.
    Failed,
    /// Thread archived mid-run; results discarded.
    Cancelled,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown run status: {}", s)),
        }
    }
}

/// Audit record of one extraction attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRun {
    pub id: Uuid,
    pub thread_id: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since_message_id: Option<String>,
    pub candidates_returned: usize,
    pub candidates_dropped: usize,
    pub items_created: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExtractionRun {
    pub fn start(thread_id: impl Into<String>, since_message_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            thread_id: thread_id.into(),
            status: RunStatus::Succeeded,
            since_message_id,
            candidates_returned: 0,
            candidates_dropped: 0,
            items_created: 0,
            error: None,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn finish(mut self, status: RunStatus, error: Option<String>) -> Self {
        self.status = status;
        self.error = error;
        self.finished_at = Utc::now();
        self
    }
}
