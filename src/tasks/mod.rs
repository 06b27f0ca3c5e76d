//! Task bridge — turns a converted item into one external task-creation call.
//!
//! The bridge is stateless. Exactly-once conversion is the lifecycle
//! manager's job; this module only maps variants to task requests and
//! bounds the outbound call.

pub mod http;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::TaskBridgeError;
use crate::extraction::model::{ExtractedItem, ItemPayload, Priority};

pub use http::HttpTaskService;

/// Opaque id assigned by the external task system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Task category in the external system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Court or filing deadline.
    Filing,
    /// Chase a commitment someone made.
    FollowUp,
    General,
}

/// Everything the external task system needs to create one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task_type: TaskType,
    pub matter_id: String,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Back-reference for the task system's own audit trail.
    pub source_item_id: Uuid,
}

/// Narrow capability exposed by the external task subsystem.
#[async_trait]
pub trait TaskService: Send + Sync {
    async fn create_task(&self, request: TaskRequest) -> Result<TaskId, TaskBridgeError>;
}

const MAX_TITLE_CHARS: usize = 120;

/// Map an item to its task request.
pub fn build_task_request(item: &ExtractedItem, assignee_override: Option<&str>) -> TaskRequest {
    let title: String = item.payload.summary().chars().take(MAX_TITLE_CHARS).collect();

    let (task_type, description, due_date, derived_assignee, priority) = match &item.payload {
        ItemPayload::Deadline {
            description,
            due_date,
        } => (
            TaskType::Filing,
            format!("Deadline: {description}"),
            Some(*due_date),
            None,
            None,
        ),
        ItemPayload::Commitment { party, text, date } => (
            TaskType::FollowUp,
            format!("Follow up on commitment by {party}: {text}"),
            *date,
            Some(party.clone()),
            None,
        ),
        ItemPayload::ActionItem {
            description,
            priority,
            suggested_assignee,
        } => (
            TaskType::General,
            description.clone(),
            None,
            suggested_assignee.clone(),
            Some(*priority),
        ),
    };

    let assignee_hint = assignee_override
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .or(derived_assignee);

    TaskRequest {
        task_type,
        matter_id: item.matter_id.clone(),
        title,
        description,
        due_date,
        assignee_hint,
        priority,
        source_item_id: item.id,
    }
}

/// Bounded, stateless adapter over a `TaskService`.
pub struct TaskBridge {
    service: Arc<dyn TaskService>,
    timeout: Duration,
}

impl TaskBridge {
    pub fn new(service: Arc<dyn TaskService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    /// Create exactly one task for `item`. Never retries.
    pub async fn create_task_from_item(
        &self,
        item: &ExtractedItem,
        assignee_override: Option<&str>,
    ) -> Result<TaskId, TaskBridgeError> {
        let request = build_task_request(item, assignee_override);
        let task_type = request.task_type;

        match tokio::time::timeout(self.timeout, self.service.create_task(request)).await {
            Ok(Ok(task_id)) => {
                info!(
                    item_id = %item.id,
                    task_id = %task_id,
                    task_type = ?task_type,
                    "Created task from extracted item"
                );
                Ok(task_id)
            }
            Ok(Err(e)) => {
                warn!(item_id = %item.id, error = %e, "Task creation failed");
                Err(e)
            }
            Err(_) => {
                warn!(item_id = %item.id, timeout = ?self.timeout, "Task creation timed out");
                Err(TaskBridgeError::Timeout {
                    timeout: self.timeout,
                })
            }
        }
    }
}
