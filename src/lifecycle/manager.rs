//! The lifecycle manager is the only writer of item state.
//!
//! **Core invariant: one task per item.** Convert holds the item's lock
//! from the state check through the task call to the version-checked
//! write, so a second convert sees Converted and never reaches the bridge.
//!
//! Check order for every transition: existence, terminal state, caller
//! version, side effect, compare-and-swap write.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::LifecycleError;
use crate::extraction::model::{DismissReason, ExtractedItem, LifecycleState};
use crate::pipeline::lock::KeyedLock;
use crate::store::Database;
use crate::tasks::{TaskBridge, TaskId};

/// Request to turn an Open item into a task.
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    pub item_id: Uuid,
    /// Version the caller last read.
    pub expected_version: i64,
    pub assignee_override: Option<String>,
}

/// Request to dismiss an Open item.
#[derive(Debug, Clone)]
pub struct DismissRequest {
    pub item_id: Uuid,
    pub expected_version: i64,
    pub reason: DismissReason,
    pub note: Option<String>,
}

pub struct LifecycleManager {
    db: Arc<dyn Database>,
    bridge: TaskBridge,
    locks: KeyedLock<Uuid>,
}

impl LifecycleManager {
    pub fn new(db: Arc<dyn Database>, bridge: TaskBridge) -> Self {
        Self {
            db,
            bridge,
            locks: KeyedLock::new(),
        }
    }

    /// Convert an Open item into an external task.
    ///
    /// On task-service failure the item stays Open at the same version and
    /// the error is returned; nothing is retried.
    pub async fn convert(&self, request: ConvertRequest) -> Result<ExtractedItem, LifecycleError> {
        let _guard = self.locks.lock(request.item_id).await;
        let item = self.load(request.item_id).await?;

        if !item.state.is_open() {
            return Err(invalid_state(&item, "convert"));
        }
        check_version(&item, request.expected_version)?;

        let task_id = self
            .bridge
            .create_task_from_item(&item, request.assignee_override.as_deref())
            .await?;

        let now = Utc::now();
        let mut updated = item.clone();
        updated.state = LifecycleState::Converted {
            task_id: task_id.clone(),
            converted_at: now,
        };
        self.write(updated, item.version, Some(&task_id)).await
    }

    /// Dismiss an Open item. Repeating a dismissal with the same reason
    /// returns the stored item unchanged.
    pub async fn dismiss(&self, request: DismissRequest) -> Result<ExtractedItem, LifecycleError> {
        let _guard = self.locks.lock(request.item_id).await;
        let item = self.load(request.item_id).await?;

        match &item.state {
            LifecycleState::Dismissed { reason, .. } if *reason == request.reason => {
                debug!(item_id = %item.id, reason = %reason, "Already dismissed with same reason");
                return Ok(item);
            }
            LifecycleState::Dismissed { .. } | LifecycleState::Converted { .. } => {
                return Err(invalid_state(&item, "dismiss"));
            }
            LifecycleState::Open => {}
        }
        check_version(&item, request.expected_version)?;

        let mut updated = item.clone();
        updated.state = LifecycleState::Dismissed {
            reason: request.reason,
            note: request.note.filter(|n| !n.trim().is_empty()),
            dismissed_at: Utc::now(),
        };
        self.write(updated, item.version, None).await
    }

    /// Point a Converted item at a different task. The task reference is the
    /// only field of a terminal item that may change.
    pub async fn relink_task(
        &self,
        item_id: Uuid,
        task_id: TaskId,
        expected_version: i64,
    ) -> Result<ExtractedItem, LifecycleError> {
        let _guard = self.locks.lock(item_id).await;
        let item = self.load(item_id).await?;

        let converted_at = match &item.state {
            LifecycleState::Converted { converted_at, .. } => *converted_at,
            _ => return Err(invalid_state(&item, "relink task")),
        };
        check_version(&item, expected_version)?;

        let mut updated = item.clone();
        updated.state = LifecycleState::Converted {
            task_id,
            converted_at,
        };
        self.write(updated, item.version, None).await
    }

    async fn load(&self, id: Uuid) -> Result<ExtractedItem, LifecycleError> {
        self.db
            .get_item(id)
            .await?
            .ok_or(LifecycleError::NotFound { id })
    }

    /// Bump the version and write `updated` if the stored version is still
    /// `expected_version`.
    async fn write(
        &self,
        mut updated: ExtractedItem,
        expected_version: i64,
        created_task: Option<&TaskId>,
    ) -> Result<ExtractedItem, LifecycleError> {
        updated.version = expected_version + 1;
        updated.updated_at = Utc::now();

        if self.db.update_item_state(&updated, expected_version).await? {
            info!(
                item_id = %updated.id,
                state = updated.state.label(),
                version = updated.version,
                "Item transitioned"
            );
            return Ok(updated);
        }

        let actual_version = self
            .db
            .get_item(updated.id)
            .await?
            .map(|i| i.version)
            .unwrap_or(expected_version);
        match created_task {
            Some(task_id) => warn!(
                item_id = %updated.id,
                task_id = %task_id,
                "Lost write race after task creation; task is orphaned"
            ),
            None => warn!(item_id = %updated.id, "Lost write race"),
        }
        Err(LifecycleError::Conflict {
            id: updated.id,
            expected_version,
            actual_version,
        })
    }
}

fn invalid_state(item: &ExtractedItem, action: &str) -> LifecycleError {
    warn!(item_id = %item.id, state = item.state.label(), action, "Rejected transition");
    LifecycleError::InvalidState {
        id: item.id,
        state: item.state.label().to_string(),
        action: action.to_string(),
    }
}

fn check_version(item: &ExtractedItem, expected_version: i64) -> Result<(), LifecycleError> {
    if item.version != expected_version {
        warn!(
            item_id = %item.id,
            expected = expected_version,
            actual = item.version,
            "Stale item version"
        );
        return Err(LifecycleError::Conflict {
            id: item.id,
            expected_version,
            actual_version: item.version,
        });
    }
    Ok(())
}
