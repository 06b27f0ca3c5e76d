//! Legacy item records: a `dismissed` flag plus a separate converted task id.
//!
//! These map onto the three-state lifecycle. A record carrying both a task id
//! and `dismissed = true` has no single correct state and is rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LegacyConflict;
use crate::extraction::model::{Confidence, DismissReason, ItemPayload, LifecycleState};
use crate::tasks::TaskId;

/// Lifecycle columns of a legacy record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegacyItemState {
    #[serde(default)]
    pub dismissed: bool,
    #[serde(default)]
    pub dismissed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub dismiss_reason: Option<String>,
    #[serde(default)]
    pub converted_task_id: Option<String>,
    #[serde(default)]
    pub converted_at: Option<DateTime<Utc>>,
}

/// A full legacy item as exported by the previous system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyItem {
    pub thread_id: String,
    pub source_message_id: String,
    pub confidence: Confidence,
    pub payload: ItemPayload,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub state: LegacyItemState,
}

/// Map legacy flags onto a `LifecycleState`.
///
/// Missing timestamps fall back to `fallback_time`. A reason the current
/// model does not know becomes `Other` with the original text as the note.
pub fn normalize_legacy_state(
    record: &LegacyItemState,
    fallback_time: DateTime<Utc>,
) -> Result<LifecycleState, LegacyConflict> {
    let task_id = record
        .converted_task_id
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());

    match (task_id, record.dismissed) {
        (Some(task_id), true) => Err(LegacyConflict::BothDismissedAndConverted {
            task_id: task_id.to_string(),
        }),
        (Some(task_id), false) => Ok(LifecycleState::Converted {
            task_id: TaskId::from(task_id),
            converted_at: record.converted_at.unwrap_or(fallback_time),
        }),
        (None, true) => {
            let (reason, note) = match record.dismiss_reason.as_deref().map(str::trim) {
                None | Some("") => (DismissReason::Other, None),
                Some(raw) => match raw.parse::<DismissReason>() {
                    Ok(reason) => (reason, None),
                    Err(_) => (DismissReason::Other, Some(raw.to_string())),
                },
            };
            Ok(LifecycleState::Dismissed {
                reason,
                note,
                dismissed_at: record.dismissed_at.unwrap_or(fallback_time),
            })
        }
        (None, false) => Ok(LifecycleState::Open),
    }
}
