//! Extraction store — turns validated candidates into persisted Open items.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::Database;
use crate::threads::model::CommunicationThread;

use super::fingerprint::candidate_fingerprint;
use super::model::{CandidateExtraction, ExtractedItem};

/// Result of one persist call.
#[derive(Debug, Clone, Default)]
pub struct PersistOutcome {
    /// Newly created items, in candidate order.
    pub created: Vec<ExtractedItem>,
    /// Candidates whose fingerprint already existed for the thread.
    pub skipped: usize,
}

pub struct ExtractionStore {
    db: Arc<dyn Database>,
    prefix_chars: usize,
}

impl ExtractionStore {
    pub fn new(db: Arc<dyn Database>, prefix_chars: usize) -> Self {
        Self { db, prefix_chars }
    }

    /// Persist candidates as Open items, skipping known fingerprints.
    ///
    /// The batch is written all at once or not at all. Returns `None` when
    /// `cancel` fired or the thread was archived before the write; nothing is
    /// stored in that case.
    pub async fn persist(
        &self,
        thread: &CommunicationThread,
        candidates: Vec<CandidateExtraction>,
        cancel: &CancellationToken,
    ) -> Result<Option<PersistOutcome>, DatabaseError> {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let items: Vec<ExtractedItem> = candidates
            .into_iter()
            .map(|candidate| {
                let fingerprint = candidate_fingerprint(&thread.id, &candidate, self.prefix_chars);
                ExtractedItem::new(&thread.id, &thread.matter_id, candidate, fingerprint)
            })
            .collect();

        let Some(written) = self.db.insert_items(&thread.id, &items).await? else {
            debug!(thread_id = %thread.id, discarded = items.len(), "Thread archived, candidates discarded");
            return Ok(None);
        };

        let total = items.len();
        let created: Vec<ExtractedItem> = items
            .into_iter()
            .filter(|item| written.contains(&item.id))
            .collect();
        let outcome = PersistOutcome {
            skipped: total - created.len(),
            created,
        };

        if total > 0 {
            info!(
                thread_id = %thread.id,
                created = outcome.created.len(),
                skipped = outcome.skipped,
                "Candidates persisted"
            );
        }
        Ok(Some(outcome))
    }
}
