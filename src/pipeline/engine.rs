//! Engine — wires ingestion, extraction, storage, lifecycle and ranking
//! behind one facade.
//!
//! Flow for one thread:
//! 1. `ingest()` — validate and merge a payload (ingest lock per thread)
//! 2. `reprocess()` — extract over new messages and persist (extraction
//!    lock per thread, held across extract + persist)
//! 3. `thread_items()` — read surface, Open items ranked
//! 4. `convert()` / `dismiss()` — lifecycle transitions
//!
//! Different threads never share a lock, so `reprocess_pending()` runs
//! them fully in parallel.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{
    DatabaseError, Error, ExtractionError, IngestError, LegacyConflict, LifecycleError,
};
use crate::extraction::fingerprint::candidate_fingerprint;
use crate::extraction::model::{
    CandidateExtraction, ExtractedItem, ExtractionRun, LifecycleState, RunStatus,
};
use crate::extraction::{ExtractionCapability, ExtractionOrchestrator, ExtractionStore, check_payload};
use crate::lifecycle::{ConvertRequest, DismissRequest, LifecycleManager};
use crate::pipeline::lock::KeyedLock;
use crate::policy::ConfidencePolicy;
use crate::store::Database;
use crate::store::legacy::{LegacyItem, normalize_legacy_state};
use crate::tasks::{TaskBridge, TaskId, TaskService};
use crate::threads::{CommunicationThread, ThreadIngestor, ThreadPayload};

/// An Open item with its ranking score.
#[derive(Debug, Clone)]
pub struct RankedItem {
    pub item: ExtractedItem,
    pub score: f64,
}

/// Current items of one thread, grouped by lifecycle state.
#[derive(Debug, Clone, Default)]
pub struct ThreadItems {
    /// Best first.
    pub open: Vec<RankedItem>,
    pub converted: Vec<ExtractedItem>,
    pub dismissed: Vec<ExtractedItem>,
}

/// What one `reprocess()` call did.
#[derive(Debug, Clone)]
pub struct ReprocessOutcome {
    pub run: ExtractionRun,
    pub created: Vec<ExtractedItem>,
    pub skipped: usize,
}

pub struct Engine {
    db: Arc<dyn Database>,
    ingestor: ThreadIngestor,
    orchestrator: ExtractionOrchestrator,
    store: ExtractionStore,
    lifecycle: LifecycleManager,
    policy: ConfidencePolicy,
    extraction_locks: KeyedLock<String>,
    in_flight: DashMap<String, CancellationToken>,
    fingerprint_prefix_chars: usize,
}

impl Engine {
    pub fn new(
        config: &EngineConfig,
        db: Arc<dyn Database>,
        capability: Arc<dyn ExtractionCapability>,
        tasks: Arc<dyn TaskService>,
    ) -> Self {
        Self {
            ingestor: ThreadIngestor::new(db.clone()),
            orchestrator: ExtractionOrchestrator::new(capability, config.extraction_timeout),
            store: ExtractionStore::new(db.clone(), config.fingerprint_prefix_chars),
            lifecycle: LifecycleManager::new(
                db.clone(),
                TaskBridge::new(tasks, config.task_bridge_timeout),
            ),
            policy: ConfidencePolicy::new(config.ranking.clone()),
            extraction_locks: KeyedLock::new(),
            in_flight: DashMap::new(),
            fingerprint_prefix_chars: config.fingerprint_prefix_chars,
            db,
        }
    }

    // ── Ingestion ───────────────────────────────────────────────────

    pub async fn ingest(&self, payload: ThreadPayload) -> Result<CommunicationThread, IngestError> {
        self.ingestor.accept(payload).await
    }

    // ── Extraction ──────────────────────────────────────────────────

    /// Extract and persist items from messages added since the last
    /// successful run.
    ///
    /// A capability failure is not an error here: it yields a Failed run and
    /// leaves the thread pending for the next sweep.
    pub async fn reprocess(&self, thread_id: &str) -> Result<ReprocessOutcome, ExtractionError> {
        let _guard = self.extraction_locks.lock(thread_id.to_string()).await;

        // Registered before the archive check so a concurrent archive either
        // is seen below or cancels this token.
        let token = CancellationToken::new();
        self.in_flight.insert(thread_id.to_string(), token.clone());
        let result = self.run_extraction(thread_id, &token).await;
        self.in_flight.remove(thread_id);
        result
    }

    async fn run_extraction(
        &self,
        thread_id: &str,
        token: &CancellationToken,
    ) -> Result<ReprocessOutcome, ExtractionError> {
        let thread = self
            .db
            .get_thread(thread_id)
            .await?
            .ok_or_else(|| ExtractionError::ThreadNotFound {
                thread_id: thread_id.to_string(),
            })?;
        if thread.archived {
            debug!(thread_id, "Skipping archived thread");
            return Err(ExtractionError::Cancelled {
                thread_id: thread_id.to_string(),
            });
        }

        let since = thread.last_processed_message_id.clone();
        let outcome = self.orchestrator.extract(&thread, since.as_deref(), token).await;
        let mut run = outcome.run;

        if run.status != RunStatus::Succeeded {
            self.db.record_run(&run).await?;
            return Ok(ReprocessOutcome {
                run,
                created: Vec::new(),
                skipped: 0,
            });
        }

        let persisted = match self.store.persist(&thread, outcome.candidates, token).await {
            Ok(Some(p)) => p,
            Ok(None) => {
                info!(thread_id, "Thread archived during extraction, discarding candidates");
                let cancelled = run.finish(
                    RunStatus::Cancelled,
                    Some(ExtractionError::Cancelled { thread_id: thread_id.to_string() }.to_string()),
                );
                self.db.record_run(&cancelled).await?;
                return Ok(ReprocessOutcome {
                    run: cancelled,
                    created: Vec::new(),
                    skipped: 0,
                });
            }
            Err(e) => {
                error!(thread_id, error = %e, "Failed to persist candidates");
                let failed = run.finish(RunStatus::Failed, Some(e.to_string()));
                if let Err(record_err) = self.db.record_run(&failed).await {
                    warn!(thread_id, error = %record_err, "Failed to record run");
                }
                return Err(e.into());
            }
        };
        run.items_created = persisted.created.len();

        let marked = self
            .db
            .mark_thread_processed(
                thread_id,
                Utc::now(),
                thread.last_message_id(),
                thread.messages.len(),
            )
            .await?;
        if !marked {
            debug!(thread_id, "Thread changed during extraction, leaving it pending");
        }

        self.db.record_run(&run).await?;
        Ok(ReprocessOutcome {
            run,
            created: persisted.created,
            skipped: persisted.skipped,
        })
    }

    /// Reprocess up to `limit` pending threads concurrently.
    ///
    /// Each thread's result is reported separately; one thread's failure does
    /// not affect the others.
    pub async fn reprocess_pending(
        &self,
        limit: usize,
    ) -> Result<Vec<(String, Result<ReprocessOutcome, ExtractionError>)>, DatabaseError> {
        let ids = self.db.threads_needing_extraction(limit).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        info!(count = ids.len(), "Reprocessing pending threads");

        let results = join_all(ids.into_iter().map(|id| async move {
            let result = self.reprocess(&id).await;
            if let Err(ref e) = result {
                warn!(thread_id = %id, error = %e, "Reprocess failed");
            }
            (id, result)
        }))
        .await;
        Ok(results)
    }

    /// Archive a thread and cancel any extraction running for it.
    pub async fn archive_thread(&self, thread_id: &str) -> Result<bool, DatabaseError> {
        let archived = self.db.archive_thread(thread_id).await?;
        if let Some(token) = self.in_flight.get(thread_id) {
            token.cancel();
            info!(thread_id, "Cancelled in-flight extraction");
        }
        if archived {
            info!(thread_id, "Thread archived");
        }
        Ok(archived)
    }

    pub async fn runs(&self, thread_id: &str) -> Result<Vec<ExtractionRun>, DatabaseError> {
        self.db.list_runs(thread_id).await
    }

    // ── Read surface ────────────────────────────────────────────────

    /// Items of a thread, Open ones ranked for display.
    pub async fn thread_items(&self, thread_id: &str) -> Result<ThreadItems, DatabaseError> {
        self.thread_items_at(thread_id, Utc::now()).await
    }

    /// `thread_items` ranked against an explicit clock.
    pub async fn thread_items_at(
        &self,
        thread_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ThreadItems, DatabaseError> {
        let mut grouped = ThreadItems::default();
        let mut open = Vec::new();
        for item in self.db.list_items_for_thread(thread_id).await? {
            match item.state {
                LifecycleState::Open => open.push(item),
                LifecycleState::Converted { .. } => grouped.converted.push(item),
                LifecycleState::Dismissed { .. } => grouped.dismissed.push(item),
            }
        }
        grouped.open = self
            .policy
            .rank_items(open, now)
            .into_iter()
            .map(|(item, score)| RankedItem { item, score })
            .collect();
        Ok(grouped)
    }

    pub async fn get_item(&self, id: Uuid) -> Result<Option<ExtractedItem>, DatabaseError> {
        self.db.get_item(id).await
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    pub async fn convert(&self, request: ConvertRequest) -> Result<ExtractedItem, LifecycleError> {
        self.lifecycle.convert(request).await
    }

    pub async fn dismiss(&self, request: DismissRequest) -> Result<ExtractedItem, LifecycleError> {
        self.lifecycle.dismiss(request).await
    }

    pub async fn relink_task(
        &self,
        item_id: Uuid,
        task_id: TaskId,
        expected_version: i64,
    ) -> Result<ExtractedItem, LifecycleError> {
        self.lifecycle.relink_task(item_id, task_id, expected_version).await
    }

    // ── Legacy import ───────────────────────────────────────────────

    /// Import one legacy item. Returns `None` when an item with the same
    /// fingerprint already exists for the thread.
    pub async fn import_legacy_item(&self, record: LegacyItem) -> Result<Option<ExtractedItem>, Error> {
        let now = Utc::now();
        let state = normalize_legacy_state(&record.state, now).inspect_err(|e| {
            error!(
                thread_id = %record.thread_id,
                source_message_id = %record.source_message_id,
                error = %e,
                "Legacy record needs owner review"
            );
        })?;

        let thread = self
            .db
            .get_thread(&record.thread_id)
            .await?
            .ok_or_else(|| LegacyConflict::ThreadNotFound {
                thread_id: record.thread_id.clone(),
            })?;
        if !thread.contains_message(&record.source_message_id) {
            return Err(LegacyConflict::UnknownSourceMessage {
                thread_id: record.thread_id,
                message_id: record.source_message_id,
            }
            .into());
        }

        check_payload(&thread, &record.payload).map_err(|reason| {
            LegacyConflict::InvalidPayload {
                thread_id: thread.id.clone(),
                reason,
            }
        })?;

        let candidate = CandidateExtraction {
            source_message_id: record.source_message_id,
            confidence: record.confidence,
            payload: record.payload,
        };
        let fingerprint =
            candidate_fingerprint(&thread.id, &candidate, self.fingerprint_prefix_chars);
        let mut item = ExtractedItem::new(&thread.id, &thread.matter_id, candidate, fingerprint);
        item.state = state;
        item.created_at = record.created_at.unwrap_or(now);

        if self.db.insert_item(&item).await? {
            info!(item_id = %item.id, thread_id = %thread.id, state = item.state.label(), "Legacy item imported");
            Ok(Some(item))
        } else {
            debug!(thread_id = %thread.id, "Legacy item already present");
            Ok(None)
        }
    }
}

/// Periodically reprocess threads whose extraction is still pending, until
/// `shutdown` fires. The first sweep runs immediately.
pub fn spawn_retry_sweep(
    engine: Arc<Engine>,
    interval: Duration,
    batch_size: usize,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Retry sweep stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            match engine.reprocess_pending(batch_size).await {
                Ok(results) if !results.is_empty() => {
                    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
                    info!(threads = results.len(), failed, "Retry sweep complete");
                }
                Ok(_) => debug!("Retry sweep found nothing pending"),
                Err(e) => error!(error = %e, "Retry sweep could not list pending threads"),
            }
        }
    })
}
