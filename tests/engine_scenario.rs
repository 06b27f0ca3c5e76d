//! End-to-end tests for the engine facade.
//!
//! Each test builds an `Engine` over an in-memory libSQL database with stub
//! extraction and task services that count their calls.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::time::timeout;
use uuid::Uuid;

use comm_intel::config::EngineConfig;
use comm_intel::error::{DatabaseError, Error, LegacyConflict, LlmError, LifecycleError, TaskBridgeError};
use comm_intel::extraction::model::{
    Confidence, DismissReason, ExtractedItem, ExtractionRun, ItemPayload, LifecycleState, RunStatus,
};
use comm_intel::extraction::{ExtractionCapability, ExtractionRequest, RawCandidate};
use comm_intel::lifecycle::{ConvertRequest, DismissRequest};
use comm_intel::pipeline::Engine;
use comm_intel::store::legacy::{LegacyItem, LegacyItemState};
use comm_intel::store::{Database, LibSqlBackend};
use comm_intel::tasks::{TaskId, TaskRequest, TaskService, TaskType};
use comm_intel::threads::{CommunicationThread, MessagePayload, ThreadPayload};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

// ── Stubs ───────────────────────────────────────────────────────────

/// Extraction capability returning a fixed candidate list.
struct StubCapability {
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    candidates: Mutex<Vec<RawCandidate>>,
    last_message_ids: Mutex<Vec<String>>,
    delay: Duration,
    started: Notify,
}

impl StubCapability {
    fn new(candidates: Vec<RawCandidate>) -> Arc<Self> {
        Self::with_delay(candidates, Duration::ZERO)
    }

    fn with_delay(candidates: Vec<RawCandidate>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            candidates: Mutex::new(candidates),
            last_message_ids: Mutex::new(Vec::new()),
            delay,
            started: Notify::new(),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn set_candidates(&self, candidates: Vec<RawCandidate>) {
        *self.candidates.lock().unwrap() = candidates;
    }
}

#[async_trait]
impl ExtractionCapability for StubCapability {
    fn name(&self) -> &str {
        "stub"
    }

    async fn extract(&self, request: ExtractionRequest) -> Result<Vec<RawCandidate>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        *self.last_message_ids.lock().unwrap() =
            request.messages.iter().map(|m| m.id.clone()).collect();
        self.started.notify_one();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(self.candidates.lock().unwrap().clone())
    }
}

/// Task service handing out sequential ids, or failing on demand.
struct StubTasks {
    calls: AtomicUsize,
    requests: Mutex<Vec<TaskRequest>>,
    fail: bool,
}

impl StubTasks {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskService for StubTasks {
    async fn create_task(&self, request: TaskRequest) -> Result<TaskId, TaskBridgeError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request);
        if self.fail {
            return Err(TaskBridgeError::RequestFailed {
                reason: "connection refused".into(),
            });
        }
        Ok(TaskId(format!("X{n}")))
    }
}

/// Database that parks batch inserts until released.
struct GatedDb {
    inner: LibSqlBackend,
    entered: Notify,
    release: Notify,
}

impl GatedDb {
    async fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: LibSqlBackend::new_memory().await.unwrap(),
            entered: Notify::new(),
            release: Notify::new(),
        })
    }
}

#[async_trait]
impl Database for GatedDb {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        self.inner.init_schema().await
    }

    async fn get_thread(&self, id: &str) -> Result<Option<CommunicationThread>, DatabaseError> {
        self.inner.get_thread(id).await
    }

    async fn save_thread(&self, thread: &CommunicationThread) -> Result<(), DatabaseError> {
        self.inner.save_thread(thread).await
    }

    async fn mark_thread_processed(
        &self,
        id: &str,
        processed_at: DateTime<Utc>,
        last_message_id: Option<&str>,
        expected_message_count: usize,
    ) -> Result<bool, DatabaseError> {
        self.inner
            .mark_thread_processed(id, processed_at, last_message_id, expected_message_count)
            .await
    }

    async fn archive_thread(&self, id: &str) -> Result<bool, DatabaseError> {
        self.inner.archive_thread(id).await
    }

    async fn threads_needing_extraction(&self, limit: usize) -> Result<Vec<String>, DatabaseError> {
        self.inner.threads_needing_extraction(limit).await
    }

    async fn insert_item(&self, item: &ExtractedItem) -> Result<bool, DatabaseError> {
        self.inner.insert_item(item).await
    }

    async fn insert_items(
        &self,
        thread_id: &str,
        items: &[ExtractedItem],
    ) -> Result<Option<Vec<Uuid>>, DatabaseError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.insert_items(thread_id, items).await
    }

    async fn get_item(&self, id: Uuid) -> Result<Option<ExtractedItem>, DatabaseError> {
        self.inner.get_item(id).await
    }

    async fn list_items_for_thread(&self, thread_id: &str) -> Result<Vec<ExtractedItem>, DatabaseError> {
        self.inner.list_items_for_thread(thread_id).await
    }

    async fn update_item_state(
        &self,
        item: &ExtractedItem,
        expected_version: i64,
    ) -> Result<bool, DatabaseError> {
        self.inner.update_item_state(item, expected_version).await
    }

    async fn record_run(&self, run: &ExtractionRun) -> Result<(), DatabaseError> {
        self.inner.record_run(run).await
    }

    async fn list_runs(&self, thread_id: &str) -> Result<Vec<ExtractionRun>, DatabaseError> {
        self.inner.list_runs(thread_id).await
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

fn day(n: i64) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-02T10:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
        + chrono::Duration::days(n)
}

fn message(id: &str, sent: i64, body: &str) -> MessagePayload {
    MessagePayload {
        id: Some(id.into()),
        sender: Some("counsel@opposing.com".into()),
        recipients: vec!["associate@firm.com".into()],
        sent_date: Some(day(sent)),
        body: body.into(),
        attachments: vec![],
    }
}

fn payload(thread_id: &str, messages: Vec<MessagePayload>) -> ThreadPayload {
    ThreadPayload {
        id: Some(thread_id.into()),
        subject: Some("Re: Motion to compel".into()),
        matter_id: Some("MAT-2026-014".into()),
        messages,
    }
}

fn t1_messages() -> Vec<MessagePayload> {
    vec![
        message("M1", 0, "Please find our motion attached."),
        message("M2", 2, "Your opposition is due in two weeks."),
    ]
}

fn deadline_from_m2() -> RawCandidate {
    RawCandidate {
        kind: "deadline".into(),
        confidence: "high".into(),
        source_message_id: Some("M2".into()),
        description: Some("File opposition to motion to compel".into()),
        due_date: Some(day(14).to_rfc3339()),
        ..Default::default()
    }
}

async fn engine_with(
    config: EngineConfig,
    capability: Arc<StubCapability>,
    tasks: Arc<StubTasks>,
) -> (Engine, Arc<dyn Database>) {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    (Engine::new(&config, db.clone(), capability, tasks), db)
}

async fn engine(capability: Arc<StubCapability>, tasks: Arc<StubTasks>) -> (Engine, Arc<dyn Database>) {
    engine_with(EngineConfig::default(), capability, tasks).await
}

// ── Scenario ────────────────────────────────────────────────────────

#[tokio::test]
async fn deadline_scenario_end_to_end() {
    let capability = StubCapability::new(vec![deadline_from_m2()]);
    let tasks = StubTasks::new();
    let (engine, _db) = engine(capability.clone(), tasks.clone()).await;

    engine.ingest(payload("T1", t1_messages())).await.unwrap();

    // First pass creates D1
    let first = engine.reprocess("T1").await.unwrap();
    assert_eq!(first.run.status, RunStatus::Succeeded);
    assert_eq!(first.created.len(), 1);
    let d1 = first.created[0].clone();
    assert!(d1.state.is_open());
    assert_eq!(d1.confidence, Confidence::High);
    assert_eq!(d1.source_message_id, "M2");

    // No new messages: nothing new
    let second = engine.reprocess("T1").await.unwrap();
    assert!(second.created.is_empty());

    // Convert creates exactly one task
    let converted = engine
        .convert(ConvertRequest {
            item_id: d1.id,
            expected_version: d1.version,
            assignee_override: None,
        })
        .await
        .unwrap();
    assert_eq!(converted.converted_task_id(), Some(&TaskId::from("X1")));
    assert_eq!(tasks.calls(), 1);
    {
        let requests = tasks.requests.lock().unwrap();
        assert_eq!(requests[0].task_type, TaskType::Filing);
        assert_eq!(requests[0].due_date, Some(day(14)));
        assert_eq!(requests[0].matter_id, "MAT-2026-014");
    }

    // Dismissing a converted item fails and changes nothing
    let err = engine
        .dismiss(DismissRequest {
            item_id: d1.id,
            expected_version: converted.version,
            reason: DismissReason::NotRelevant,
            note: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidState { .. }));

    let stored = engine.get_item(d1.id).await.unwrap().unwrap();
    assert!(matches!(stored.state, LifecycleState::Converted { ref task_id, .. } if task_id.as_str() == "X1"));

    // Second convert is rejected without another task call
    let err = engine
        .convert(ConvertRequest {
            item_id: d1.id,
            expected_version: stored.version,
            assignee_override: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidState { .. }));
    assert_eq!(tasks.calls(), 1);
}

#[tokio::test]
async fn reingest_and_reextract_are_idempotent() {
    let capability = StubCapability::new(vec![deadline_from_m2()]);
    let (engine, db) = engine(capability.clone(), StubTasks::new()).await;

    engine.ingest(payload("T1", t1_messages())).await.unwrap();
    let before = db.get_thread("T1").await.unwrap().unwrap();
    engine.ingest(payload("T1", t1_messages())).await.unwrap();
    let after = db.get_thread("T1").await.unwrap().unwrap();
    assert_eq!(before, after);

    engine.reprocess("T1").await.unwrap();

    // A new message arrives and the model repeats the same deadline with
    // slightly different punctuation.
    engine
        .ingest(payload("T1", vec![message("M3", 3, "Noted, thanks.")]))
        .await
        .unwrap();
    let mut repeat = deadline_from_m2();
    repeat.description = Some("file opposition to motion to compel.".into());
    capability.set_candidates(vec![repeat]);

    let outcome = engine.reprocess("T1").await.unwrap();
    assert!(outcome.created.is_empty());
    assert_eq!(outcome.skipped, 1);
    assert_eq!(*capability.last_message_ids.lock().unwrap(), vec!["M3".to_string()]);
    assert_eq!(engine.thread_items("T1").await.unwrap().open.len(), 1);
}

#[tokio::test]
async fn no_new_messages_skips_capability() {
    let capability = StubCapability::new(vec![deadline_from_m2()]);
    let (engine, _db) = engine(capability.clone(), StubTasks::new()).await;

    engine.ingest(payload("T1", t1_messages())).await.unwrap();
    engine.reprocess("T1").await.unwrap();
    engine.reprocess("T1").await.unwrap();
    assert_eq!(capability.calls(), 1);
}

#[tokio::test]
async fn invalid_candidates_are_dropped() {
    let mut stranger = RawCandidate {
        kind: "commitment".into(),
        confidence: "medium".into(),
        source_message_id: Some("M1".into()),
        party: Some("someone@elsewhere.com".into()),
        text: Some("Will produce documents".into()),
        ..Default::default()
    };
    let promise = RawCandidate {
        party: Some("Counsel@Opposing.com".into()),
        ..stranger.clone()
    };
    stranger.text = Some("Will produce other documents".into());
    let capability = StubCapability::new(vec![stranger, promise, deadline_from_m2()]);
    let (engine, _db) = engine(capability, StubTasks::new()).await;

    engine.ingest(payload("T1", t1_messages())).await.unwrap();
    let outcome = engine.reprocess("T1").await.unwrap();
    assert_eq!(outcome.created.len(), 2);
    assert_eq!(outcome.run.candidates_dropped, 1);
}

// ── Failure paths ───────────────────────────────────────────────────

#[tokio::test]
async fn capability_timeout_leaves_thread_pending() {
    let capability = StubCapability::with_delay(vec![deadline_from_m2()], Duration::from_secs(30));
    let config = EngineConfig {
        extraction_timeout: Duration::from_millis(50),
        ..EngineConfig::default()
    };
    let (engine, db) = engine_with(config, capability, StubTasks::new()).await;

    engine.ingest(payload("T1", t1_messages())).await.unwrap();
    let outcome = timeout(TEST_TIMEOUT, engine.reprocess("T1")).await.unwrap().unwrap();

    assert_eq!(outcome.run.status, RunStatus::Failed);
    assert!(outcome.created.is_empty());
    assert!(db.list_items_for_thread("T1").await.unwrap().is_empty());
    assert_eq!(db.threads_needing_extraction(10).await.unwrap(), vec!["T1".to_string()]);

    let runs = engine.runs("T1").await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
}

#[tokio::test]
async fn archiving_mid_run_discards_candidates() {
    let capability = StubCapability::with_delay(vec![deadline_from_m2()], Duration::from_secs(30));
    let (engine, db) = engine(capability.clone(), StubTasks::new()).await;
    let engine = Arc::new(engine);

    engine.ingest(payload("T1", t1_messages())).await.unwrap();
    let run = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.reprocess("T1").await })
    };

    timeout(TEST_TIMEOUT, capability.started.notified()).await.unwrap();
    assert!(engine.archive_thread("T1").await.unwrap());

    let outcome = timeout(TEST_TIMEOUT, run).await.unwrap().unwrap().unwrap();
    assert_eq!(outcome.run.status, RunStatus::Cancelled);
    assert!(db.list_items_for_thread("T1").await.unwrap().is_empty());

    // Archived threads take no more work
    assert!(engine.reprocess("T1").await.is_err());
    assert!(engine.ingest(payload("T1", vec![message("M3", 3, "hi")])).await.is_err());
    assert!(db.threads_needing_extraction(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn archiving_during_persist_writes_nothing() {
    let actions = ["Pull exhibits", "Call the clerk", "Draft reply"]
        .into_iter()
        .map(|d| RawCandidate {
            kind: "action_item".into(),
            confidence: "medium".into(),
            source_message_id: Some("M1".into()),
            description: Some(d.into()),
            ..Default::default()
        })
        .collect();
    let gated = GatedDb::new().await;
    let db: Arc<dyn Database> = gated.clone();
    let engine = Arc::new(Engine::new(
        &EngineConfig::default(),
        db.clone(),
        StubCapability::new(actions),
        StubTasks::new(),
    ));

    engine.ingest(payload("T1", t1_messages())).await.unwrap();
    let run = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.reprocess("T1").await })
    };

    // Extraction finished; the batch is about to be written
    timeout(TEST_TIMEOUT, gated.entered.notified()).await.unwrap();
    assert!(engine.archive_thread("T1").await.unwrap());
    gated.release.notify_one();

    let outcome = timeout(TEST_TIMEOUT, run).await.unwrap().unwrap().unwrap();
    assert_eq!(outcome.run.status, RunStatus::Cancelled);
    assert!(outcome.created.is_empty());
    assert!(db.list_items_for_thread("T1").await.unwrap().is_empty());

    let runs = engine.runs("T1").await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Cancelled);
    assert_eq!(runs[0].items_created, 0);
}

#[tokio::test]
async fn concurrent_reprocess_of_one_thread_is_serialized() {
    let capability = StubCapability::with_delay(vec![deadline_from_m2()], Duration::from_millis(100));
    let (engine, db) = engine(capability.clone(), StubTasks::new()).await;
    let engine = Arc::new(engine);
    engine.ingest(payload("T1", t1_messages())).await.unwrap();

    let spawn = |engine: Arc<Engine>| tokio::spawn(async move { engine.reprocess("T1").await });
    let first = spawn(engine.clone());
    let second = spawn(engine.clone());
    let (a, b) = timeout(TEST_TIMEOUT, async { (first.await, second.await) }).await.unwrap();
    let (a, b) = (a.unwrap().unwrap(), b.unwrap().unwrap());

    assert_eq!(capability.peak.load(Ordering::SeqCst), 1);
    assert_eq!(capability.calls(), 1);
    assert_eq!(a.created.len() + b.created.len(), 1);
    assert_eq!(db.list_items_for_thread("T1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn different_threads_extract_in_parallel() {
    let capability = StubCapability::with_delay(vec![], Duration::from_millis(200));
    let (engine, _db) = engine(capability.clone(), StubTasks::new()).await;
    let engine = Arc::new(engine);
    engine.ingest(payload("T1", t1_messages())).await.unwrap();
    engine.ingest(payload("T2", t1_messages())).await.unwrap();

    let run = |engine: Arc<Engine>, id: &'static str| tokio::spawn(async move { engine.reprocess(id).await });
    let first = run(engine.clone(), "T1");
    let second = run(engine.clone(), "T2");
    let (a, b) = timeout(TEST_TIMEOUT, async { (first.await, second.await) }).await.unwrap();
    a.unwrap().unwrap();
    b.unwrap().unwrap();

    assert_eq!(capability.calls(), 2);
    assert_eq!(capability.peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stale_version_conflicts_without_task_call() {
    let tasks = StubTasks::new();
    let (engine, _db) = engine(StubCapability::new(vec![deadline_from_m2()]), tasks.clone()).await;
    engine.ingest(payload("T1", t1_messages())).await.unwrap();
    let d1 = engine.reprocess("T1").await.unwrap().created.remove(0);

    let err = engine
        .convert(ConvertRequest {
            item_id: d1.id,
            expected_version: d1.version + 1,
            assignee_override: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Conflict { .. }));
    assert_eq!(tasks.calls(), 0);
}

#[tokio::test]
async fn task_failure_leaves_item_open_at_same_version() {
    let tasks = StubTasks::failing();
    let (engine, _db) = engine(StubCapability::new(vec![deadline_from_m2()]), tasks.clone()).await;
    engine.ingest(payload("T1", t1_messages())).await.unwrap();
    let d1 = engine.reprocess("T1").await.unwrap().created.remove(0);

    let err = engine
        .convert(ConvertRequest {
            item_id: d1.id,
            expected_version: d1.version,
            assignee_override: Some("partner@firm.com".into()),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::TaskBridge(_)));
    assert!(err.is_retryable());
    assert_eq!(tasks.calls(), 1);
    assert_eq!(
        tasks.requests.lock().unwrap()[0].assignee_hint.as_deref(),
        Some("partner@firm.com")
    );

    let stored = engine.get_item(d1.id).await.unwrap().unwrap();
    assert!(stored.state.is_open());
    assert_eq!(stored.version, d1.version);
}

// ── Sweep, ranking, legacy ──────────────────────────────────────────

#[tokio::test]
async fn reprocess_pending_runs_every_thread() {
    let capability = StubCapability::new(vec![]);
    let (engine, db) = engine(capability.clone(), StubTasks::new()).await;
    for id in ["T1", "T2", "T3"] {
        engine.ingest(payload(id, t1_messages())).await.unwrap();
    }

    let results = engine.reprocess_pending(10).await.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|(_, r)| r.is_ok()));
    assert_eq!(capability.calls(), 3);
    assert!(db.threads_needing_extraction(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn open_items_are_ranked_and_grouped() {
    let low_action = RawCandidate {
        kind: "action_item".into(),
        confidence: "low".into(),
        source_message_id: Some("M1".into()),
        description: Some("Review the motion exhibits".into()),
        ..Default::default()
    };
    let capability = StubCapability::new(vec![low_action, deadline_from_m2()]);
    let (engine, _db) = engine(capability, StubTasks::new()).await;
    engine.ingest(payload("T1", t1_messages())).await.unwrap();
    engine.reprocess("T1").await.unwrap();

    let items = engine.thread_items("T1").await.unwrap();
    assert_eq!(items.open.len(), 2);
    assert!(matches!(items.open[0].item.payload, ItemPayload::Deadline { .. }));
    assert!(items.open[0].score > items.open[1].score);

    let action = items.open[1].item.clone();
    engine
        .dismiss(DismissRequest {
            item_id: action.id,
            expected_version: action.version,
            reason: DismissReason::AlreadyHandled,
            note: Some("done last week".into()),
        })
        .await
        .unwrap();

    let items = engine.thread_items("T1").await.unwrap();
    assert_eq!(items.open.len(), 1);
    assert_eq!(items.dismissed.len(), 1);
    assert!(items.converted.is_empty());
}

#[tokio::test]
async fn legacy_import_normalizes_and_dedupes() {
    let capability = StubCapability::new(vec![deadline_from_m2()]);
    let (engine, _db) = engine(capability, StubTasks::new()).await;
    engine.ingest(payload("T1", t1_messages())).await.unwrap();

    let legacy = LegacyItem {
        thread_id: "T1".into(),
        source_message_id: "M2".into(),
        confidence: Confidence::High,
        payload: ItemPayload::Deadline {
            description: "File opposition to motion to compel".into(),
            due_date: day(14),
        },
        created_at: None,
        state: LegacyItemState {
            converted_task_id: Some("LEGACY-9".into()),
            ..Default::default()
        },
    };
    let imported = engine.import_legacy_item(legacy.clone()).await.unwrap().unwrap();
    assert_eq!(imported.converted_task_id(), Some(&TaskId::from("LEGACY-9")));

    // Same content again, and the extractor's identical deadline, both skip
    assert!(engine.import_legacy_item(legacy.clone()).await.unwrap().is_none());
    let outcome = engine.reprocess("T1").await.unwrap();
    assert!(outcome.created.is_empty());

    let stranger = LegacyItem {
        payload: ItemPayload::Commitment {
            party: "someone@elsewhere.com".into(),
            text: "Will send the lease".into(),
            date: None,
        },
        state: LegacyItemState::default(),
        ..legacy.clone()
    };
    let err = engine.import_legacy_item(stranger).await.unwrap_err();
    assert!(matches!(err, Error::Legacy(LegacyConflict::InvalidPayload { .. })));

    let early = LegacyItem {
        payload: ItemPayload::Deadline {
            description: "Serve initial disclosures".into(),
            due_date: day(-5),
        },
        state: LegacyItemState::default(),
        ..legacy.clone()
    };
    let err = engine.import_legacy_item(early).await.unwrap_err();
    assert!(matches!(err, Error::Legacy(LegacyConflict::InvalidPayload { .. })));

    let mut conflicted = legacy;
    conflicted.state.dismissed = true;
    let err = engine.import_legacy_item(conflicted).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Legacy(LegacyConflict::BothDismissedAndConverted { .. })
    ));
}
