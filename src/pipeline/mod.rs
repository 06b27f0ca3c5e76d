//! Processing pipeline.
//!
//! Every thread flows through:
//! 1. `ThreadIngestor::accept()` — validate and merge upstream messages
//! 2. `ExtractionOrchestrator::extract()` — one bounded AI call over new messages
//! 3. `ExtractionStore::persist()` — fingerprint and store new Open items
//! 4. `LifecycleManager` — human-driven convert / dismiss
//!
//! **No item becomes a task without an explicit convert call.**

pub mod engine;
pub mod lock;

pub use engine::{Engine, RankedItem, ReprocessOutcome, ThreadItems, spawn_retry_sweep};
pub use lock::KeyedLock;
