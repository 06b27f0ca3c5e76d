//! Extraction — AI capability, candidate validation, fingerprinting, storage.

pub mod capability;
pub mod fingerprint;
pub mod model;
pub mod orchestrator;
pub mod store;

pub use capability::{ExtractionCapability, ExtractionRequest, LlmExtractor, RawCandidate};
pub use orchestrator::{ExtractionOrchestrator, ExtractionOutcome, check_payload};
pub use store::{ExtractionStore, PersistOutcome};
