//! Communication threads and their ingestion.

pub mod ingestor;
pub mod model;

pub use ingestor::ThreadIngestor;
pub use model::{CommunicationThread, Message, MessagePayload, ThreadPayload};
