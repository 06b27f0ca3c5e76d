//! Communication intelligence: extracts deadlines, commitments and action
//! items from matter correspondence and turns confirmed ones into tasks.

pub mod config;
pub mod error;
pub mod extraction;
pub mod lifecycle;
pub mod llm;
pub mod pipeline;
pub mod policy;
pub mod store;
pub mod tasks;
pub mod threads;

pub use error::{Error, Result};
pub use pipeline::Engine;
