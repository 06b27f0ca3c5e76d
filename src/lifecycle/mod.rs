//! Item lifecycle: Open → Converted | Dismissed.

pub mod manager;

pub use manager::{ConvertRequest, DismissRequest, LifecycleManager};
