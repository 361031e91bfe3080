//! Domain types for the event-processing framework.
//!
//! This module contains the core data structures:
//! - EventHeader: Per-event identification, always present
//! - RunHeader: Run-level metadata
//! - ProductTag: Identification of data products on the event bus

pub mod event_header;
pub mod product;
pub mod run_header;

// Re-export commonly used types
pub use event_header::EventHeader;
pub use product::{branch_name, ProductTag};
pub use run_header::RunHeader;
