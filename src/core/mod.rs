//! Core event-processing machinery.
//!
//! This module contains:
//! - Event: the per-event product bus
//! - EventFile: input and output event streams with drop/keep rules
//! - StorageControl: per-event keep/drop voting (skimming)
//! - Processor interfaces and the class registry
//! - Conditions: run-dependent objects and their providers
//! - Process: the event loop

pub mod conditions;
pub mod drop_keep;
pub mod error;
pub mod event;
pub mod event_file;
pub mod process;
pub mod processor;
pub mod registry;
pub mod storage;

// Re-export commonly used types
pub use conditions::{
    Conditions, ConditionsContext, ConditionsObject, ConditionsProvider, IntervalOfValidity,
    RandomNumberSeedService, RandomSeeds, SeedMode,
};
pub use drop_keep::{DropKeepRule, DropKeepRules, RuleAction};
pub use error::FrameworkError;
pub use event::{Event, EventEntry};
pub use event_file::{EventFile, FileMetadata, FileRecord, HeaderSource};
pub use process::{Process, ProcessSummary};
pub use processor::{
    Analyzer, EventProcessor, Module, ProcessorContext, ProcessorError, Producer,
};
pub use registry::{ClassKind, PluginRegistry};
pub use storage::{StorageControl, StorageHint};
