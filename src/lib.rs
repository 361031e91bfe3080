//! fire - event-processing framework
//!
//! Runs an ordered sequence of processing modules over a stream of events,
//! reading and writing event files with branch-level drop/keep rules and
//! keeping track of run headers.
//!
//! # Architecture
//!
//! One event is processed at a time:
//! - Producers may add products to the event bus, analyzers only read it
//! - A module can abort an event; the event is retried up to a fixed
//!   number of attempts
//! - Modules vote on storing each event; the votes decide whether the
//!   event reaches the output file
//! - At every new run, producers fill the run header before anyone else
//!   sees it
//!
//! # Modules
//!
//! - `core`: Event bus, event files, storage control, registry, conditions, Process
//! - `domain`: Data records (EventHeader, RunHeader, ProductTag)
//! - `processors`: Built-in modules
//! - `config`: Process configuration and module parameters
//! - `logging`: Terminal and file log sinks
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Generate 100 events
//! fire run sim.yaml -n 100
//!
//! # Reprocess a file into a new one
//! fire run reco.yaml -i sim.jsonl -o reco.jsonl
//!
//! # Look inside a file
//! fire dump reco.jsonl
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
pub mod processors;

// Re-export main types at crate root for convenience
pub use config::{Parameters, ProcessConfig};
pub use core::{
    Analyzer, Event, EventFile, EventProcessor, FrameworkError, PluginRegistry, Process,
    ProcessorContext, ProcessorError, Producer, StorageHint,
};
pub use domain::{EventHeader, ProductTag, RunHeader};
