//! Named errors raised by the framework.
//!
//! Configuration and I/O problems are fatal: they propagate out of
//! `Process::run` wrapped in `anyhow::Error` and can be recovered with
//! `downcast_ref::<FrameworkError>()`. The abort-event signal is not an
//! error of this kind; see [`ProcessorError`](super::processor::ProcessorError).

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameworkError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unable to create instance '{instance_name}' of class '{class_name}': class was never registered")]
    UnregisteredClass {
        class_name: String,
        instance_name: String,
    },

    #[error("Class '{0}' is already registered")]
    DuplicateClass(String),

    #[error("Malformed drop/keep rule '{rule}': {reason}")]
    MalformedRule { rule: String, reason: String },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Run map already contains a run with number {0}")]
    DuplicateRun(i32),

    #[error("No run header exists for run {0}")]
    MissingRunHeader(i32),

    #[error("File '{path}' is not readable or does not exist")]
    FileNotReadable { path: PathBuf },

    #[error("Output file '{path}' is not writable: {reason}")]
    FileNotWritable { path: PathBuf, reason: String },

    #[error("The product name '{0}' is illegal as it contains an underscore")]
    IllegalProductName(String),

    #[error("A product named '{name}' was already added to this event by pass '{pass}'")]
    ProductExists { name: String, pass: String },

    #[error("No product named '{name}' (pass '{pass}') in this event")]
    ProductNotFound { name: String, pass: String },

    #[error("Product name '{name}' is ambiguous: {count} passes provide it")]
    AmbiguousProduct { name: String, count: usize },

    #[error("Product '{branch}' could not be converted: {reason}")]
    ProductType { branch: String, reason: String },

    #[error("No histogram file was configured")]
    NoHistogramFile,

    #[error("No conditions provider for object '{0}'")]
    MissingConditionsProvider(String),

    #[error("Conditions object '{0}' already has a provider")]
    DuplicateConditionsProvider(String),

    #[error("Conditions object '{name}' is not a {expected}")]
    ConditionsType { name: String, expected: &'static str },
}
