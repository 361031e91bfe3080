//! Interfaces implemented by processing modules.
//!
//! A module is either a [`Producer`], which may add products to the event,
//! or an [`Analyzer`], which only reads it. Both share the lifecycle
//! callbacks of [`EventProcessor`].

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;

use crate::config::Parameters;
use crate::domain::RunHeader;

use super::conditions::Conditions;
use super::error::FrameworkError;
use super::event::Event;
use super::event_file::EventFile;
use super::storage::{StorageControl, StorageHint};

/// Outcome of a failed `produce` or `analyze` call
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// Stop processing the current attempt of this event
    ///
    /// The event may be retried; this never ends the process.
    #[error("Event aborted: {reason}")]
    AbortEvent { reason: String },

    #[error(transparent)]
    Framework(#[from] FrameworkError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProcessorError {
    /// Abort the current event
    pub fn abort(reason: impl Into<String>) -> Self {
        Self::AbortEvent {
            reason: reason.into(),
        }
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, Self::AbortEvent { .. })
    }
}

/// Lifecycle callbacks shared by every module
pub trait EventProcessor {
    /// Read the module's parameters
    fn configure(&mut self, _parameters: &Parameters) -> Result<()> {
        Ok(())
    }

    fn on_process_start(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_process_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_file_open(&mut self, _file: &EventFile) -> Result<()> {
        Ok(())
    }

    fn on_file_close(&mut self, _file: &EventFile) -> Result<()> {
        Ok(())
    }

    /// Run header is final by the time this is called
    fn on_new_run(&mut self, _header: &RunHeader) -> Result<()> {
        Ok(())
    }
}

/// A module that may add products to the event
pub trait Producer: EventProcessor {
    /// Fill in the run header before any module sees the new run
    fn before_new_run(&mut self, _header: &mut RunHeader) -> Result<()> {
        Ok(())
    }

    fn produce(&mut self, event: &mut Event, ctx: &mut ProcessorContext<'_>)
        -> Result<(), ProcessorError>;
}

/// A module that only reads the event
pub trait Analyzer: EventProcessor {
    fn analyze(&mut self, event: &Event, ctx: &mut ProcessorContext<'_>)
        -> Result<(), ProcessorError>;
}

/// A configured module, producer or analyzer
pub enum Module {
    Producer(Box<dyn Producer>),
    Analyzer(Box<dyn Analyzer>),
}

macro_rules! dispatch {
    ($module:expr, $p:ident => $call:expr) => {
        match $module {
            Module::Producer($p) => $call,
            Module::Analyzer($p) => $call,
        }
    };
}

impl Module {
    pub fn is_producer(&self) -> bool {
        matches!(self, Self::Producer(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Producer(_) => "producer",
            Self::Analyzer(_) => "analyzer",
        }
    }

    pub fn configure(&mut self, parameters: &Parameters) -> Result<()> {
        dispatch!(self, p => p.configure(parameters))
    }

    pub fn on_process_start(&mut self) -> Result<()> {
        dispatch!(self, p => p.on_process_start())
    }

    pub fn on_process_end(&mut self) -> Result<()> {
        dispatch!(self, p => p.on_process_end())
    }

    pub fn on_file_open(&mut self, file: &EventFile) -> Result<()> {
        dispatch!(self, p => p.on_file_open(file))
    }

    pub fn on_file_close(&mut self, file: &EventFile) -> Result<()> {
        dispatch!(self, p => p.on_file_close(file))
    }

    pub fn on_new_run(&mut self, header: &RunHeader) -> Result<()> {
        dispatch!(self, p => p.on_new_run(header))
    }

    /// Only producers take part in the first phase of a run transition
    pub fn before_new_run(&mut self, header: &mut RunHeader) -> Result<()> {
        match self {
            Self::Producer(p) => p.before_new_run(header),
            Self::Analyzer(_) => Ok(()),
        }
    }

    /// Run the module on the current event
    pub fn process(
        &mut self,
        event: &mut Event,
        ctx: &mut ProcessorContext<'_>,
    ) -> Result<(), ProcessorError> {
        match self {
            Self::Producer(p) => p.produce(event, ctx),
            Self::Analyzer(a) => a.analyze(event, ctx),
        }
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Module({})", self.kind())
    }
}

/// What a module can reach while processing an event
pub struct ProcessorContext<'a> {
    instance_name: &'a str,
    pass_name: &'a str,
    storage: &'a mut StorageControl,
    conditions: &'a mut Conditions,
    histogram_file: Option<&'a Path>,
}

impl<'a> ProcessorContext<'a> {
    pub fn new(
        instance_name: &'a str,
        pass_name: &'a str,
        storage: &'a mut StorageControl,
        conditions: &'a mut Conditions,
        histogram_file: Option<&'a Path>,
    ) -> Self {
        Self {
            instance_name,
            pass_name,
            storage,
            conditions,
            histogram_file,
        }
    }

    pub fn instance_name(&self) -> &str {
        self.instance_name
    }

    pub fn pass_name(&self) -> &str {
        self.pass_name
    }

    /// Vote on whether the current event should be stored
    pub fn set_storage_hint(&mut self, hint: StorageHint, purpose: &str) {
        self.storage.add_hint(self.instance_name, hint, purpose);
    }

    /// Conditions object valid for the current event
    pub fn condition<T: Any + Send + Sync>(&mut self, object_name: &str) -> Result<Arc<T>> {
        self.conditions.get(object_name)
    }

    /// Path of the shared histogram file
    pub fn histogram_file(&self) -> Result<&Path, FrameworkError> {
        self.histogram_file.ok_or(FrameworkError::NoHistogramFile)
    }
}
