//! Class-name keyed factories for modules and conditions providers.
//!
//! The registry is built explicitly at startup and handed to
//! [`Process::new`](super::process::Process::new); there is no global
//! registration.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use tracing::debug;

use crate::config::Parameters;

use super::conditions::{ConditionsProvider, RandomNumberSeedService};
use super::error::FrameworkError;
use super::processor::{Analyzer, Module, Producer};

type ProcessorMaker = Box<dyn Fn(&str) -> Module>;
type ProviderMaker = Box<dyn Fn(&str, &str, &Parameters) -> Result<Box<dyn ConditionsProvider>>>;

/// What kind of class a registry entry creates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Producer,
    Analyzer,
    ConditionsProvider,
}

impl fmt::Display for ClassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Producer => "producer",
            Self::Analyzer => "analyzer",
            Self::ConditionsProvider => "conditions provider",
        };
        f.write_str(s)
    }
}

struct ProcessorEntry {
    kind: ClassKind,
    make: ProcessorMaker,
}

/// Registered module and provider classes
#[derive(Default)]
pub struct PluginRegistry {
    processors: BTreeMap<String, ProcessorEntry>,
    providers: BTreeMap<String, ProviderMaker>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("processors", &self.processors.keys().collect::<Vec<_>>())
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PluginRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the classes shipped with the framework
    pub fn with_builtins() -> Result<Self, FrameworkError> {
        let mut registry = Self::new();
        crate::processors::register(&mut registry)?;
        registry.register_provider(
            RandomNumberSeedService::CLASS_NAME,
            |_: &str, _: &str, params: &Parameters| {
                let service = RandomNumberSeedService::configure(params)?;
                Ok(Box::new(service) as Box<dyn ConditionsProvider>)
            },
        )?;
        Ok(registry)
    }

    /// Register a producer class
    ///
    /// `make` receives the instance name.
    pub fn register_producer<P, F>(&mut self, class_name: &str, make: F) -> Result<(), FrameworkError>
    where
        P: Producer + 'static,
        F: Fn(&str) -> P + 'static,
    {
        self.insert_processor(
            class_name,
            ClassKind::Producer,
            Box::new(move |name: &str| Module::Producer(Box::new(make(name)))),
        )
    }

    /// Register an analyzer class
    pub fn register_analyzer<A, F>(&mut self, class_name: &str, make: F) -> Result<(), FrameworkError>
    where
        A: Analyzer + 'static,
        F: Fn(&str) -> A + 'static,
    {
        self.insert_processor(
            class_name,
            ClassKind::Analyzer,
            Box::new(move |name: &str| Module::Analyzer(Box::new(make(name)))),
        )
    }

    /// Register a conditions provider class
    ///
    /// `make` receives the object name, the tag and the parameters.
    pub fn register_provider<F>(&mut self, class_name: &str, make: F) -> Result<(), FrameworkError>
    where
        F: Fn(&str, &str, &Parameters) -> Result<Box<dyn ConditionsProvider>> + 'static,
    {
        if self.is_registered(class_name) {
            return Err(FrameworkError::DuplicateClass(class_name.to_string()));
        }
        debug!(class = class_name, "Registered conditions provider class");
        self.providers.insert(class_name.to_string(), Box::new(make));
        Ok(())
    }

    fn insert_processor(
        &mut self,
        class_name: &str,
        kind: ClassKind,
        make: ProcessorMaker,
    ) -> Result<(), FrameworkError> {
        if self.is_registered(class_name) {
            return Err(FrameworkError::DuplicateClass(class_name.to_string()));
        }
        debug!(class = class_name, %kind, "Registered processor class");
        self.processors
            .insert(class_name.to_string(), ProcessorEntry { kind, make });
        Ok(())
    }

    pub fn is_registered(&self, class_name: &str) -> bool {
        self.processors.contains_key(class_name) || self.providers.contains_key(class_name)
    }

    /// Create an instance of a processor class
    pub fn create_processor(
        &self,
        class_name: &str,
        instance_name: &str,
    ) -> Result<Module, FrameworkError> {
        let entry = self
            .processors
            .get(class_name)
            .ok_or_else(|| FrameworkError::UnregisteredClass {
                class_name: class_name.to_string(),
                instance_name: instance_name.to_string(),
            })?;
        Ok((entry.make)(instance_name))
    }

    /// Create an instance of a conditions provider class
    pub fn create_provider(
        &self,
        class_name: &str,
        object_name: &str,
        tag: &str,
        parameters: &Parameters,
    ) -> Result<Box<dyn ConditionsProvider>> {
        let make = self
            .providers
            .get(class_name)
            .ok_or_else(|| FrameworkError::UnregisteredClass {
                class_name: class_name.to_string(),
                instance_name: object_name.to_string(),
            })?;
        make(object_name, tag, parameters)
    }

    /// Every registered class and its kind, ordered by name
    pub fn classes(&self) -> Vec<(&str, ClassKind)> {
        let mut classes: Vec<(&str, ClassKind)> = self
            .processors
            .iter()
            .map(|(name, entry)| (name.as_str(), entry.kind))
            .chain(
                self.providers
                    .keys()
                    .map(|name| (name.as_str(), ClassKind::ConditionsProvider)),
            )
            .collect();
        classes.sort_by(|a, b| a.0.cmp(b.0));
        classes
    }
}
