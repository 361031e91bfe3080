//! Process configuration.
//!
//! A process is described by a YAML file. Every key except `pass_name` has
//! a default. Command-line overrides are applied on top of the file before
//! validation.
//!
//! ```yaml
//! pass_name: reco
//! input_files: [sim.jsonl]
//! output_files: [reco.jsonl]
//! keep: ["drop *Scratch*"]
//! sequence:
//!   - class_name: framework::EventPrint
//!     instance_name: print
//!     parameters: { frequency: 100 }
//! ```

pub mod parameters;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::{DropKeepRule, FrameworkError};
use crate::logging::LogLevel;

pub use parameters::{ParameterError, Parameters};

/// Full description of one processing pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Pass name given to every product added by this process
    pub pass_name: String,

    /// Run number used when generating events without input
    #[serde(default = "default_run")]
    pub run: i32,

    /// Maximum number of events to process (all of them if unset)
    #[serde(default)]
    pub max_events: Option<u64>,

    /// Attempts per event before giving up on it
    #[serde(default = "default_max_tries")]
    pub max_tries_per_event: u32,

    /// Log a progress line every this many events
    #[serde(default)]
    pub log_frequency: Option<u64>,

    /// Compression setting recorded in output files
    #[serde(default = "default_compression")]
    pub compression_setting: i32,

    #[serde(default = "default_term_log_level")]
    pub term_log_level: LogLevel,

    #[serde(default = "default_file_log_level")]
    pub file_log_level: LogLevel,

    /// Log file; no file logging if unset
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// File shared by modules for their histograms
    #[serde(default)]
    pub histogram_file: Option<PathBuf>,

    #[serde(default)]
    pub input_files: Vec<PathBuf>,

    #[serde(default)]
    pub output_files: Vec<PathBuf>,

    /// Drop/keep/ignore rules applied to output files
    #[serde(default)]
    pub keep: Vec<String>,

    /// Store events nobody voted on
    #[serde(default = "default_skim_keep")]
    pub skim_default_is_keep: bool,

    /// Which storage hints are listened to
    #[serde(default)]
    pub skim_rules: Vec<SkimRule>,

    /// Modules to run, in order
    #[serde(default)]
    pub sequence: Vec<ModuleSpec>,

    #[serde(default)]
    pub conditions_providers: Vec<ProviderSpec>,
}

fn default_run() -> i32 {
    1
}

fn default_max_tries() -> u32 {
    1
}

fn default_compression() -> i32 {
    9
}

fn default_term_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_file_log_level() -> LogLevel {
    LogLevel::Debug
}

fn default_skim_keep() -> bool {
    true
}

/// Listen to storage hints from matching processors and purposes
///
/// Empty patterns match anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkimRule {
    pub processor: String,

    #[serde(default)]
    pub purpose: String,
}

/// One entry of the module sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSpec {
    /// Registered class to create
    pub class_name: String,

    /// Name of this instance, unique within the sequence
    pub instance_name: String,

    #[serde(default)]
    pub parameters: Parameters,
}

/// One conditions provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub class_name: String,

    /// Conditions object served by the provider
    pub object_name: String,

    #[serde(default)]
    pub tag_name: String,

    #[serde(default)]
    pub parameters: Parameters,
}

/// How a process gets its events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// No input; producers generate `max_events` events
    Production,

    /// Events are read from the input files
    Files,
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub pass_name: Option<String>,
    pub run: Option<i32>,
    pub max_events: Option<u64>,
    pub input_files: Vec<PathBuf>,
    pub output_files: Vec<PathBuf>,
}

impl ProcessConfig {
    /// A configuration with every default and no modules
    pub fn new(pass_name: impl Into<String>) -> Self {
        Self {
            pass_name: pass_name.into(),
            run: default_run(),
            max_events: None,
            max_tries_per_event: default_max_tries(),
            log_frequency: None,
            compression_setting: default_compression(),
            term_log_level: default_term_log_level(),
            file_log_level: default_file_log_level(),
            log_file: None,
            histogram_file: None,
            input_files: Vec::new(),
            output_files: Vec::new(),
            keep: Vec::new(),
            skim_default_is_keep: default_skim_keep(),
            skim_rules: Vec::new(),
            sequence: Vec::new(),
            conditions_providers: Vec::new(),
        }
    }

    /// Load a configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&content)
            .with_context(|| format!("Failed to load config file: {}", path.display()))
    }

    /// Parse a configuration from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse process configuration YAML")
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize process configuration")
    }

    /// Apply command-line values; they take priority over the file
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(pass) = overrides.pass_name {
            self.pass_name = pass;
        }
        if let Some(run) = overrides.run {
            self.run = run;
        }
        if let Some(max_events) = overrides.max_events {
            self.max_events = Some(max_events);
        }
        if !overrides.input_files.is_empty() {
            self.input_files = overrides.input_files;
        }
        if !overrides.output_files.is_empty() {
            self.output_files = overrides.output_files;
        }
    }

    /// Which event loop this configuration selects
    pub fn mode(&self) -> Result<RunMode, FrameworkError> {
        if !self.input_files.is_empty() {
            return Ok(RunMode::Files);
        }
        match self.max_events {
            Some(n) if n > 0 => Ok(RunMode::Production),
            _ => Err(FrameworkError::InvalidConfig(
                "No input files were given and max_events is not positive".to_string(),
            )),
        }
    }

    /// Check the configuration for everything that can be known before running
    pub fn validate(&self) -> Result<(), FrameworkError> {
        let invalid = |msg: String| Err(FrameworkError::InvalidConfig(msg));

        if self.pass_name.is_empty() {
            return invalid("pass_name cannot be empty".to_string());
        }
        if self.max_tries_per_event == 0 {
            return invalid("max_tries_per_event must be at least 1".to_string());
        }

        match self.mode()? {
            RunMode::Production => {
                if self.output_files.is_empty() {
                    return invalid("No input files or output files were given".to_string());
                }
            }
            RunMode::Files => {
                let outputs = self.output_files.len();
                if outputs > 1 && outputs != self.input_files.len() {
                    return invalid(format!(
                        "Unable to map {} input files onto {} output files (use zero, one or one per input)",
                        self.input_files.len(),
                        outputs
                    ));
                }
            }
        }

        for rule in &self.keep {
            DropKeepRule::parse(rule)?;
        }

        let mut names = HashSet::new();
        for module in &self.sequence {
            if module.instance_name.is_empty() {
                return invalid(format!(
                    "Module of class '{}' has an empty instance name",
                    module.class_name
                ));
            }
            if !names.insert(module.instance_name.as_str()) {
                return invalid(format!(
                    "Instance name '{}' is used more than once",
                    module.instance_name
                ));
            }
        }

        let mut objects = HashSet::new();
        for provider in &self.conditions_providers {
            if !objects.insert(provider.object_name.as_str()) {
                return Err(FrameworkError::DuplicateConditionsProvider(
                    provider.object_name.clone(),
                ));
            }
        }

        Ok(())
    }
}
