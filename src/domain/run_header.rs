//! Run-level metadata.
//!
//! One header exists per run number. Producers may fill it in
//! `before_new_run`; it is written to the output file when that file closes.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifying strings and parameters for a single run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunHeader {
    /// Run number
    pub run_number: i32,

    /// Name of the detector used to create the events
    #[serde(default)]
    pub detector_name: String,

    /// Short description of the run
    #[serde(default)]
    pub description: String,

    /// Version of the software that created the run
    #[serde(default)]
    pub software_tag: String,

    /// When processing of the run started
    pub run_start: Option<DateTime<Utc>>,

    /// When processing of the run ended
    pub run_end: Option<DateTime<Utc>>,

    #[serde(default)]
    int_parameters: BTreeMap<String, i32>,

    #[serde(default)]
    float_parameters: BTreeMap<String, f32>,

    #[serde(default)]
    string_parameters: BTreeMap<String, String>,
}

impl RunHeader {
    /// Create a header for a run, tagged with this crate's version
    pub fn new(run_number: i32) -> Self {
        Self {
            run_number,
            detector_name: String::new(),
            description: String::new(),
            software_tag: env!("CARGO_PKG_VERSION").to_string(),
            run_start: None,
            run_end: None,
            int_parameters: BTreeMap::new(),
            float_parameters: BTreeMap::new(),
            string_parameters: BTreeMap::new(),
        }
    }

    pub fn int_parameter(&self, name: &str) -> Option<i32> {
        self.int_parameters.get(name).copied()
    }

    pub fn int_parameters(&self) -> &BTreeMap<String, i32> {
        &self.int_parameters
    }

    pub fn set_int_parameter(&mut self, name: impl Into<String>, value: i32) {
        self.int_parameters.insert(name.into(), value);
    }

    pub fn float_parameter(&self, name: &str) -> Option<f32> {
        self.float_parameters.get(name).copied()
    }

    pub fn float_parameters(&self) -> &BTreeMap<String, f32> {
        &self.float_parameters
    }

    pub fn set_float_parameter(&mut self, name: impl Into<String>, value: f32) {
        self.float_parameters.insert(name.into(), value);
    }

    pub fn string_parameter(&self, name: &str) -> Option<&str> {
        self.string_parameters.get(name).map(String::as_str)
    }

    pub fn string_parameters(&self) -> &BTreeMap<String, String> {
        &self.string_parameters
    }

    pub fn set_string_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.string_parameters.insert(name.into(), value.into());
    }
}

impl fmt::Display for RunHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {}", self.run_number)?;
        writeln!(f, "  Detector: {}", self.detector_name)?;
        writeln!(f, "  Description: {}", self.description)?;
        writeln!(f, "  Software tag: {}", self.software_tag)?;
        if let Some(start) = self.run_start {
            writeln!(f, "  Start: {}", start.to_rfc3339())?;
        }
        if let Some(end) = self.run_end {
            writeln!(f, "  End: {}", end.to_rfc3339())?;
        }
        for (name, value) in &self.int_parameters {
            writeln!(f, "  {} = {}", name, value)?;
        }
        for (name, value) in &self.float_parameters {
            writeln!(f, "  {} = {}", name, value)?;
        }
        for (name, value) in &self.string_parameters {
            writeln!(f, "  {} = {}", name, value)?;
        }
        Ok(())
    }
}
