//! Per-event header record.
//!
//! Every event carries exactly one header. It is stored under the reserved
//! branch [`EventHeader::BRANCH`] and is never subject to drop rules.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Run/event identification and generic per-event parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventHeader {
    /// Event number within the run (-1 until assigned)
    pub event_number: i32,

    /// Run number (-1 until assigned)
    pub run: i32,

    /// When the event was produced
    pub timestamp: DateTime<Utc>,

    /// Event weight
    pub weight: f64,

    /// Attempt number of the processing that produced this record
    #[serde(default)]
    pub tries: u32,

    /// True for detector data, false for simulation
    #[serde(default)]
    pub is_real_data: bool,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    int_parameters: BTreeMap<String, i32>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    float_parameters: BTreeMap<String, f32>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    string_parameters: BTreeMap<String, String>,
}

impl Default for EventHeader {
    fn default() -> Self {
        Self {
            event_number: -1,
            run: -1,
            timestamp: DateTime::<Utc>::default(),
            weight: 1.0,
            tries: 0,
            is_real_data: false,
            int_parameters: BTreeMap::new(),
            float_parameters: BTreeMap::new(),
            string_parameters: BTreeMap::new(),
        }
    }
}

impl EventHeader {
    /// Branch name the header is stored under
    pub const BRANCH: &'static str = "EventHeader";

    /// Reset to the default state, dropping all parameters
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn int_parameter(&self, name: &str) -> Option<i32> {
        self.int_parameters.get(name).copied()
    }

    pub fn set_int_parameter(&mut self, name: impl Into<String>, value: i32) {
        self.int_parameters.insert(name.into(), value);
    }

    pub fn float_parameter(&self, name: &str) -> Option<f32> {
        self.float_parameters.get(name).copied()
    }

    pub fn set_float_parameter(&mut self, name: impl Into<String>, value: f32) {
        self.float_parameters.insert(name.into(), value);
    }

    pub fn string_parameter(&self, name: &str) -> Option<&str> {
        self.string_parameters.get(name).map(String::as_str)
    }

    pub fn set_string_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.string_parameters.insert(name.into(), value.into());
    }
}
