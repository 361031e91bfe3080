//! Nested, typed key-value parameters handed to modules.
//!
//! Values are ints, doubles, strings, bools, homogeneous lists of those and
//! nested groups. The framework never interprets them; modules pull what
//! they need with typed getters that go through serde.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ParameterError {
    #[error("Parameter '{0}' not found")]
    NotFound(String),

    #[error("Parameter '{name}' has the wrong type: {reason}")]
    WrongType { name: String, reason: String },
}

/// A group of named parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(Map<String, Value>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a required parameter
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, ParameterError> {
        let value = self
            .0
            .get(name)
            .ok_or_else(|| ParameterError::NotFound(name.to_string()))?;
        convert(name, value)
    }

    /// Get a parameter, falling back to a default when it is absent
    ///
    /// A present value of the wrong type is still an error.
    pub fn get_or<T: DeserializeOwned>(&self, name: &str, default: T) -> Result<T, ParameterError> {
        match self.0.get(name) {
            Some(value) => convert(name, value),
            None => Ok(default),
        }
    }

    /// Get a nested parameter group
    pub fn group(&self, name: &str) -> Result<Parameters, ParameterError> {
        self.get(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Parameters {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn convert<T: DeserializeOwned>(name: &str, value: &Value) -> Result<T, ParameterError> {
    T::deserialize(value).map_err(|e| ParameterError::WrongType {
        name: name.to_string(),
        reason: e.to_string(),
    })
}
