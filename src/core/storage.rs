//! Event storage control (skimming).
//!
//! Processors vote on whether the current event should be written by
//! registering hints. Only hints from processors (and purposes) matching a
//! listening rule are counted. The decision is taken once all modules have
//! run, then the state is reset for the next attempt.

use glob::Pattern;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::error::FrameworkError;

/// Hint a processor can give about storing the current event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageHint {
    NoOpinion,
    Undefined,
    ShouldKeep,
    MustKeep,
    ShouldDrop,
    MustDrop,
}

/// Listening rule: which processors and purposes count
#[derive(Debug, Clone)]
struct ListeningRule {
    processor: Pattern,
    purpose: Pattern,
}

/// Per-event keep/drop decision
#[derive(Debug, Clone)]
pub struct StorageControl {
    default_keep: bool,
    hints: Vec<StorageHint>,
    rules: Vec<ListeningRule>,
}

impl Default for StorageControl {
    fn default() -> Self {
        Self::new(true)
    }
}

impl StorageControl {
    pub fn new(default_keep: bool) -> Self {
        Self {
            default_keep,
            hints: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn set_default_keep(&mut self, keep: bool) {
        self.default_keep = keep;
    }

    pub fn default_keep(&self) -> bool {
        self.default_keep
    }

    /// Listen to hints from processors matching `processor` with a purpose
    /// matching `purpose`. An empty pattern matches everything.
    pub fn add_rule(&mut self, processor: &str, purpose: &str) -> Result<(), FrameworkError> {
        self.rules.push(ListeningRule {
            processor: compile(processor)?,
            purpose: compile(purpose)?,
        });
        Ok(())
    }

    /// Forget the hints collected for the current event
    pub fn reset_event_state(&mut self) {
        self.hints.clear();
    }

    /// Record a hint if some listening rule matches it
    pub fn add_hint(&mut self, processor_name: &str, hint: StorageHint, purpose: &str) {
        let listened = self
            .rules
            .iter()
            .any(|r| r.processor.matches(processor_name) && r.purpose.matches(purpose));

        if listened {
            trace!(processor = processor_name, ?hint, purpose, "Storage hint recorded");
            self.hints.push(hint);
        }
    }

    /// Decide whether the current event should be stored
    ///
    /// 1. An event that did not complete is never stored.
    /// 2. Any `MustDrop` drops the event.
    /// 3. Any `MustKeep` keeps it.
    /// 4. Otherwise a simple majority of `ShouldKeep` vs `ShouldDrop`.
    /// 5. Ties (including no votes) fall back to the default policy.
    pub fn keep_event(&self, event_completed: bool) -> bool {
        if !event_completed {
            return false;
        }

        if self.hints.contains(&StorageHint::MustDrop) {
            return false;
        }
        if self.hints.contains(&StorageHint::MustKeep) {
            return true;
        }

        let keep_votes = self
            .hints
            .iter()
            .filter(|h| **h == StorageHint::ShouldKeep)
            .count();
        let drop_votes = self
            .hints
            .iter()
            .filter(|h| **h == StorageHint::ShouldDrop)
            .count();

        if keep_votes == drop_votes {
            self.default_keep
        } else {
            keep_votes > drop_votes
        }
    }
}

fn compile(pattern: &str) -> Result<Pattern, FrameworkError> {
    let pattern = if pattern.is_empty() { "*" } else { pattern };
    Pattern::new(pattern).map_err(|e| FrameworkError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}
