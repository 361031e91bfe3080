//! Branch-level drop/keep/ignore rules for event files.
//!
//! Rules have the form `{keep|drop|ignore} <pattern>`. Patterns are
//! wildcards (see [`glob::Pattern`]), not regular expressions; a pattern
//! that does not end in `*` matches as a prefix. Later rules override
//! earlier ones for any branch they both match.

use std::fmt;

use glob::Pattern;

use crate::domain::EventHeader;

use super::error::FrameworkError;

/// What a rule does to the branches it matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    /// Read from input and write to output
    Keep,

    /// Read from input but do not write
    Drop,

    /// Do not even read from input
    Ignore,
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Keep => "keep",
            Self::Drop => "drop",
            Self::Ignore => "ignore",
        };
        f.write_str(s)
    }
}

/// A single parsed rule
#[derive(Debug, Clone)]
pub struct DropKeepRule {
    pub action: RuleAction,
    pub pattern: Pattern,
}

impl DropKeepRule {
    /// Parse a rule string
    pub fn parse(rule: &str) -> Result<Self, FrameworkError> {
        let malformed = |reason: &str| FrameworkError::MalformedRule {
            rule: rule.to_string(),
            reason: reason.to_string(),
        };

        // keywords are searched anywhere in the rule, so a pattern that
        // contains one (`keep dropoutHits`) is rejected as ambiguous
        let mut found = Vec::new();
        for (keyword, action) in [
            ("keep", RuleAction::Keep),
            ("drop", RuleAction::Drop),
            ("ignore", RuleAction::Ignore),
        ] {
            if let Some(i) = rule.find(keyword) {
                found.push((i + keyword.len(), action));
            }
        }

        let (offset, action) = match found.as_slice() {
            [single] => *single,
            [] => return Err(malformed("expected one of keep, drop or ignore")),
            _ => return Err(malformed("more than one of keep, drop or ignore")),
        };

        let mut pattern: String = rule[offset..]
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if pattern.is_empty() {
            return Err(malformed("no branch pattern given"));
        }
        if !pattern.ends_with('*') {
            pattern.push('*');
        }

        let pattern = Pattern::new(&pattern).map_err(|e| malformed(&e.to_string()))?;
        Ok(Self { action, pattern })
    }

    pub fn matches(&self, branch: &str) -> bool {
        self.pattern.matches(branch)
    }
}

/// Ordered set of rules attached to one event file
#[derive(Debug, Clone, Default)]
pub struct DropKeepRules {
    rules: Vec<DropKeepRule>,
}

impl DropKeepRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and append a rule
    pub fn add(&mut self, rule: &str) -> Result<(), FrameworkError> {
        self.rules.push(DropKeepRule::parse(rule)?);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Action of the last rule matching the branch
    pub fn decide(&self, branch: &str) -> Option<RuleAction> {
        if branch == EventHeader::BRANCH {
            return None;
        }
        self.rules
            .iter()
            .rev()
            .find(|r| r.matches(branch))
            .map(|r| r.action)
    }

    /// Should this branch be read from the input?
    pub fn should_read(&self, branch: &str) -> bool {
        !matches!(self.decide(branch), Some(RuleAction::Ignore))
    }

    /// Should a product read from the input be written out?
    pub fn should_write_input(&self, branch: &str) -> bool {
        matches!(self.decide(branch), None | Some(RuleAction::Keep))
    }

    /// Should a product added during this pass be written out?
    ///
    /// Only `drop` suppresses new products; `ignore` concerns reading.
    pub fn should_write_new(&self, branch: &str) -> bool {
        !matches!(self.decide(branch), Some(RuleAction::Drop))
    }
}
