//! Identification of event data products.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::event_header::EventHeader;

/// Name, pass and type of a product on the event bus
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductTag {
    pub name: String,
    pub pass: String,
    pub type_name: String,
}

impl ProductTag {
    pub fn new(
        name: impl Into<String>,
        pass: impl Into<String>,
        type_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            pass: pass.into(),
            type_name: type_name.into(),
        }
    }

    /// Recover the tag from a stored branch name
    ///
    /// Branches are named `<name>_<pass>`; the event header is the only
    /// branch without a pass.
    pub fn from_branch(branch: &str, type_name: impl Into<String>) -> Self {
        if branch == EventHeader::BRANCH {
            return Self::new(branch, "", type_name);
        }
        match branch.split_once('_') {
            Some((name, pass)) => Self::new(name, pass, type_name),
            None => Self::new(branch, "", type_name),
        }
    }

    /// Branch name this product is stored under
    pub fn branch(&self) -> String {
        branch_name(&self.name, &self.pass)
    }
}

impl fmt::Display for ProductTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{} ({})", self.name, self.pass, self.type_name)
    }
}

/// Build the branch name for a product name and pass
pub fn branch_name(name: &str, pass: &str) -> String {
    if pass.is_empty() {
        name.to_string()
    } else {
        format!("{}_{}", name, pass)
    }
}
