//! The event bus.
//!
//! A single `Event` is reused for the whole process. It holds the header of
//! the current event, the products read from the current input entry and
//! the products added by producers during this pass. Products are stored
//! serialized so that the bus does not care what types modules exchange;
//! typed access goes through serde.

use std::collections::BTreeMap;

use glob::Pattern;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::domain::{branch_name, EventHeader, ProductTag};

use super::drop_keep::DropKeepRules;
use super::error::FrameworkError;

/// One serialized event entry, keyed by branch name
pub type EventEntry = BTreeMap<String, Value>;

/// Per-event bag of named products
#[derive(Debug)]
pub struct Event {
    /// Pass name given to products added to this event
    pass_name: String,

    /// Header of the current event
    header: EventHeader,

    /// Every product seen so far in the current file
    products: Vec<ProductTag>,

    /// Products read from the input for this event
    input: EventEntry,

    /// Products added during this pass for this event
    added: EventEntry,
}

impl Event {
    pub fn new(pass_name: impl Into<String>) -> Self {
        Self {
            pass_name: pass_name.into(),
            header: EventHeader::default(),
            products: Vec::new(),
            input: EventEntry::new(),
            added: EventEntry::new(),
        }
    }

    pub fn pass_name(&self) -> &str {
        &self.pass_name
    }

    pub fn header(&self) -> &EventHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut EventHeader {
        &mut self.header
    }

    pub fn event_number(&self) -> i32 {
        self.header.event_number
    }

    /// Add a product under `name` for the current pass
    ///
    /// Each name may be written once per event. Names must not contain an
    /// underscore since it separates the name from the pass in branch names.
    pub fn add<T: Serialize>(&mut self, name: &str, product: &T) -> Result<(), FrameworkError> {
        if name.contains('_') {
            return Err(FrameworkError::IllegalProductName(name.to_string()));
        }

        let branch = branch_name(name, &self.pass_name);
        if self.added.contains_key(&branch) || self.input.contains_key(&branch) {
            return Err(FrameworkError::ProductExists {
                name: name.to_string(),
                pass: self.pass_name.clone(),
            });
        }

        let value = serde_json::to_value(product).map_err(|e| FrameworkError::ProductType {
            branch: branch.clone(),
            reason: e.to_string(),
        })?;

        let tag = ProductTag::new(name, self.pass_name.as_str(), std::any::type_name::<T>());
        if !self.products.iter().any(|p| p.branch() == branch) {
            self.products.push(tag);
        }
        self.added.insert(branch, value);
        Ok(())
    }

    /// Get a product by name and pass
    ///
    /// An empty pass selects the only product with this name; it is an
    /// error if several passes provide one.
    pub fn get<T: DeserializeOwned>(&self, name: &str, pass: &str) -> Result<T, FrameworkError> {
        let branch = self.resolve(name, pass)?;
        let value = self
            .added
            .get(&branch)
            .or_else(|| self.input.get(&branch))
            .ok_or_else(|| FrameworkError::ProductNotFound {
                name: name.to_string(),
                pass: pass.to_string(),
            })?;

        T::deserialize(value).map_err(|e| FrameworkError::ProductType {
            branch,
            reason: e.to_string(),
        })
    }

    /// Check whether the current event has a product
    pub fn exists(&self, name: &str, pass: &str) -> bool {
        self.resolve(name, pass).is_ok()
    }

    /// All products known in the current file
    pub fn products(&self) -> &[ProductTag] {
        &self.products
    }

    /// Search the known products with wildcard patterns
    ///
    /// An empty pattern matches anything.
    pub fn search_products(
        &self,
        name: &str,
        pass: &str,
        type_name: &str,
    ) -> Result<Vec<ProductTag>, FrameworkError> {
        let name = compile(name)?;
        let pass = compile(pass)?;
        let type_name = compile(type_name)?;

        Ok(self
            .products
            .iter()
            .filter(|p| {
                name.matches(&p.name) && pass.matches(&p.pass) && type_name.matches(&p.type_name)
            })
            .cloned()
            .collect())
    }

    /// Tag of a known product by branch name
    pub(crate) fn tag(&self, branch: &str) -> Option<&ProductTag> {
        self.products.iter().find(|p| p.branch() == branch)
    }

    /// Register products declared by a newly opened input file
    pub(crate) fn register_products<'a>(&mut self, tags: impl IntoIterator<Item = &'a ProductTag>) {
        for tag in tags {
            if tag.name == EventHeader::BRANCH {
                continue;
            }
            if !self.products.iter().any(|p| p.branch() == tag.branch()) {
                self.products.push(tag.clone());
            }
        }
    }

    /// Replace the current contents with an entry read from a file
    pub(crate) fn load_entry(&mut self, mut entry: EventEntry) -> Result<(), FrameworkError> {
        self.added.clear();
        if let Some(header) = entry.remove(EventHeader::BRANCH) {
            self.header =
                serde_json::from_value(header).map_err(|e| FrameworkError::ProductType {
                    branch: EventHeader::BRANCH.to_string(),
                    reason: e.to_string(),
                })?;
        }
        self.input = entry;
        Ok(())
    }

    /// Forget products added during an attempt that did not complete
    pub(crate) fn discard_added(&mut self) {
        self.added.clear();
    }

    /// Drop the contents of the current event
    pub(crate) fn clear(&mut self) {
        self.input.clear();
        self.added.clear();
    }

    /// Reset everything tied to the file that just finished
    pub(crate) fn on_end_of_file(&mut self) {
        self.clear();
        self.products.clear();
    }

    /// Build the entry to write out, honouring the drop rules
    ///
    /// The header is always written.
    pub(crate) fn output_entry(&self, rules: &DropKeepRules) -> Result<EventEntry, FrameworkError> {
        let mut entry = EventEntry::new();
        let header = serde_json::to_value(&self.header).map_err(|e| FrameworkError::ProductType {
            branch: EventHeader::BRANCH.to_string(),
            reason: e.to_string(),
        })?;
        entry.insert(EventHeader::BRANCH.to_string(), header);

        for (branch, value) in &self.input {
            if rules.should_write_input(branch) {
                entry.insert(branch.clone(), value.clone());
            }
        }
        for (branch, value) in &self.added {
            if rules.should_write_new(branch) {
                entry.insert(branch.clone(), value.clone());
            }
        }
        Ok(entry)
    }

    /// Branch name of a present product
    fn resolve(&self, name: &str, pass: &str) -> Result<String, FrameworkError> {
        if !pass.is_empty() {
            let branch = branch_name(name, pass);
            return if self.added.contains_key(&branch) || self.input.contains_key(&branch) {
                Ok(branch)
            } else {
                Err(FrameworkError::ProductNotFound {
                    name: name.to_string(),
                    pass: pass.to_string(),
                })
            };
        }

        let prefix = format!("{}_", name);
        let candidates: Vec<&String> = self
            .added
            .keys()
            .chain(self.input.keys())
            // names never contain '_', so the prefix alone pins the name
            .filter(|b| b.starts_with(&prefix))
            .collect();

        match candidates.as_slice() {
            [branch] => Ok((*branch).clone()),
            [] => Err(FrameworkError::ProductNotFound {
                name: name.to_string(),
                pass: String::new(),
            }),
            many => Err(FrameworkError::AmbiguousProduct {
                name: name.to_string(),
                count: many.len(),
            }),
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
