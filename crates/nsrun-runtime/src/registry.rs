//! In-memory directory of namespace descriptors.
//!
//! Keeps descriptors in insertion order, keyed by their unique name. The
//! registry owns no kernel resources; removing an entry only releases
//! memory.

use std::collections::HashMap;

use nsrun_common::error::{NsrunError, Result};
use nsrun_core::namespace::NamespaceDescriptor;

/// Insertion-ordered collection of descriptors keyed by name.
#[derive(Debug, Default)]
pub struct ContainerRegistry {
    entries: Vec<NamespaceDescriptor>,
    index: HashMap<String, usize>,
}

impl ContainerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if a descriptor with the same name is present.
    pub fn add(&mut self, descriptor: NamespaceDescriptor) -> Result<()> {
        if self.index.contains_key(descriptor.name()) {
            return Err(NsrunError::invalid(format!(
                "namespace '{}' is already registered",
                descriptor.name()
            )));
        }
        let _ = self
            .index
            .insert(descriptor.name().to_string(), self.entries.len());
        tracing::debug!(name = descriptor.name(), "namespace registered");
        self.entries.push(descriptor);
        Ok(())
    }

    /// Looks up a descriptor by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&NamespaceDescriptor> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// Looks up a descriptor by name for modification.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut NamespaceDescriptor> {
        self.index.get(name).map(|&i| &mut self.entries[i])
    }

    /// Removes and returns the descriptor named `name`.
    pub fn remove(&mut self, name: &str) -> Option<NamespaceDescriptor> {
        let position = self.index.remove(name)?;
        let descriptor = self.entries.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        Some(descriptor)
    }

    /// Iterates descriptors in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &NamespaceDescriptor> {
        self.entries.iter()
    }

    /// Returns the number of registered descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
