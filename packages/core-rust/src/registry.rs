//! Operation registry: write-once-at-startup table of named operations.
//!
//! Registration happens during startup and may come from several independent
//! collaborators concurrently; after startup the table is read-only, so
//! lookups on the hot path never contend. There is no removal: operations
//! are fixed at process configuration time.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::traits::{JsonPrototype, Operation, OperationPrototype};

/// Startup-fatal registration failure. Callers propagate this and abort
/// before serving; it is never a per-request error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("cannot register an operation without a name")]
    EmptyName,
    #[error("operation {name:?} is already registered")]
    Duplicate { name: String },
}

/// Table mapping an operation name to its prototype.
#[derive(Default)]
pub struct OperationRegistry {
    opers: DashMap<String, Arc<dyn OperationPrototype>>,
}

impl OperationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            opers: DashMap::new(),
        }
    }

    /// Registers a prototype under `name`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::EmptyName`] for an empty name;
    /// [`RegistryError::Duplicate`] when the name is already taken. Exactly
    /// one name maps to exactly one prototype.
    pub fn register(
        &self,
        name: &str,
        prototype: Arc<dyn OperationPrototype>,
    ) -> Result<(), RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        match self.opers.entry(name.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::Duplicate {
                name: name.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(prototype);
                Ok(())
            }
        }
    }

    /// Registers a [`JsonPrototype`] for a serde-decodable operation struct.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`OperationRegistry::register`].
    pub fn register_json<T>(&self, name: &str) -> Result<(), RegistryError>
    where
        T: Operation + serde::de::DeserializeOwned + Default + 'static,
    {
        self.register(name, Arc::new(JsonPrototype::<T>::new()))
    }

    /// Looks up the prototype registered under `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn OperationPrototype>> {
        self.opers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.opers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.opers.is_empty()
    }

    /// Names of all registered operations, in no particular order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.opers.iter().map(|entry| entry.key().clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
