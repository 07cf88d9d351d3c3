//! Operation registry.
//!
//! [`OperationRegistry`] is a plain name → operation map. The process-wide registry behind the
//! free functions of this module is created on first use with every built-in operation already
//! registered; user operations can be added at any point before they are applied.

use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use tracing::debug;

use super::operation::Operation;
use crate::error::{ReconError, Result};

static REGISTRY: Lazy<RwLock<OperationRegistry>> =
    Lazy::new(|| RwLock::new(OperationRegistry::with_builtins()));

/// Mapping from unique operation name to operation.
#[derive(Debug, Default)]
pub struct OperationRegistry {
    operations: IndexMap<String, Arc<Operation>>,
}

impl OperationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the `recon.v1.*` built-ins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for op in super::builtin_operations() {
            registry
                .operations
                .entry(op.name().to_string())
                .or_insert_with(|| Arc::new(op));
        }
        registry
    }

    /// Register an operation. Names are unique.
    pub fn register(&mut self, op: Operation) -> Result<Arc<Operation>> {
        if self.operations.contains_key(op.name()) {
            return Err(ReconError::DuplicateOperation(op.name().to_string()));
        }
        debug!(operation = op.name(), kind = ?op.kind(), "registered operation");
        let op = Arc::new(op);
        self.operations.insert(op.name().to_string(), Arc::clone(&op));
        Ok(op)
    }

    pub fn get(&self, name: &str) -> Result<Arc<Operation>> {
        self.operations
            .get(name)
            .cloned()
            .ok_or_else(|| ReconError::OperationNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.operations.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Register an operation in the global registry.
pub fn register(op: Operation) -> Result<Arc<Operation>> {
    REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register(op)
}

/// Look up an operation in the global registry.
pub fn get(name: &str) -> Result<Arc<Operation>> {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(name)
}

pub fn contains(name: &str) -> bool {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(name)
}

pub fn names() -> Vec<String> {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .names()
}
