//! Backend registry.
//!
//! Maps backend names to [`BackendFactory`] instances. A process-wide
//! registry is available through [`global`] and the free functions below;
//! isolated registries can be created with [`BackendRegistry::new`].
//!
//! Registration is an init-time operation: backends are registered by
//! explicit calls at startup (see [`register_builtin_backends`]), after
//! which the table is only read. Registering a name twice replaces the
//! earlier factory, which lets tests override a backend.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use ragstore_core::{Error, Result};

use crate::backend::BackendFactory;

/// Name-to-factory table.
#[derive(Default)]
pub struct BackendRegistry {
    factories: RwLock<HashMap<String, Arc<dyn BackendFactory>>>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`, replacing any earlier one.
    pub fn register(&self, name: impl Into<String>, factory: Arc<dyn BackendFactory>) {
        let name = name.into();
        if self.factories.write().insert(name.clone(), factory).is_some() {
            log::warn!("backend '{name}' was already registered; replacing it");
        } else {
            log::debug!("registered backend '{name}'");
        }
    }

    /// Remove a registration. Returns true if `name` was registered.
    pub fn unregister(&self, name: &str) -> bool {
        self.factories.write().remove(name).is_some()
    }

    /// Look up a factory by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn BackendFactory>> {
        let factories = self.factories.read();
        factories.get(name).cloned().ok_or_else(|| {
            let mut known: Vec<&str> = factories.keys().map(String::as_str).collect();
            known.sort_unstable();
            Error::not_found(format!(
                "backend '{name}' is not registered (known: [{}])",
                known.join(", ")
            ))
        })
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    /// All registered names, sorted.
    pub fn list_all(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Number of registered backends.
    pub fn len(&self) -> usize {
        self.factories.read().len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.read().is_empty()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.list_all())
            .finish()
    }
}

// ============================================================================
// Process-wide registry
// ============================================================================

static GLOBAL: LazyLock<BackendRegistry> = LazyLock::new(BackendRegistry::new);

/// The process-wide registry.
pub fn global() -> &'static BackendRegistry {
    &GLOBAL
}

/// Register a backend in the process-wide registry.
pub fn register_backend(name: impl Into<String>, factory: Arc<dyn BackendFactory>) {
    global().register(name, factory);
}

/// Look up a backend in the process-wide registry.
pub fn get_backend(name: &str) -> Result<Arc<dyn BackendFactory>> {
    global().get(name)
}

/// Names registered in the process-wide registry.
pub fn get_registered_backends() -> Vec<String> {
    global().list_all()
}

/// Register the backends shipped with this crate in `registry`.
pub fn register_builtin_backends(registry: &BackendRegistry) {
    registry.register(crate::flat::BACKEND_NAME, Arc::new(crate::flat::FlatFactory));

    #[cfg(feature = "vector-lancedb")]
    registry.register(
        crate::lancedb::BACKEND_NAME,
        Arc::new(crate::lancedb::LancedbFactory),
    );
}

// ============================================================================
// Tests
// ============================================================================
