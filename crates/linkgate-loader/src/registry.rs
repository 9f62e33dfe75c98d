// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use crate::api::LoaderApi;
use crate::error::LoaderError;
use crate::native::NativeLoader;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// The name the native dynamic-library loader is registered under, and
/// the default used for a module declaration whose `loader.name` is
/// omitted.
pub const NATIVE_LOADER_NAME: &str = "native";

/// A single declared loader from a gateway declaration's `"loaders"` array.
#[derive(Debug, Clone)]
pub struct LoaderDeclaration {
    pub name: String,
    pub loader_type: String,
}

/// Process-lifetime, orchestrator-owned registry of named loaders.
///
/// Mutation is expected to happen only during gateway construction,
/// before any module exists; nothing here prevents a racing mutation
/// once modules are live, but the orchestrator never triggers one.
pub struct LoaderRegistry {
    loaders: Mutex<HashMap<String, Arc<dyn LoaderApi>>>,
}

impl LoaderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            loaders: Mutex::new(HashMap::new()),
        }
    }

    /// Installs the built-in native loader under [`NATIVE_LOADER_NAME`].
    pub fn initialize_defaults(&self) {
        self.register(NATIVE_LOADER_NAME, Arc::new(NativeLoader::new()));
    }

    /// Registers or overwrites a loader under `name`. Used both for the
    /// native loader during `initialize_defaults` and by callers (tests,
    /// and future out-of-process loader integrations) to install a
    /// loader under a declared name before [`Self::initialize_from_manifest`] runs.
    pub fn register(&self, name: impl Into<String>, loader: Arc<dyn LoaderApi>) {
        let name = name.into();
        tracing::info!(loader = %name, "loader registered");
        self.loaders.lock().insert(name, loader);
    }

    /// Applies user-declared loaders from a gateway declaration.
    ///
    /// Declarations of type `"native"` are a no-op (the default loader
    /// is already installed). Declarations of any other type name a
    /// loader this crate does not ship a concrete implementation for;
    /// per the out-of-process loader contract, callers register a fake
    /// or a real integration under that name via [`Self::register`]
    /// before calling this, and this only logs if none was found.
    pub fn initialize_from_manifest(&self, declarations: &[LoaderDeclaration]) {
        for decl in declarations {
            if decl.loader_type == NATIVE_LOADER_NAME {
                continue;
            }
            if !self.loaders.lock().contains_key(&decl.name) {
                tracing::warn!(
                    loader = %decl.name,
                    loader_type = %decl.loader_type,
                    "declared loader has no concrete implementation registered"
                );
            }
        }
    }

    pub fn find_by_name(&self, name: &str) -> Result<Arc<dyn LoaderApi>, LoaderError> {
        self.loaders
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| LoaderError::NotFound(name.to_string()))
    }

    /// Releases every registered loader, calling each one's `cleanup`.
    pub fn destroy(&self) {
        let mut loaders = self.loaders.lock();
        for (name, loader) in loaders.drain() {
            tracing::info!(loader = %name, "loader destroyed");
            loader.cleanup();
        }
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_resolves_native_loader() -> Result<(), String> {
        let registry = LoaderRegistry::new();
        registry.initialize_defaults();
        registry
            .find_by_name(NATIVE_LOADER_NAME)
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    #[test]
    fn unknown_loader_name_is_not_found() -> Result<(), String> {
        let registry = LoaderRegistry::new();
        registry.initialize_defaults();
        match registry.find_by_name("nonexistent") {
            Err(LoaderError::NotFound(name)) if name == "nonexistent" => Ok(()),
            other => Err(format!("expected NotFound, got {}", other.is_ok())),
        }
    }

    #[test]
    fn destroy_clears_all_loaders() -> Result<(), String> {
        let registry = LoaderRegistry::new();
        registry.initialize_defaults();
        registry.destroy();
        match registry.find_by_name(NATIVE_LOADER_NAME) {
            Err(LoaderError::NotFound(_)) => Ok(()),
            other => Err(format!("expected NotFound after destroy, got {}", other.is_ok())),
        }
    }
}
