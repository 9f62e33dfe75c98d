// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The default loader for modules packaged as a native shared library.
//!
//! By convention the library exports one symbol, `linkgate_module_vtable`,
//! a C function returning a table of five function pointers implementing
//! the module contract (parse_config, free_config, create, destroy,
//! receive) plus an optional sixth (start). Everything past symbol
//! resolution and the vtable calls themselves stays inside this module;
//! callers only ever see the safe [`crate::LoaderApi`] surface.

use crate::api::LoaderApi;
use crate::error::LoaderError;
use libloading::{Library, Symbol};
use linkgate_broker::{Message, ModuleApi};
use std::ffi::c_void;
use std::os::raw::c_char;
use std::sync::Arc;

const DEFAULT_SYMBOL: &str = "linkgate_module_vtable";

/// The C ABI every native module library must export, by convention,
/// from a single function named [`DEFAULT_SYMBOL`] (or an override
/// given in the entrypoint's `"symbol"` field).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct LinkgateModuleVtable {
    pub parse_config: unsafe extern "C" fn(*const c_char, usize) -> *mut c_void,
    pub free_config: unsafe extern "C" fn(*mut c_void),
    pub create: unsafe extern "C" fn(*mut c_void) -> *mut c_void,
    pub destroy: unsafe extern "C" fn(*mut c_void),
    pub receive: unsafe extern "C" fn(*mut c_void, *const u8, usize),
    pub start: Option<unsafe extern "C" fn(*mut c_void)>,
}

type VtableFn = unsafe extern "C" fn() -> LinkgateModuleVtable;

/// A live instance of a module loaded from a native shared library.
///
/// Holds the `Library` for as long as the instance is alive: dropping
/// this struct destroys the module instance through the vtable first,
/// then unloads the library, in that order.
struct NativeModule {
    instance: *mut c_void,
    vtable: LinkgateModuleVtable,
    // Keeping the library alive is load-bearing: the vtable's function
    // pointers point into its mapped memory.
    _library: Library,
}

// The vtable functions are required by contract to be safe to call from
// any thread as long as calls on a given `instance` are not reentrant
// with `destroy`; the broker never calls `receive` concurrently with
// itself or with teardown, so this holds for our call pattern.
unsafe impl Send for NativeModule {}
unsafe impl Sync for NativeModule {}

impl ModuleApi for NativeModule {
    fn receive(&self, message: Message) {
        let encoded = message.encode();
        unsafe {
            (self.vtable.receive)(self.instance, encoded.as_ptr(), encoded.len());
        }
    }

    fn start(&self) {
        if let Some(start_fn) = self.vtable.start {
            unsafe {
                start_fn(self.instance);
            }
        }
    }
}

impl Drop for NativeModule {
    fn drop(&mut self) {
        unsafe {
            (self.vtable.destroy)(self.instance);
        }
    }
}

/// Loader for modules packaged as a native `.so`/`.dylib`/`.dll`.
#[derive(Default)]
pub struct NativeLoader;

impl NativeLoader {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl LoaderApi for NativeLoader {
    fn build_module(
        &self,
        entrypoint: &serde_json::Value,
        config: &str,
    ) -> Result<Arc<dyn ModuleApi>, LoaderError> {
        let path = entrypoint
            .get("module.path")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                LoaderError::MalformedEntrypoint("missing \"module.path\" field".to_string())
            })?;
        let symbol = entrypoint
            .get("symbol")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(DEFAULT_SYMBOL);

        // SAFETY: loading a dynamic library always carries the risk that
        // it runs arbitrary code at load time; this is the documented,
        // unavoidable cost of the native loader and is why only this one
        // loader is implemented as concrete, trusted code (see crate docs).
        let library = unsafe { Library::new(path) }.map_err(|source| LoaderError::LibraryOpen {
            path: path.to_string(),
            source,
        })?;

        // SAFETY: we immediately call the resolved function and copy its
        // (Copy) return value out; no borrow of `library` escapes this
        // block beyond what `vtable_fn` needs for the single call below.
        let vtable = unsafe {
            let vtable_fn: Symbol<VtableFn> =
                library
                    .get(symbol.as_bytes())
                    .map_err(|source| LoaderError::MissingSymbol {
                        path: path.to_string(),
                        symbol: symbol.to_string(),
                        source,
                    })?;
            vtable_fn()
        };

        let config_bytes = config.as_bytes();
        // SAFETY: `parse_config`/`free_config` are called as a matched
        // pair with no other code observing the intermediate pointer.
        let instance = unsafe {
            let parsed = (vtable.parse_config)(config_bytes.as_ptr() as *const c_char, config_bytes.len());
            let instance = (vtable.create)(parsed);
            (vtable.free_config)(parsed);
            instance
        };

        if instance.is_null() {
            return Err(LoaderError::CreateFailed);
        }

        Ok(Arc::new(NativeModule {
            instance,
            vtable,
            _library: library,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_module_path_is_malformed_entrypoint() -> Result<(), String> {
        let loader = NativeLoader::new();
        let entrypoint = serde_json::json!({});
        match loader.build_module(&entrypoint, "{}") {
            Err(LoaderError::MalformedEntrypoint(_)) => Ok(()),
            Err(other) => Err(format!("expected MalformedEntrypoint, got {other:?}")),
            Ok(_) => Err("expected an error, got Ok".to_string()),
        }
    }

    #[test]
    fn nonexistent_library_path_is_library_open_error() -> Result<(), String> {
        let loader = NativeLoader::new();
        let entrypoint = serde_json::json!({ "module.path": "/nonexistent/path/to/module.so" });
        match loader.build_module(&entrypoint, "{}") {
            Err(LoaderError::LibraryOpen { .. }) => Ok(()),
            Err(other) => Err(format!("expected LibraryOpen, got {other:?}")),
            Ok(_) => Err("expected an error, got Ok".to_string()),
        }
    }
}
