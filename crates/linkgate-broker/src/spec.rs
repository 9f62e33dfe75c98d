// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Module contract and the spec the orchestrator hands to [`crate::Broker::add_module`].

use linkgate_message::Message;
use std::sync::Arc;

/// Whether a module instance lives in this process or was instantiated
/// by an out-of-process loader. Only `InProcess` modules are eligible
/// endpoints for a DIRECT link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderKind {
    InProcess,
    OutOfProcess,
}

/// Identifies the loader that produced a module, for bookkeeping and
/// reconciliation. The entrypoint is loader-specific structured data
/// (for the native loader, a library path and symbol name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderInfo {
    pub loader_name: String,
    pub entrypoint: serde_json::Value,
}

/// The receive/lifecycle contract every module implements.
///
/// `create`/`destroy` from the original module contract map onto Rust
/// construction and `Drop`: a loader builds the `Arc<dyn ModuleApi>`
/// (which is the "create" step) and the broker simply drops its
/// reference during `remove_module`, running whatever `Drop` impl the
/// concrete module type provides.
pub trait ModuleApi: Send + Sync {
    /// Invoked once per delivered message, outside any broker lock.
    fn receive(&self, message: Message);

    /// Invoked by the gateway orchestrator's `start()`. Most modules
    /// have no startup behavior and accept the default no-op.
    fn start(&self) {}
}

/// Everything the broker needs to register a module.
pub struct ModuleSpec {
    pub name: String,
    pub loader_info: LoaderInfo,
    pub loader_kind: LoaderKind,
    /// Opaque serialized configuration, as handed to the loader's
    /// `parse_config`. Kept for reconciliation bookkeeping.
    pub config: String,
    pub version: Option<String>,
    pub module: Arc<dyn ModuleApi>,
}
