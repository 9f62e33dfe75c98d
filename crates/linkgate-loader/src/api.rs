// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use crate::error::LoaderError;
use linkgate_broker::{LoaderKind, ModuleApi};
use std::sync::Arc;

/// A named loader capable of turning a JSON entrypoint description plus
/// an opaque serialized config string into a live module instance.
///
/// The original module contract's `parse_entrypoint`/`free_entrypoint`
/// pair collapses here into parsing inline inside `build_module`: Rust's
/// ownership model frees the parsed value automatically once it goes
/// out of scope, so there is nothing left to free explicitly.
pub trait LoaderApi: Send + Sync {
    fn build_module(
        &self,
        entrypoint: &serde_json::Value,
        config: &str,
    ) -> Result<Arc<dyn ModuleApi>, LoaderError>;

    /// Releases any process-wide resources the loader holds. Most
    /// loaders (including the native one) have nothing to release here;
    /// opened libraries are owned per-module and drop with their module.
    fn cleanup(&self) {}

    /// Whether modules built by this loader live in this process.
    /// The broker only allows a DIRECT link when both endpoints report
    /// `InProcess`. Defaults to `InProcess`, which is correct for the
    /// native loader and any test fake standing in for it.
    fn kind(&self) -> LoaderKind {
        LoaderKind::InProcess
    }
}
