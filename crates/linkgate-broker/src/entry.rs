// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use crate::direct::DirectInbox;
use crate::spec::{LoaderInfo, LoaderKind, ModuleApi};
use crate::ModuleHandle;
use crossbeam::channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;

/// The broker's per-module bookkeeping record.
///
/// Interior fields are locked independently so that `publish` never has
/// to hold the registry lock for longer than a lookup: the wire receive
/// endpoint, the direct outbound list, and the direct inbox each have
/// their own lock, acquired one at a time in the order documented on
/// [`crate::Broker`].
pub(crate) struct ModuleEntry {
    pub(crate) handle: ModuleHandle,
    pub(crate) name: String,
    #[allow(dead_code)] // retained for reconciliation/inspection, not read by the broker itself
    pub(crate) loader_info: LoaderInfo,
    pub(crate) loader_kind: LoaderKind,
    #[allow(dead_code)]
    pub(crate) config: String,
    #[allow(dead_code)]
    pub(crate) version: Option<String>,
    pub(crate) module: Arc<dyn ModuleApi>,
    pub(crate) quit_token: String,

    /// The wire worker's receive endpoint. `None` once closed during
    /// teardown; the worker checks this under the same lock it uses to
    /// block on `recv`.
    pub(crate) wire_rx: Mutex<Option<Receiver<Vec<u8>>>>,
    /// Kept so other modules' `add_link` calls can obtain a fresh
    /// `Sender` clone to register under a new wire subscription.
    pub(crate) wire_tx: Mutex<Option<Sender<Vec<u8>>>>,
    pub(crate) wire_worker: Mutex<Option<JoinHandle<()>>>,

    /// Sinks this module publishes to directly, with their shared inbox.
    pub(crate) direct_outbound: Mutex<Vec<(ModuleHandle, Arc<DirectInbox>)>>,
    /// Present once this module becomes the sink of at least one DIRECT link.
    pub(crate) direct_inbox: Mutex<Option<Arc<DirectInbox>>>,
    pub(crate) direct_worker: Mutex<Option<JoinHandle<()>>>,
}

impl ModuleEntry {
    pub(crate) fn has_direct_outbound(&self) -> bool {
        !self.direct_outbound.lock().is_empty()
    }
}
