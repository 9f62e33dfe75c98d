// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use crate::direct::DirectInbox;
use crate::entry::ModuleEntry;
use crate::error::BrokerError;
use crate::link::{Link, LinkMode};
use crate::spec::{LoaderKind, ModuleSpec};
use crate::wire_bus::WireBus;
use crate::worker::{direct_worker_loop, encode_wire_frame, wire_worker_loop};
use crate::ModuleHandle;
use crossbeam::channel::unbounded;
use linkgate_message::Message;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Default)]
struct Registry {
    entries: HashMap<ModuleHandle, Arc<ModuleEntry>>,
    order: Vec<ModuleHandle>,
    next_id: u64,
}

impl Registry {
    fn allocate_handle(&mut self) -> ModuleHandle {
        self.next_id += 1;
        ModuleHandle(self.next_id)
    }
}

struct BrokerInner {
    id: Uuid,
    wire_url: String,
    wire_bus: WireBus,
    registry: Mutex<Registry>,
}

impl Drop for BrokerInner {
    fn drop(&mut self) {
        let registry = self.registry.lock();
        if !registry.entries.is_empty() {
            tracing::warn!(
                broker = %self.id,
                remaining = registry.entries.len(),
                "broker dropped with modules still registered"
            );
        }
        tracing::info!(broker = %self.id, url = %self.wire_url, "broker destroyed");
    }
}

/// The publish/subscribe dispatcher that owns module lifecycles and
/// routing topology. Cheap to clone: internally a reference-counted
/// handle, so `inc_ref`/`dec_ref` are just `Clone`/`Drop` under the
/// hood, as the shared-ownership primitive this design uses in place
/// of hand-rolled atomic counting.
#[derive(Clone)]
pub struct Broker(Arc<BrokerInner>);

impl Broker {
    /// Allocates a broker with a fresh, process-unique wire URL.
    pub fn create() -> Result<Self, BrokerError> {
        let id = Uuid::new_v4();
        let wire_url = format!("inproc://{id}");
        tracing::info!(broker = %id, url = %wire_url, "broker created");
        Ok(Self(Arc::new(BrokerInner {
            id,
            wire_url,
            wire_bus: WireBus::new(),
            registry: Mutex::new(Registry::default()),
        })))
    }

    /// Returns a new reference to the same broker. Named for parity
    /// with the documented external interface; internally a cheap
    /// `Arc` clone.
    #[must_use]
    pub fn inc_ref(&self) -> Self {
        self.clone()
    }

    /// Releases one reference. Named for parity with the documented
    /// external interface; internally a drop of this handle's `Arc`.
    pub fn dec_ref(self) {
        drop(self);
    }

    #[must_use]
    pub fn wire_url(&self) -> &str {
        &self.0.wire_url
    }

    /// Registers a module, spawns its wire worker, and returns its handle.
    pub fn add_module(&self, spec: ModuleSpec) -> Result<ModuleHandle, BrokerError> {
        let quit_token = Uuid::new_v4().to_string();
        debug_assert_eq!(quit_token.len(), 36, "quit token must be 36 characters");

        let (tx, rx) = unbounded::<Vec<u8>>();

        let mut registry = self.0.registry.lock();
        let handle = registry.allocate_handle();

        let entry = Arc::new(ModuleEntry {
            handle,
            name: spec.name,
            loader_info: spec.loader_info,
            loader_kind: spec.loader_kind,
            config: spec.config,
            version: spec.version,
            module: spec.module,
            quit_token: quit_token.clone(),
            wire_rx: Mutex::new(Some(rx)),
            wire_tx: Mutex::new(Some(tx.clone())),
            wire_worker: Mutex::new(None),
            direct_outbound: Mutex::new(Vec::new()),
            direct_inbox: Mutex::new(None),
            direct_worker: Mutex::new(None),
        });

        registry.entries.insert(handle, entry.clone());
        registry.order.push(handle);
        drop(registry);

        self.0
            .wire_bus
            .subscribe(quit_token.into_bytes(), handle, tx);

        let worker_entry = entry.clone();
        let join = std::thread::Builder::new()
            .name(format!("linkgate-wire-{handle}"))
            .spawn(move || wire_worker_loop(worker_entry))
            .map_err(|e| BrokerError::PlatformError(e.to_string()))?;
        *entry.wire_worker.lock() = Some(join);

        tracing::info!(module = %handle, name = %entry.name, "module added");
        Ok(handle)
    }

    /// Removes a module: wakes and joins its wire worker (and direct
    /// worker, if any), then drops its entry from the registry.
    pub fn remove_module(&self, handle: ModuleHandle) -> Result<(), BrokerError> {
        let entry = {
            let mut registry = self.0.registry.lock();
            let Some(entry) = registry.entries.remove(&handle) else {
                return Err(BrokerError::NotFound);
            };
            registry.order.retain(|h| *h != handle);
            entry
        };

        // Primary wake: deliver the quit frame to the module's own subscription.
        self.0
            .wire_bus
            .publish(entry.quit_token.as_bytes(), entry.quit_token.as_bytes());
        // Fallback: unconditionally drop every sender registered for this
        // module, disconnecting its channel even if the quit frame above
        // never reached a live subscription.
        self.0.wire_bus.unsubscribe_all(handle);
        *entry.wire_rx.lock() = None;

        if let Some(join) = entry.wire_worker.lock().take() {
            let _ = join.join();
        }

        if let Some(inbox) = entry.direct_inbox.lock().take() {
            inbox.stop();
            if let Some(join) = entry.direct_worker.lock().take() {
                let _ = join.join();
            }
        }

        // Drop this module as a destination of anyone else's direct links.
        for other in self.0.registry.lock().entries.values() {
            other.direct_outbound.lock().retain(|(sink, _)| *sink != handle);
        }

        tracing::info!(module = %handle, name = %entry.name, "module removed");
        Ok(())
    }

    /// Invokes a module's optional `start` hook. Used by the gateway
    /// orchestrator once every module and link from a declaration has
    /// been added.
    pub fn start_module(&self, handle: ModuleHandle) -> Result<(), BrokerError> {
        let entry = {
            let registry = self.0.registry.lock();
            registry.entries.get(&handle).cloned().ok_or(BrokerError::NotFound)?
        };
        entry.module.start();
        Ok(())
    }

    /// Adds a link between two registered modules.
    pub fn add_link(&self, link: Link) -> Result<(), BrokerError> {
        let source = link.source;
        let sink = link.sink;
        self.add_link_inner(link).map_err(|cause| BrokerError::AddLinkError {
            source,
            sink,
            cause: Box::new(cause),
        })
    }

    fn add_link_inner(&self, link: Link) -> Result<(), BrokerError> {
        if link.source == link.sink {
            return Err(BrokerError::InvalidArg(
                "a module cannot link to itself".to_string(),
            ));
        }

        let registry = self.0.registry.lock();
        let source = registry
            .entries
            .get(&link.source)
            .cloned()
            .ok_or(BrokerError::NotFound)?;
        let sink = registry
            .entries
            .get(&link.sink)
            .cloned()
            .ok_or(BrokerError::NotFound)?;
        drop(registry);

        match link.mode {
            LinkMode::Wire => {
                let sink_sender = sink_sender_for(&sink)?;
                self.0
                    .wire_bus
                    .subscribe(link.source.topic_bytes(), link.sink, sink_sender);
            }
            LinkMode::Direct => {
                if source.loader_kind != LoaderKind::InProcess
                    || sink.loader_kind != LoaderKind::InProcess
                {
                    return Err(BrokerError::InvalidArg(
                        "DIRECT links require both endpoints to be in-process".to_string(),
                    ));
                }

                let inbox = {
                    let mut slot = sink.direct_inbox.lock();
                    if let Some(existing) = slot.as_ref() {
                        existing.clone()
                    } else {
                        let inbox = Arc::new(DirectInbox::new());
                        *slot = Some(inbox.clone());
                        let worker_module = sink.module.clone();
                        let worker_inbox = inbox.clone();
                        let join = std::thread::Builder::new()
                            .name(format!("linkgate-direct-{}", sink.handle))
                            .spawn(move || direct_worker_loop(worker_module, worker_inbox))
                            .map_err(|e| BrokerError::PlatformError(e.to_string()))?;
                        *sink.direct_worker.lock() = Some(join);
                        inbox
                    }
                };
                inbox.add_source(link.source);
                source
                    .direct_outbound
                    .lock()
                    .push((link.sink, inbox));
            }
        }

        tracing::info!(source = %link.source, sink = %link.sink, mode = ?link.mode, "link added");
        Ok(())
    }

    /// Removes a link. For DIRECT links, any messages still queued for
    /// that (source, sink) pair are dropped, per the documented policy.
    pub fn remove_link(&self, source: ModuleHandle, sink: ModuleHandle) -> Result<(), BrokerError> {
        self.remove_link_inner(source, sink)
            .map_err(|cause| BrokerError::RemoveLinkError {
                source,
                sink,
                cause: Box::new(cause),
            })
    }

    fn remove_link_inner(&self, source: ModuleHandle, sink: ModuleHandle) -> Result<(), BrokerError> {
        let registry = self.0.registry.lock();
        let source_entry = registry.entries.get(&source).cloned().ok_or(BrokerError::NotFound)?;
        let sink_entry = registry.entries.get(&sink).cloned().ok_or(BrokerError::NotFound)?;
        drop(registry);

        self.0.wire_bus.unsubscribe(&source.topic_bytes(), sink);

        let had_direct = {
            let mut outbound = source_entry.direct_outbound.lock();
            let before = outbound.len();
            outbound.retain(|(s, _)| *s != sink);
            outbound.len() != before
        };
        if had_direct {
            if let Some(inbox) = sink_entry.direct_inbox.lock().as_ref() {
                inbox.remove_source(source);
            }
        }

        tracing::info!(source = %source, sink = %sink, "link removed");
        Ok(())
    }

    /// Publishes a message from `source`. If `source` has any DIRECT
    /// outbound links, delivery goes exclusively through the direct
    /// path; otherwise the message is serialized onto the wire bus.
    pub fn publish(&self, source: ModuleHandle, message: Message) -> Result<(), BrokerError> {
        let entry = {
            let registry = self.0.registry.lock();
            registry.entries.get(&source).cloned().ok_or(BrokerError::NotFound)?
        };

        if entry.has_direct_outbound() {
            let direct_targets = entry.direct_outbound.lock().clone();
            for (sink, inbox) in direct_targets {
                tracing::trace!(source = %source, sink = %sink, "direct publish");
                inbox.push(source, message.clone());
            }
            return Ok(());
        }

        let encoded = message.encode();
        let frame = encode_wire_frame(source.0, &encoded);
        tracing::trace!(source = %source, bytes = frame.len(), "wire publish");
        self.0.wire_bus.publish(&source.topic_bytes(), &frame);
        Ok(())
    }
}

/// Fetches a fresh `Sender` clone for `entry`'s wire channel by walking
/// through its own quit-token subscription, which always exists per the
/// registry invariant that a module is always subscribed to itself.
fn sink_sender_for(entry: &Arc<ModuleEntry>) -> Result<crossbeam::channel::Sender<Vec<u8>>, BrokerError> {
    entry
        .wire_tx
        .lock()
        .clone()
        .ok_or_else(|| BrokerError::PlatformError("module has no wire sender".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{LoaderInfo, LoaderKind, ModuleSpec};
    use std::sync::Mutex as StdMutex;

    struct RecordingModule {
        received: StdMutex<Vec<Message>>,
    }

    impl RecordingModule {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                received: StdMutex::new(Vec::new()),
            })
        }
    }

    impl crate::spec::ModuleApi for RecordingModule {
        fn receive(&self, message: Message) {
            self.received.lock().unwrap().push(message);
        }
    }

    fn test_spec(name: &str, module: Arc<RecordingModule>) -> ModuleSpec {
        ModuleSpec {
            name: name.to_string(),
            loader_info: LoaderInfo {
                loader_name: "native".to_string(),
                entrypoint: serde_json::json!({}),
            },
            loader_kind: LoaderKind::InProcess,
            config: String::new(),
            version: None,
            module,
        }
    }

    #[test]
    fn add_then_remove_module_is_idempotently_not_found() -> Result<(), String> {
        let broker = Broker::create().map_err(|e| e.to_string())?;
        let module = RecordingModule::new();
        let handle = broker.add_module(test_spec("m", module)).map_err(|e| e.to_string())?;
        broker.remove_module(handle).map_err(|e| e.to_string())?;
        match broker.remove_module(handle) {
            Err(BrokerError::NotFound) => Ok(()),
            other => Err(format!("expected NotFound, got {other:?}")),
        }
    }

    #[test]
    fn wire_fan_out_reaches_all_sinks() -> Result<(), String> {
        let broker = Broker::create().map_err(|e| e.to_string())?;
        let a = RecordingModule::new();
        let b = RecordingModule::new();
        let c = RecordingModule::new();
        let ha = broker.add_module(test_spec("a", a)).map_err(|e| e.to_string())?;
        let hb = broker.add_module(test_spec("b", b.clone())).map_err(|e| e.to_string())?;
        let hc = broker.add_module(test_spec("c", c.clone())).map_err(|e| e.to_string())?;
        broker.add_link(Link::new(ha, hb, LinkMode::Wire)).map_err(|e| e.to_string())?;
        broker.add_link(Link::new(ha, hc, LinkMode::Wire)).map_err(|e| e.to_string())?;

        let msg = Message::with_properties(vec![0x01, 0x02], vec![("k", "v")]).map_err(|e| e.to_string())?;
        broker.publish(ha, msg.clone()).map_err(|e| e.to_string())?;

        // Give both wire workers a bounded window to drain their frame.
        std::thread::sleep(std::time::Duration::from_millis(200));

        let b_received = b.received.lock().unwrap();
        let c_received = c.received.lock().unwrap();
        if b_received.len() != 1 || b_received[0] != msg {
            return Err(format!("b did not receive exactly the published message: {b_received:?}"));
        }
        if c_received.len() != 1 || c_received[0] != msg {
            return Err(format!("c did not receive exactly the published message: {c_received:?}"));
        }
        Ok(())
    }

    #[test]
    fn direct_link_preserves_publish_order() -> Result<(), String> {
        let broker = Broker::create().map_err(|e| e.to_string())?;
        let p = RecordingModule::new();
        let q = RecordingModule::new();
        let hp = broker.add_module(test_spec("p", p)).map_err(|e| e.to_string())?;
        let hq = broker.add_module(test_spec("q", q.clone())).map_err(|e| e.to_string())?;
        broker.add_link(Link::new(hp, hq, LinkMode::Direct)).map_err(|e| e.to_string())?;

        for i in 0..1000u32 {
            let msg = Message::with_properties(Vec::new(), vec![("seq", i.to_string())])
                .map_err(|e| e.to_string())?;
            broker.publish(hp, msg).map_err(|e| e.to_string())?;
        }

        std::thread::sleep(std::time::Duration::from_millis(300));

        let received = q.received.lock().unwrap();
        if received.len() != 1000 {
            return Err(format!("expected 1000 messages, got {}", received.len()));
        }
        for (i, msg) in received.iter().enumerate() {
            let seq: u32 = msg.property("seq").ok_or("missing seq")?.parse().map_err(|_| "bad seq")?;
            if seq != i as u32 {
                return Err(format!("out-of-order delivery at index {i}: seq={seq}"));
            }
        }
        Ok(())
    }

    #[test]
    fn mixed_mode_publish_is_direct_exclusive() -> Result<(), String> {
        let broker = Broker::create().map_err(|e| e.to_string())?;
        let s = RecordingModule::new();
        let a = RecordingModule::new();
        let b = RecordingModule::new();
        let hs = broker.add_module(test_spec("s", s)).map_err(|e| e.to_string())?;
        let ha = broker.add_module(test_spec("a", a.clone())).map_err(|e| e.to_string())?;
        let hb = broker.add_module(test_spec("b", b.clone())).map_err(|e| e.to_string())?;
        broker.add_link(Link::new(hs, ha, LinkMode::Direct)).map_err(|e| e.to_string())?;
        broker.add_link(Link::new(hs, hb, LinkMode::Wire)).map_err(|e| e.to_string())?;

        broker.publish(hs, Message::new(b"x".to_vec())).map_err(|e| e.to_string())?;
        std::thread::sleep(std::time::Duration::from_millis(200));

        if a.received.lock().unwrap().len() != 1 {
            return Err("direct sink should have received the message".to_string());
        }
        if !b.received.lock().unwrap().is_empty() {
            return Err("wire sink should not have received anything once a DIRECT link exists".to_string());
        }
        Ok(())
    }
}
