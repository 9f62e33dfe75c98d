// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process stand-in for the broker's `inproc://` pub/sub endpoint.
//!
//! Subscriptions are keyed by topic bytes: a module's own quit token,
//! or a linked source's handle bytes. `publish` fans a frame out to
//! every subscriber currently registered for its topic, mirroring the
//! prefix-matching semantics of the original pub/sub transport without
//! needing a real socket, since the endpoint never leaves the process.

use crate::ModuleHandle;
use crossbeam::channel::Sender;
use parking_lot::Mutex;
use std::collections::HashMap;

struct Subscription {
    handle: ModuleHandle,
    sender: Sender<Vec<u8>>,
}

pub(crate) struct WireBus {
    subscriptions: Mutex<HashMap<Vec<u8>, Vec<Subscription>>>,
}

impl WireBus {
    pub(crate) fn new() -> Self {
        Self {
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn subscribe(&self, topic: Vec<u8>, handle: ModuleHandle, sender: Sender<Vec<u8>>) {
        self.subscriptions
            .lock()
            .entry(topic)
            .or_default()
            .push(Subscription { handle, sender });
    }

    pub(crate) fn unsubscribe(&self, topic: &[u8], handle: ModuleHandle) {
        let mut subs = self.subscriptions.lock();
        if let Some(list) = subs.get_mut(topic) {
            list.retain(|s| s.handle != handle);
            if list.is_empty() {
                subs.remove(topic);
            }
        }
    }

    /// Drops every subscription registered under any topic for `handle`.
    /// Used as the always-correct fallback path during module removal:
    /// even if the targeted quit frame is never delivered, dropping the
    /// broker's `Sender` clones disconnects the module's channel and
    /// unblocks its worker's blocking receive.
    pub(crate) fn unsubscribe_all(&self, handle: ModuleHandle) {
        let mut subs = self.subscriptions.lock();
        subs.retain(|_, list| {
            list.retain(|s| s.handle != handle);
            !list.is_empty()
        });
    }

    pub(crate) fn publish(&self, topic: &[u8], frame: &[u8]) {
        let subs = self.subscriptions.lock();
        if let Some(list) = subs.get(topic) {
            for sub in list {
                // A disconnected subscriber is being torn down concurrently;
                // dropping the frame for it is correct, not an error.
                let _ = sub.sender.send(frame.to_vec());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;

    #[test]
    fn publish_reaches_only_matching_topic() -> Result<(), String> {
        let bus = WireBus::new();
        let (tx_a, rx_a) = unbounded();
        let (tx_b, rx_b) = unbounded();
        bus.subscribe(b"topic-a".to_vec(), ModuleHandle(1), tx_a);
        bus.subscribe(b"topic-b".to_vec(), ModuleHandle(2), tx_b);

        bus.publish(b"topic-a", b"hello");

        if rx_a.try_recv().map_err(|e| e.to_string())? != b"hello" {
            return Err("subscriber a should have received the frame".to_string());
        }
        if rx_b.try_recv().is_ok() {
            return Err("subscriber b should not have received the frame".to_string());
        }
        Ok(())
    }

    #[test]
    fn unsubscribe_all_disconnects_channel() -> Result<(), String> {
        let bus = WireBus::new();
        let (tx, rx) = unbounded();
        bus.subscribe(b"quit".to_vec(), ModuleHandle(7), tx);
        bus.unsubscribe_all(ModuleHandle(7));
        bus.publish(b"quit", b"unused");
        match rx.try_recv() {
            Err(crossbeam::channel::TryRecvError::Disconnected) => Ok(()),
            other => Err(format!("expected disconnected channel, got {other:?}")),
        }
    }
}
