// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fan-out of gateway lifecycle events to registered observers.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    ModuleListChanged,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    ModuleListChanged,
    Destroyed,
}

type Callback = Arc<dyn Fn(Event) + Send + Sync>;

/// Synchronous pub/sub of lifecycle events. Delivery happens on the
/// reporting thread, always after the orchestrator has released
/// whatever broker-side lock triggered the event, so a callback is
/// free to call back into the orchestrator without deadlocking.
#[derive(Default)]
pub struct EventSystem {
    subscribers: Mutex<HashMap<Topic, Vec<Callback>>>,
}

impl EventSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: Topic, callback: Callback) {
        self.subscribers.lock().entry(topic).or_default().push(callback);
    }

    pub fn report(&self, topic: Topic, event: Event) {
        let callbacks = self.subscribers.lock().get(&topic).cloned().unwrap_or_default();
        for callback in callbacks {
            callback(event);
        }
    }
}
