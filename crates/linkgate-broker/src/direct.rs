// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The DIRECT-path per-sink inbox: a lock + condition variable guarding
//! one queue per inbound link, drained by the sink's direct worker.

use crate::ModuleHandle;
use linkgate_message::Message;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};

pub(crate) struct DirectInboxState {
    pub(crate) continue_running: bool,
    pub(crate) per_source: HashMap<ModuleHandle, VecDeque<Message>>,
}

/// Owned by a module that is the sink of at least one DIRECT link.
pub(crate) struct DirectInbox {
    state: Mutex<DirectInboxState>,
    condvar: Condvar,
}

impl DirectInbox {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(DirectInboxState {
                continue_running: true,
                per_source: HashMap::new(),
            }),
            condvar: Condvar::new(),
        }
    }

    /// Registers a source as a valid inbound link, so its queue exists
    /// even before the first message arrives.
    pub(crate) fn add_source(&self, source: ModuleHandle) {
        self.state
            .lock()
            .per_source
            .entry(source)
            .or_insert_with(VecDeque::new);
    }

    /// Drops a source's queue, discarding any messages still pending.
    pub(crate) fn remove_source(&self, source: ModuleHandle) {
        self.state.lock().per_source.remove(&source);
    }

    pub(crate) fn push(&self, source: ModuleHandle, message: Message) {
        let mut state = self.state.lock();
        state
            .per_source
            .entry(source)
            .or_insert_with(VecDeque::new)
            .push_back(message);
        self.condvar.notify_one();
    }

    /// Signals the direct worker to stop and wakes it immediately.
    pub(crate) fn stop(&self) {
        self.state.lock().continue_running = false;
        self.condvar.notify_all();
    }

    /// Blocks until either a message is queued or `stop()` has been
    /// called, then drains every per-source queue into one local list,
    /// coalescing cross-source arrivals from a single wake.
    ///
    /// Returns `None` once stopped with nothing left to drain.
    pub(crate) fn wait_and_drain(&self) -> Option<Vec<(ModuleHandle, Message)>> {
        let mut state = self.state.lock();
        loop {
            let has_pending = state.per_source.values().any(|q| !q.is_empty());
            if has_pending {
                break;
            }
            if !state.continue_running {
                return None;
            }
            self.condvar.wait(&mut state);
        }
        let mut drained = Vec::new();
        for (source, queue) in state.per_source.iter_mut() {
            while let Some(message) = queue.pop_front() {
                drained.push((*source, message));
            }
        }
        Some(drained)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_drain_preserves_fifo_per_source() -> Result<(), String> {
        let inbox = DirectInbox::new();
        let source = ModuleHandle(1);
        inbox.add_source(source);
        for i in 0..5u32 {
            inbox.push(source, Message::new(i.to_le_bytes().to_vec()));
        }
        inbox.stop();
        let drained = inbox.wait_and_drain().ok_or("expected pending messages")?;
        let seq: Vec<u32> = drained
            .iter()
            .map(|(_, m)| u32::from_le_bytes(m.content().try_into().unwrap()))
            .collect();
        if seq != vec![0, 1, 2, 3, 4] {
            return Err(format!("fifo order violated: {seq:?}"));
        }
        Ok(())
    }

    #[test]
    fn stop_with_empty_queue_returns_none() -> Result<(), String> {
        let inbox = DirectInbox::new();
        inbox.stop();
        match inbox.wait_and_drain() {
            None => Ok(()),
            Some(v) => Err(format!("expected None, got {v:?}", v = v.len())),
        }
    }

    #[test]
    fn remove_source_drops_pending_messages() -> Result<(), String> {
        let inbox = DirectInbox::new();
        let source = ModuleHandle(3);
        inbox.add_source(source);
        inbox.push(source, Message::new(b"queued".to_vec()));
        inbox.remove_source(source);
        inbox.stop();
        match inbox.wait_and_drain() {
            None => Ok(()),
            Some(v) => Err(format!("expected dropped queue, got {} messages", v.len())),
        }
    }
}
