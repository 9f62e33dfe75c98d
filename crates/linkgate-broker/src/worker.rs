// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The two worker loops a module may run: the always-present wire
//! worker (§ wire path) and the direct worker spawned lazily the first
//! time the module becomes a DIRECT sink.

use crate::direct::DirectInbox;
use crate::entry::ModuleEntry;
use linkgate_message::Message;
use std::sync::Arc;

/// Runs on a dedicated thread for every module for as long as it is
/// registered. Holds the entry's wire-endpoint lock only for the
/// duration of each blocking receive call.
pub(crate) fn wire_worker_loop(entry: Arc<ModuleEntry>) {
    let quit_token = entry.quit_token.as_bytes();
    loop {
        let received = {
            let guard = entry.wire_rx.lock();
            match guard.as_ref() {
                Some(rx) => rx.recv(),
                None => {
                    tracing::trace!(module = %entry.handle, "wire endpoint closed, exiting worker");
                    return;
                }
            }
        };

        let frame = match received {
            Ok(frame) => frame,
            Err(_) => {
                tracing::trace!(module = %entry.handle, "wire endpoint disconnected, exiting worker");
                return;
            }
        };

        if frame == quit_token {
            tracing::trace!(module = %entry.handle, "quit token received, exiting worker");
            return;
        }

        match decode_wire_frame(&frame) {
            Ok((_source, message)) => entry.module.receive(message),
            Err(reason) => {
                tracing::warn!(module = %entry.handle, reason, "dropping malformed wire frame");
            }
        }
    }
}

/// Decodes `[source_handle_bytes(8) | size(i32, host order) | payload]`.
fn decode_wire_frame(frame: &[u8]) -> Result<(u64, Message), &'static str> {
    if frame.len() < 8 + 4 {
        return Err("frame shorter than header");
    }
    let source = u64::from_le_bytes(frame[0..8].try_into().map_err(|_| "bad handle bytes")?);
    let size = i32::from_ne_bytes(frame[8..12].try_into().map_err(|_| "bad size bytes")?);
    if size < 0 {
        return Err("negative encoded size");
    }
    let size = size as usize;
    let payload = frame.get(12..12 + size).ok_or("payload shorter than declared size")?;
    let message = Message::decode(payload).map_err(|_| "message decode failed")?;
    Ok((source, message))
}

/// Runs on a dedicated thread for every module that is the sink of at
/// least one DIRECT link. Never blocks while holding a lock shared with
/// a publisher: `DirectInbox::wait_and_drain` releases its lock before
/// this loop invokes the module's receive callback.
pub(crate) fn direct_worker_loop(module: Arc<dyn crate::spec::ModuleApi>, inbox: Arc<DirectInbox>) {
    loop {
        match inbox.wait_and_drain() {
            Some(drained) => {
                for (_source, message) in drained {
                    module.receive(message);
                }
            }
            None => return,
        }
    }
}

pub(crate) fn encode_wire_frame(source: u64, encoded: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(8 + 4 + encoded.len());
    frame.extend_from_slice(&source.to_le_bytes());
    frame.extend_from_slice(&(encoded.len() as i32).to_ne_bytes());
    frame.extend_from_slice(encoded);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkgate_message::Message;

    #[test]
    fn wire_frame_round_trips() -> Result<(), String> {
        let message = Message::new(b"payload".to_vec());
        let encoded = message.encode();
        let frame = encode_wire_frame(42, &encoded);
        let (source, decoded) = decode_wire_frame(&frame).map_err(|e| e.to_string())?;
        if source != 42 {
            return Err(format!("expected source 42, got {source}"));
        }
        if decoded != message {
            return Err("decoded message did not match original".to_string());
        }
        Ok(())
    }

    #[test]
    fn decode_rejects_short_frame() {
        assert!(decode_wire_frame(&[1, 2, 3]).is_err());
    }
}
