// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Background thread that drains an injected cloud-twin update stream
//! and feeds each payload into the orchestrator's `apply_update`.

use crate::orchestrator::GatewayOrchestrator;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Injected collaborator for the remote twin. `next_update` blocks
/// until a new declaration payload arrives or the stream ends.
pub trait CloudTwinClient: Send + Sync {
    fn next_update(&self) -> Option<String>;
}

enum CloudCommand {
    Shutdown,
}

/// Owns the background thread driving `CloudTwinClient::next_update`.
/// Dropping without calling `shutdown` leaks the thread until the
/// client itself returns `None`; callers should always shut down
/// explicitly during `GatewayOrchestrator::destroy`.
pub struct CloudIntegration {
    command_tx: Sender<CloudCommand>,
    join: Option<JoinHandle<()>>,
}

impl CloudIntegration {
    pub fn spawn(client: Arc<dyn CloudTwinClient>, orchestrator: GatewayOrchestrator) -> Self {
        let (command_tx, command_rx) = mpsc::channel::<CloudCommand>();

        let join = std::thread::Builder::new()
            .name("linkgate-cloud-twin".to_string())
            .spawn(move || loop {
                if matches!(command_rx.try_recv(), Ok(CloudCommand::Shutdown)) {
                    return;
                }
                match client.next_update() {
                    Some(payload) => {
                        if let Err(error) = orchestrator.apply_update(&payload) {
                            tracing::warn!(%error, "cloud-twin update failed to apply");
                        }
                    }
                    None => return,
                }
            })
            .expect("failed to spawn cloud-twin thread");

        Self { command_tx, join: Some(join) }
    }

    pub fn shutdown(mut self) {
        let _ = self.command_tx.send(CloudCommand::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for CloudIntegration {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            let _ = self.command_tx.send(CloudCommand::Shutdown);
            let _ = join.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::GatewayDeclaration;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedClient {
        payloads: Mutex<std::collections::VecDeque<String>>,
        calls: Arc<AtomicUsize>,
    }

    impl CloudTwinClient for ScriptedClient {
        fn next_update(&self) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.payloads.lock().pop_front()
        }
    }

    #[test]
    fn drains_scripted_updates_then_stops() -> Result<(), String> {
        let orchestrator =
            GatewayOrchestrator::create_from_declaration(&GatewayDeclaration::default(), None, None)
                .map_err(|e| e.to_string())?;

        let calls = Arc::new(AtomicUsize::new(0));
        let mut payloads = std::collections::VecDeque::new();
        payloads.push_back(r#"{"modules":[],"links":[]}"#.to_string());
        let client = Arc::new(ScriptedClient { payloads: Mutex::new(payloads), calls: calls.clone() });

        let integration = CloudIntegration::spawn(client, orchestrator);
        // The background thread drains the one scripted payload, then
        // observes the stream end (`None`) and exits on its own; give
        // it a moment before joining via shutdown.
        for _ in 0..100 {
            if calls.load(Ordering::SeqCst) >= 2 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        integration.shutdown();

        if calls.load(Ordering::SeqCst) < 2 {
            return Err("expected the scripted payload plus a terminating None call".to_string());
        }
        Ok(())
    }
}
