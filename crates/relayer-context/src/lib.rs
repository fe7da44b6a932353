// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![warn(missing_docs)]
//! # Relayer Context Module 🕸️
//!
//! A module for managing the context of the relayer.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use mvx_bridge_core::status::StatusHandler;
use mvx_bridge_relayer_config::BridgeRelayerConfig;
use mvx_bridge_relayer_store::SledStore;
use tokio::sync::broadcast;

/// RelayerContext contains the relayer's configuration and shutdown signal.
#[derive(Clone)]
pub struct RelayerContext {
    /// The configuration of the relayer.
    pub config: BridgeRelayerConfig,
    /// Broadcasts a shutdown signal to all active tasks.
    ///
    /// The initial `shutdown` trigger is provided by the `run` caller.
    /// When a background task is spawned, it is passed a broadcast
    /// receiver handle. When a graceful shutdown is initiated, a `()`
    /// value is sent via the broadcast::Sender. Each active task receives
    /// it, reaches a safe terminal state, and completes.
    notify_shutdown: broadcast::Sender<()>,
    store: SledStore,
    status_handlers: Arc<Mutex<HashMap<String, Arc<StatusHandler>>>>,
}

impl RelayerContext {
    /// Creates a new RelayerContext.
    pub fn new(config: BridgeRelayerConfig, store: SledStore) -> Self {
        let (notify_shutdown, _) = broadcast::channel(2);
        Self {
            config,
            notify_shutdown,
            store,
            status_handlers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns a broadcast receiver handle for the shutdown signal.
    pub fn shutdown_signal(&self) -> Shutdown {
        Shutdown::new(self.notify_shutdown.subscribe())
    }

    /// Sends a shutdown signal to all subscribed tasks.
    pub fn shutdown(&self) {
        let _ = self.notify_shutdown.send(());
    }

    /// Returns the [Sled](https://sled.rs)-based database store.
    pub fn store(&self) -> &SledStore {
        &self.store
    }

    /// Registers a named status handler so it can be looked up later
    /// (e.g. by an external metrics integration).
    pub fn register_status_handler(&self, handler: Arc<StatusHandler>) {
        self.status_handlers
            .lock()
            .expect("status handlers lock poisoned")
            .insert(handler.name().to_string(), handler);
    }

    /// Looks up a registered status handler by name.
    pub fn status_handler(&self, name: &str) -> Option<Arc<StatusHandler>> {
        self.status_handlers
            .lock()
            .expect("status handlers lock poisoned")
            .get(name)
            .cloned()
    }
}

/// Listens for the relayer shutdown signal.
///
/// Shutdown is signalled using a `broadcast::Receiver`. Only a single
/// value is ever sent. Once a value has been sent via the broadcast
/// channel, every task should shutdown.
///
/// The `Shutdown` struct listens for the signal and tracks that the
/// signal has been received. Callers may query for whether the shutdown
/// signal has been received or not.
#[derive(Debug)]
pub struct Shutdown {
    /// `true` if the shutdown signal has been received
    shutdown: bool,

    /// The receive half of the channel used to listen for shutdown.
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    /// Create a new `Shutdown` backed by the given `broadcast::Receiver`.
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            shutdown: false,
            notify,
        }
    }

    /// Returns `true` if the shutdown signal has been received.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Receive the shutdown notice, waiting if necessary.
    pub async fn recv(&mut self) {
        // If the shutdown signal has already been received, then return
        // immediately.
        if self.shutdown {
            return;
        }

        // Cannot receive a "lag error" as only one value is ever sent.
        let _ = self.notify.recv().await;

        // Remember that the signal has been received.
        self.shutdown = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_context() -> RelayerContext {
        let store = SledStore::temporary().unwrap();
        let config = sample_config();
        RelayerContext::new(config, store)
    }

    fn sample_config() -> BridgeRelayerConfig {
        // the config crate ships a full sample in its own tests; here a
        // minimal structure is enough
        let toml = include_str!("../tests/fixtures/config.toml");
        let parsed: BridgeRelayerConfig = toml::from_str(toml).unwrap();
        parsed
    }

    #[tokio::test]
    async fn shutdown_reaches_every_subscriber() {
        let ctx = sample_context();
        let mut first = ctx.shutdown_signal();
        let mut second = ctx.shutdown_signal();

        ctx.shutdown();
        first.recv().await;
        second.recv().await;
        assert!(first.is_shutdown());
        assert!(second.is_shutdown());
    }

    #[tokio::test]
    async fn status_handlers_are_registered_by_name() {
        let ctx = sample_context();
        ctx.register_status_handler(Arc::new(StatusHandler::new("eth-client")));
        assert!(ctx.status_handler("eth-client").is_some());
        assert!(ctx.status_handler("unknown").is_none());
    }
}
