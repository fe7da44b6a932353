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

//! An in-process [`NetMessenger`]: every node joined to the same
//! [`InProcessNetwork`] receives every broadcast, own messages
//! included. The production mesh transport plugs in behind the same
//! trait; nothing above the messenger can tell the difference.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use async_trait::async_trait;
use mvx_bridge_relayer_utils::{Error, Result};

use crate::{MessageProcessor, NetMessenger, PeerId};

type Processors = RwLock<HashMap<String, Vec<Arc<dyn MessageProcessor>>>>;

/// A set of in-process nodes delivering to each other synchronously.
#[derive(Default)]
pub struct InProcessNetwork {
    nodes: RwLock<HashMap<PeerId, Arc<InProcessMessenger>>>,
}

impl InProcessNetwork {
    /// Creates an empty network.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Joins a node under the given peer id.
    pub fn join(self: &Arc<Self>, peer_id: impl Into<PeerId>) -> Arc<InProcessMessenger> {
        let peer_id = peer_id.into();
        let messenger = Arc::new(InProcessMessenger {
            peer_id: peer_id.clone(),
            network: Arc::downgrade(self),
            processors: RwLock::default(),
        });
        self.nodes
            .write()
            .expect("nodes lock poisoned")
            .insert(peer_id, messenger.clone());
        messenger
    }

    fn all_nodes(&self) -> Vec<Arc<InProcessMessenger>> {
        self.nodes
            .read()
            .expect("nodes lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    fn node(&self, peer_id: &PeerId) -> Option<Arc<InProcessMessenger>> {
        self.nodes
            .read()
            .expect("nodes lock poisoned")
            .get(peer_id)
            .cloned()
    }

    fn leave(&self, peer_id: &PeerId) {
        self.nodes
            .write()
            .expect("nodes lock poisoned")
            .remove(peer_id);
    }
}

/// One node of an [`InProcessNetwork`].
pub struct InProcessMessenger {
    peer_id: PeerId,
    network: Weak<InProcessNetwork>,
    processors: Processors,
}

impl InProcessMessenger {
    fn deliver(&self, topic: &str, data: &[u8], from: &PeerId) {
        let processors = {
            let registered = self.processors.read().expect("processors lock poisoned");
            registered.get(topic).cloned().unwrap_or_default()
        };
        for processor in processors {
            if let Err(error) = processor.process_received_message(topic, data, from)
            {
                tracing::debug!(topic, %error, "message dropped by processor");
            }
        }
    }
}

#[async_trait]
impl NetMessenger for InProcessMessenger {
    fn id(&self) -> PeerId {
        self.peer_id.clone()
    }

    async fn create_topic(&self, topic: &str) -> Result<()> {
        self.processors
            .write()
            .expect("processors lock poisoned")
            .entry(topic.to_string())
            .or_default();
        Ok(())
    }

    fn register_message_processor(
        &self,
        topic: &str,
        processor: Arc<dyn MessageProcessor>,
    ) -> Result<()> {
        self.processors
            .write()
            .expect("processors lock poisoned")
            .entry(topic.to_string())
            .or_default()
            .push(processor);
        Ok(())
    }

    async fn broadcast(&self, topic: &str, data: Vec<u8>) {
        let network = match self.network.upgrade() {
            None => return,
            Some(network) => network,
        };
        for node in network.all_nodes() {
            node.deliver(topic, &data, &self.peer_id);
        }
    }

    async fn send_to_connected_peer(
        &self,
        topic: &str,
        data: Vec<u8>,
        peer: &PeerId,
    ) -> Result<()> {
        let network = self
            .network
            .upgrade()
            .ok_or(Error::Generic("network is gone"))?;
        let node = network
            .node(peer)
            .ok_or(Error::Generic("peer is not connected"))?;
        node.deliver(topic, &data, &self.peer_id);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if let Some(network) = self.network.upgrade() {
            network.leave(&self.peer_id);
        }
        Ok(())
    }
}
