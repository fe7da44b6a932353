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
//! # Relayer P2P Module 🕸️
//!
//! The authenticated broadcast layer the relayers gather signatures
//! over. The mesh transport itself is pluggable behind
//! [`NetMessenger`]; everything above it — envelope signing and
//! verification, replay protection, antiflood admission, role-based
//! whitelisting and client dispatch — lives here.

use std::sync::Arc;

use async_trait::async_trait;
use mvx_bridge_chain_clients::roles::{
    EthereumRoleProvider, MultiversXRoleProvider,
};
use mvx_bridge_core::{EthereumSignature, SignedMessage};
use mvx_bridge_relayer_utils::Result;

/// Peer admission quotas.
pub mod antiflood;
/// The broadcaster.
pub mod broadcaster;
/// The MultiversX-native envelope signature scheme.
pub mod crypto;
/// Signed envelope creation and verification.
pub mod message_handler;
/// An in-process messenger for deployments without a mesh transport,
/// and for tests.
pub mod messenger;

pub use broadcaster::{ArgsBroadcaster, Broadcaster};

/// A peer identity on the mesh.
pub type PeerId = String;

/// The transport the broadcaster runs on. Broadcasts are also
/// delivered to the locally registered processors so a relayer
/// observes its own messages.
#[async_trait]
pub trait NetMessenger: Send + Sync {
    /// This node's peer id.
    fn id(&self) -> PeerId;
    /// Joins a topic.
    async fn create_topic(&self, topic: &str) -> Result<()>;
    /// Registers the processor receiving the topic's messages.
    fn register_message_processor(
        &self,
        topic: &str,
        processor: Arc<dyn MessageProcessor>,
    ) -> Result<()>;
    /// Publishes to all peers of the topic.
    async fn broadcast(&self, topic: &str, data: Vec<u8>);
    /// Sends to a single connected peer.
    async fn send_to_connected_peer(
        &self,
        topic: &str,
        data: Vec<u8>,
        peer: &PeerId,
    ) -> Result<()>;
    /// Leaves the mesh.
    async fn close(&self) -> Result<()>;
}

/// Receives raw messages from the transport.
pub trait MessageProcessor: Send + Sync {
    /// Called by the messenger for every inbound message.
    fn process_received_message(
        &self,
        topic: &str,
        data: &[u8],
        from: &PeerId,
    ) -> Result<()>;
}

/// A consumer of verified broadcast messages; the signatures holder is
/// one such client.
pub trait BroadcastClient: Send + Sync {
    /// Delivers one verified message, with its decoded Ethereum
    /// signature when the payload carried one.
    fn process_new_message(
        &self,
        message: &SignedMessage,
        eth_signature: Option<&EthereumSignature>,
    );
    /// The messages this client has accumulated, for the join-topic
    /// resend.
    fn all_stored_messages(&self) -> Vec<SignedMessage>;
}

/// The chain-native signature scheme of the envelope, treated as a
/// black box.
pub trait SingleSigner: Send + Sync {
    /// The signer's public key bytes.
    fn public_key(&self) -> Vec<u8>;
    /// Signs the data.
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>>;
    /// Verifies a signature made by `public_key` over `data`.
    fn verify(&self, public_key: &[u8], data: &[u8], signature: &[u8])
        -> Result<()>;
}

/// Whitelist admission for envelope senders.
pub trait PeerWhitelist: Send + Sync {
    /// Whether the public key belongs to an authorised relayer.
    fn is_whitelisted(&self, public_key: &[u8]) -> bool;
}

impl PeerWhitelist for MultiversXRoleProvider {
    fn is_whitelisted(&self, public_key: &[u8]) -> bool {
        MultiversXRoleProvider::is_whitelisted(self, public_key)
    }
}

/// Verifies the Ethereum signatures travelling inside sign-topic
/// payloads.
pub trait EthSignatureVerifier: Send + Sync {
    /// Verifies the signature against the message hash and the
    /// Ethereum-side whitelist.
    fn verify(&self, signature: &[u8], message_hash: &[u8]) -> Result<()>;
}

impl EthSignatureVerifier for EthereumRoleProvider {
    fn verify(&self, signature: &[u8], message_hash: &[u8]) -> Result<()> {
        self.verify_signature(signature, message_hash)
    }
}

/// An evaluator that can deny a peer id; denial influences topic-level
/// acceptance only.
pub trait PeerDenialEvaluator: Send + Sync {
    /// Whether the peer is currently denied.
    fn is_denied(&self, peer: &PeerId) -> bool;
}
