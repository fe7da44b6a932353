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

//! The broadcaster joins the bridge's join and sign topics, validates
//! every inbound envelope (signature, sender whitelist, nonce replay,
//! antiflood quotas) and dispatches verified signatures to the
//! registered clients. Join announcements trigger a directed resend of
//! everything already gathered, so late peers catch up.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use mvx_bridge_core::{EthereumSignature, SignedMessage};
use mvx_bridge_relayer_context::Shutdown;
use mvx_bridge_relayer_utils::{probe, Error, Result};

use crate::antiflood::AntifloodHandler;
use crate::message_handler::RelayerMessageHandler;
use crate::{
    BroadcastClient, EthSignatureVerifier, MessageProcessor, NetMessenger,
    PeerId, PeerWhitelist, SingleSigner,
};

const JOIN_TOPIC_SUFFIX: &str = "_join";
const SIGN_TOPIC_SUFFIX: &str = "_sign";
const JOIN_TOPIC_MESSAGE: &[u8] = b"join topic";

/// The arguments DTO for [`Broadcaster::new`].
pub struct ArgsBroadcaster {
    /// The bridge name the topic names derive from, e.g.
    /// `EthereumToMultiversX`.
    pub name: String,
    /// The mesh transport.
    pub messenger: Arc<dyn NetMessenger>,
    /// The MultiversX-side sender whitelist.
    pub whitelist: Arc<dyn PeerWhitelist>,
    /// The verifier of the Ethereum signatures carried by sign
    /// messages.
    pub signature_verifier: Arc<dyn EthSignatureVerifier>,
    /// The envelope signature scheme.
    pub signer: Arc<dyn SingleSigner>,
    /// The admission quotas.
    pub antiflood: Arc<AntifloodHandler>,
    /// Seed of the envelope nonce counter; callers pass the current
    /// unix nanos so restarts keep nonces increasing.
    pub counter_seed: u64,
}

/// The authenticated pub/sub fan-out of the relayer.
pub struct Broadcaster {
    messenger: Arc<dyn NetMessenger>,
    whitelist: Arc<dyn PeerWhitelist>,
    signature_verifier: Arc<dyn EthSignatureVerifier>,
    antiflood: Arc<AntifloodHandler>,
    message_handler: RelayerMessageHandler,
    clients: RwLock<Vec<Arc<dyn BroadcastClient>>>,
    seen_sign_messages: Mutex<HashSet<Vec<u8>>>,
    join_topic: String,
    sign_topic: String,
}

impl Broadcaster {
    /// Creates a broadcaster for the bridge's topic pair.
    pub fn new(args: ArgsBroadcaster) -> Result<Self> {
        if args.name.is_empty() {
            return Err(Error::InvalidValue(
                "for broadcaster name, got an empty string".to_string(),
            ));
        }
        Ok(Self {
            messenger: args.messenger,
            whitelist: args.whitelist,
            signature_verifier: args.signature_verifier,
            antiflood: args.antiflood,
            message_handler: RelayerMessageHandler::new(
                args.signer,
                args.counter_seed,
            ),
            clients: RwLock::new(Vec::new()),
            seen_sign_messages: Mutex::new(HashSet::new()),
            join_topic: format!("{}{JOIN_TOPIC_SUFFIX}", args.name),
            sign_topic: format!("{}{SIGN_TOPIC_SUFFIX}", args.name),
        })
    }

    /// Subscribes to the join and sign topics.
    pub async fn register_on_topics(self: &Arc<Self>) -> Result<()> {
        for topic in [self.join_topic.clone(), self.sign_topic.clone()] {
            self.messenger.create_topic(&topic).await?;
            self.messenger
                .register_message_processor(&topic, self.clone())?;
            tracing::info!(topic, "registered");
        }
        Ok(())
    }

    /// Adds a client to the dispatch list.
    pub fn add_broadcast_client(&self, client: Arc<dyn BroadcastClient>) {
        self.clients
            .write()
            .expect("clients lock poisoned")
            .push(client);
    }

    /// Announces presence on the join topic.
    pub async fn broadcast_join_topic(&self) {
        if let Err(error) = self
            .broadcast_message(JOIN_TOPIC_MESSAGE.to_vec(), &self.join_topic)
            .await
        {
            tracing::error!(%error, "error sending join message");
        }
    }

    /// Re-announces presence every `interval` until shutdown.
    pub async fn join_loop(&self, interval: Duration, mut shutdown: Shutdown) {
        loop {
            self.broadcast_join_topic().await;
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!("join topic loop is closing...");
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// Leaves the mesh.
    pub async fn close(&self) -> Result<()> {
        self.messenger.close().await
    }

    async fn broadcast_message(&self, payload: Vec<u8>, topic: &str) -> Result<()> {
        let message = self.message_handler.create_message(payload)?;
        let buff = self.message_handler.marshal(&message)?;
        self.messenger.broadcast(topic, buff).await;
        Ok(())
    }

    fn process_join_message(&self, from: &PeerId) {
        let messages = self.retrieve_unique_messages();
        let messenger = self.messenger.clone();
        let sign_topic = self.sign_topic.clone();
        let peer = from.clone();
        let buffers: Vec<Vec<u8>> = messages
            .into_iter()
            .filter_map(|msg| self.message_handler.marshal(&msg).ok())
            .collect();
        tokio::spawn(async move {
            for buff in buffers {
                if let Err(error) = messenger
                    .send_to_connected_peer(&sign_topic, buff, &peer)
                    .await
                {
                    tracing::debug!(
                        %error,
                        peer,
                        "error sending current stored signatures"
                    );
                }
            }
        });
    }

    fn retrieve_unique_messages(&self) -> Vec<SignedMessage> {
        let clients = self.clients.read().expect("clients lock poisoned");
        let mut unique: HashSet<Vec<u8>> = HashSet::new();
        let mut messages = Vec::new();
        for client in clients.iter() {
            for message in client.all_stored_messages() {
                if unique.insert(message.unique_id()) {
                    messages.push(message);
                }
            }
        }
        messages
    }

    fn process_sign_message(&self, message: &SignedMessage) {
        let eth_signature: EthereumSignature =
            match serde_json::from_slice(&message.payload) {
                Ok(decoded) => decoded,
                Err(error) => {
                    tracing::debug!(
                        %error,
                        "received message does not contain a valid signature payload"
                    );
                    return;
                }
            };
        if let Err(error) = self
            .signature_verifier
            .verify(&eth_signature.signature, &eth_signature.message_hash)
        {
            tracing::debug!(
                %error,
                "received message does not contain a valid signature"
            );
            return;
        }

        self.notify_clients(message, Some(&eth_signature));
    }

    fn notify_clients(
        &self,
        message: &SignedMessage,
        eth_signature: Option<&EthereumSignature>,
    ) {
        let clients = self.clients.read().expect("clients lock poisoned");
        for client in clients.iter() {
            client.process_new_message(message, eth_signature);
        }
    }
}

impl MessageProcessor for Broadcaster {
    fn process_received_message(
        &self,
        topic: &str,
        data: &[u8],
        from: &PeerId,
    ) -> Result<()> {
        let message = self.message_handler.preprocess_message(data)?;

        if !self.whitelist.is_whitelisted(&message.public_key_bytes) {
            return Err(Error::PeerNotWhitelisted(hex::encode(
                &message.public_key_bytes,
            )));
        }

        // replays of already seen nonces are dropped here and never
        // influence the state machine
        self.message_handler.process_nonce(&message)?;

        self.antiflood.can_process_message(from, data.len() as u64)?;
        self.antiflood.can_process_message_on_topic(from, topic)?;

        tracing::event!(
            target: probe::TARGET,
            tracing::Level::TRACE,
            kind = %probe::Kind::Broadcast,
            topic,
            nonce = message.nonce,
        );

        if topic == self.join_topic {
            self.process_join_message(from);
        } else if topic == self.sign_topic {
            let is_first_delivery = self
                .seen_sign_messages
                .lock()
                .expect("seen messages lock poisoned")
                .insert(message.unique_id());
            if is_first_delivery {
                self.process_sign_message(&message);
            }
        }

        Ok(())
    }
}

impl mvx_bridge_chain_clients::SignatureBroadcaster for Broadcaster {
    fn broadcast_signature(&self, signature: Vec<u8>, message_hash: Vec<u8>) {
        let eth_signature = EthereumSignature {
            signature,
            message_hash,
        };
        let payload = match serde_json::to_vec(&eth_signature) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!(%error, "error creating signature payload");
                return;
            }
        };
        let message = match self.message_handler.create_message(payload) {
            Ok(message) => message,
            Err(error) => {
                tracing::error!(%error, "error signing broadcast envelope");
                return;
            }
        };
        let buff = match self.message_handler.marshal(&message) {
            Ok(buff) => buff,
            Err(error) => {
                tracing::error!(%error, "error marshalling broadcast envelope");
                return;
            }
        };

        let messenger = self.messenger.clone();
        let topic = self.sign_topic.clone();
        tokio::spawn(async move {
            messenger.broadcast(&topic, buff).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Ed25519Signer;
    use crate::messenger::InProcessNetwork;
    use mvx_bridge_relayer_config::AntifloodConfig;

    struct OpenWhitelist;

    impl PeerWhitelist for OpenWhitelist {
        fn is_whitelisted(&self, _public_key: &[u8]) -> bool {
            true
        }
    }

    struct ClosedWhitelist;

    impl PeerWhitelist for ClosedWhitelist {
        fn is_whitelisted(&self, _public_key: &[u8]) -> bool {
            false
        }
    }

    struct AcceptAllVerifier;

    impl EthSignatureVerifier for AcceptAllVerifier {
        fn verify(&self, _signature: &[u8], _message_hash: &[u8]) -> Result<()> {
            Ok(())
        }
    }

    struct RejectAllVerifier;

    impl EthSignatureVerifier for RejectAllVerifier {
        fn verify(&self, _signature: &[u8], _message_hash: &[u8]) -> Result<()> {
            Err(Error::InvalidSignature)
        }
    }

    #[derive(Default)]
    struct RecordingClient {
        received: Mutex<Vec<(SignedMessage, Option<EthereumSignature>)>>,
    }

    impl BroadcastClient for RecordingClient {
        fn process_new_message(
            &self,
            message: &SignedMessage,
            eth_signature: Option<&EthereumSignature>,
        ) {
            self.received
                .lock()
                .unwrap()
                .push((message.clone(), eth_signature.cloned()));
        }

        fn all_stored_messages(&self) -> Vec<SignedMessage> {
            self.received
                .lock()
                .unwrap()
                .iter()
                .map(|(message, _)| message.clone())
                .collect()
        }
    }

    fn antiflood() -> Arc<AntifloodHandler> {
        Arc::new(AntifloodHandler::new(&AntifloodConfig::default()).unwrap())
    }

    fn broadcaster_on(
        network: &Arc<InProcessNetwork>,
        peer_id: &str,
        key_fill: u8,
        whitelist: Arc<dyn PeerWhitelist>,
        verifier: Arc<dyn EthSignatureVerifier>,
    ) -> (Arc<Broadcaster>, Arc<RecordingClient>) {
        let messenger = network.join(peer_id);
        let signer =
            Arc::new(Ed25519Signer::from_secret_key(&[key_fill; 32]).unwrap());
        let broadcaster = Arc::new(
            Broadcaster::new(ArgsBroadcaster {
                name: "EthereumToMultiversX".to_string(),
                messenger,
                whitelist,
                signature_verifier: verifier,
                signer,
                antiflood: antiflood(),
                counter_seed: 1,
            })
            .unwrap(),
        );
        let client = Arc::new(RecordingClient::default());
        broadcaster.add_broadcast_client(client.clone());
        (broadcaster, client)
    }

    #[tokio::test]
    async fn signatures_reach_every_registered_client_on_the_mesh() {
        let network = InProcessNetwork::new();
        let (sender, sender_client) = broadcaster_on(
            &network,
            "peer-a",
            1,
            Arc::new(OpenWhitelist),
            Arc::new(AcceptAllVerifier),
        );
        let (receiver, receiver_client) = broadcaster_on(
            &network,
            "peer-b",
            2,
            Arc::new(OpenWhitelist),
            Arc::new(AcceptAllVerifier),
        );
        sender.register_on_topics().await.unwrap();
        receiver.register_on_topics().await.unwrap();

        use mvx_bridge_chain_clients::SignatureBroadcaster;
        sender.broadcast_signature(vec![9u8; 65], vec![7u8; 32]);
        tokio::task::yield_now().await;

        // both the remote peer and the sender itself observe the message
        let received = receiver_client.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        let (_, eth_signature) = &received[0];
        assert_eq!(
            eth_signature.as_ref().unwrap().message_hash,
            vec![7u8; 32]
        );
        drop(received);
        assert_eq!(sender_client.received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replayed_sign_messages_are_deduplicated_by_unique_id() {
        let network = InProcessNetwork::new();
        let (receiver, client) = broadcaster_on(
            &network,
            "peer-b",
            2,
            Arc::new(OpenWhitelist),
            Arc::new(AcceptAllVerifier),
        );
        receiver.register_on_topics().await.unwrap();

        let signer = Ed25519Signer::from_secret_key(&[1u8; 32]).unwrap();
        let handler = RelayerMessageHandler::new(Arc::new(signer), 1);
        let payload = serde_json::to_vec(&EthereumSignature {
            signature: vec![9u8; 65],
            message_hash: vec![7u8; 32],
        })
        .unwrap();

        // two envelopes with fresh nonces but an identical unique id
        let first = handler.marshal(&handler.create_message(payload.clone()).unwrap()).unwrap();
        let second = handler.marshal(&handler.create_message(payload).unwrap()).unwrap();
        let topic = "EthereumToMultiversX_sign";
        let from = "peer-a".to_string();
        receiver
            .process_received_message(topic, &first, &from)
            .unwrap();
        receiver
            .process_received_message(topic, &second, &from)
            .unwrap();

        assert_eq!(client.received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn non_whitelisted_senders_are_dropped() {
        let network = InProcessNetwork::new();
        let (receiver, client) = broadcaster_on(
            &network,
            "peer-b",
            2,
            Arc::new(ClosedWhitelist),
            Arc::new(AcceptAllVerifier),
        );
        receiver.register_on_topics().await.unwrap();

        let signer = Ed25519Signer::from_secret_key(&[1u8; 32]).unwrap();
        let handler = RelayerMessageHandler::new(Arc::new(signer), 1);
        let wire = handler
            .marshal(&handler.create_message(b"payload".to_vec()).unwrap())
            .unwrap();

        let result = receiver.process_received_message(
            "EthereumToMultiversX_sign",
            &wire,
            &"peer-a".to_string(),
        );
        assert!(matches!(result, Err(Error::PeerNotWhitelisted(_))));
        assert!(client.received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_ethereum_signatures_never_reach_the_clients() {
        let network = InProcessNetwork::new();
        let (receiver, client) = broadcaster_on(
            &network,
            "peer-b",
            2,
            Arc::new(OpenWhitelist),
            Arc::new(RejectAllVerifier),
        );
        receiver.register_on_topics().await.unwrap();

        let signer = Ed25519Signer::from_secret_key(&[1u8; 32]).unwrap();
        let handler = RelayerMessageHandler::new(Arc::new(signer), 1);
        let payload = serde_json::to_vec(&EthereumSignature {
            signature: vec![9u8; 65],
            message_hash: vec![7u8; 32],
        })
        .unwrap();
        let wire = handler
            .marshal(&handler.create_message(payload).unwrap())
            .unwrap();

        // the message is accepted at the envelope level but the bad
        // signature only costs this one message
        receiver
            .process_received_message(
                "EthereumToMultiversX_sign",
                &wire,
                &"peer-a".to_string(),
            )
            .unwrap();
        assert!(client.received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn a_join_message_triggers_a_directed_resend() {
        let network = InProcessNetwork::new();
        let (veteran, veteran_client) = broadcaster_on(
            &network,
            "peer-a",
            1,
            Arc::new(OpenWhitelist),
            Arc::new(AcceptAllVerifier),
        );
        veteran.register_on_topics().await.unwrap();

        // the veteran already gathered one signature
        use mvx_bridge_chain_clients::SignatureBroadcaster;
        veteran.broadcast_signature(vec![9u8; 65], vec![7u8; 32]);
        tokio::task::yield_now().await;
        assert_eq!(veteran_client.received.lock().unwrap().len(), 1);

        // a newcomer joins and announces itself
        let (newcomer, newcomer_client) = broadcaster_on(
            &network,
            "peer-b",
            2,
            Arc::new(OpenWhitelist),
            Arc::new(AcceptAllVerifier),
        );
        newcomer.register_on_topics().await.unwrap();
        newcomer.broadcast_join_topic().await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let received = newcomer_client.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(
            received[0].1.as_ref().unwrap().message_hash,
            vec![7u8; 32]
        );
    }
}
