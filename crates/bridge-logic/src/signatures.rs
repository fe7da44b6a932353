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

//! Accumulates the verified destination-chain signatures arriving over
//! the broadcaster, keyed by message hash. Signatures come back out
//! ordered by public key ascending so every relayer packs the same
//! transaction payload.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use mvx_bridge_chain_clients::SignaturesReader;
use mvx_bridge_core::{EthereumSignature, SignedMessage};
use mvx_bridge_relayer_p2p::BroadcastClient;

#[derive(Default)]
struct Inner {
    // by envelope unique id, for the join-topic resend
    messages: HashMap<Vec<u8>, SignedMessage>,
    // message hash -> public key -> signature; the BTreeMap keeps the
    // deterministic public-key-ascending order
    signatures: HashMap<Vec<u8>, BTreeMap<Vec<u8>, Vec<u8>>>,
}

/// The content-addressed signature sink shared by the broadcaster and
/// the chain clients.
#[derive(Default)]
pub struct SignaturesHolder {
    inner: RwLock<Inner>,
}

impl SignaturesHolder {
    /// Creates an empty holder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empties the holder; called whenever the state machine
    /// transitions out of a batch.
    pub fn clear_stored_signatures(&self) {
        let mut inner = self.inner.write().expect("holder lock poisoned");
        inner.messages.clear();
        inner.signatures.clear();
    }
}

impl BroadcastClient for SignaturesHolder {
    fn process_new_message(
        &self,
        message: &SignedMessage,
        eth_signature: Option<&EthereumSignature>,
    ) {
        // messages without an Ethereum payload are not this client's
        // concern
        let eth_signature = match eth_signature {
            None => return,
            Some(eth_signature) => eth_signature,
        };

        let mut inner = self.inner.write().expect("holder lock poisoned");
        inner
            .messages
            .insert(message.unique_id(), message.clone());
        inner
            .signatures
            .entry(eth_signature.message_hash.clone())
            .or_default()
            .insert(
                message.public_key_bytes.clone(),
                eth_signature.signature.clone(),
            );
    }

    fn all_stored_messages(&self) -> Vec<SignedMessage> {
        self.inner
            .read()
            .expect("holder lock poisoned")
            .messages
            .values()
            .cloned()
            .collect()
    }
}

impl SignaturesReader for SignaturesHolder {
    fn signatures(&self, msg_hash: &[u8]) -> Vec<Vec<u8>> {
        self.inner
            .read()
            .expect("holder lock poisoned")
            .signatures
            .get(msg_hash)
            .map(|by_key| by_key.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(pk: u8, nonce: u64) -> SignedMessage {
        SignedMessage {
            payload: vec![0xaa, nonce as u8],
            public_key_bytes: vec![pk; 32],
            signature: vec![0xbb; 64],
            nonce,
        }
    }

    fn eth_signature(hash: u8, sig: u8) -> EthereumSignature {
        EthereumSignature {
            signature: vec![sig; 65],
            message_hash: vec![hash; 32],
        }
    }

    #[test]
    fn signatures_come_back_ordered_by_public_key() {
        let holder = SignaturesHolder::new();
        for pk in [3u8, 1, 2] {
            holder.process_new_message(
                &message(pk, pk as u64),
                Some(&eth_signature(7, pk)),
            );
        }

        let signatures = holder.signatures(&[7u8; 32]);
        assert_eq!(
            signatures,
            vec![vec![1u8; 65], vec![2u8; 65], vec![3u8; 65]]
        );
    }

    #[test]
    fn a_later_signature_from_the_same_key_overwrites_in_place() {
        let holder = SignaturesHolder::new();
        holder.process_new_message(&message(1, 1), Some(&eth_signature(7, 10)));
        holder.process_new_message(&message(1, 2), Some(&eth_signature(7, 20)));
        // a different key never displaces an existing entry
        holder.process_new_message(&message(2, 3), Some(&eth_signature(7, 30)));

        let signatures = holder.signatures(&[7u8; 32]);
        assert_eq!(signatures, vec![vec![20u8; 65], vec![30u8; 65]]);
    }

    #[test]
    fn hashes_are_isolated_from_each_other() {
        let holder = SignaturesHolder::new();
        holder.process_new_message(&message(1, 1), Some(&eth_signature(7, 10)));
        holder.process_new_message(&message(2, 2), Some(&eth_signature(8, 20)));

        assert_eq!(holder.signatures(&[7u8; 32]).len(), 1);
        assert_eq!(holder.signatures(&[8u8; 32]).len(), 1);
        assert!(holder.signatures(&[9u8; 32]).is_empty());
    }

    #[test]
    fn messages_without_an_ethereum_payload_are_ignored() {
        let holder = SignaturesHolder::new();
        holder.process_new_message(&message(1, 1), None);
        assert!(holder.all_stored_messages().is_empty());
    }

    #[test]
    fn clearing_empties_everything() {
        let holder = SignaturesHolder::new();
        holder.process_new_message(&message(1, 1), Some(&eth_signature(7, 10)));
        assert_eq!(holder.all_stored_messages().len(), 1);

        holder.clear_stored_signatures();
        assert!(holder.all_stored_messages().is_empty());
        assert!(holder.signatures(&[7u8; 32]).is_empty());
    }
}
