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

use serde::{Deserialize, Serialize};

/// The signed envelope every peer message travels in. The payload is
/// opaque to the broadcaster; the signature covers `payload || nonce`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage {
    /// The wrapped payload bytes.
    pub payload: Vec<u8>,
    /// The sender's chain-native public key.
    #[serde(rename = "pk")]
    pub public_key_bytes: Vec<u8>,
    /// The signature over the payload and nonce.
    #[serde(rename = "sig")]
    pub signature: Vec<u8>,
    /// A strictly increasing per-sender counter; receivers drop replays.
    pub nonce: u64,
}

impl SignedMessage {
    /// The receiver-side deduplication key: `public_key || payload`.
    pub fn unique_id(&self) -> Vec<u8> {
        let mut id =
            Vec::with_capacity(self.public_key_bytes.len() + self.payload.len());
        id.extend_from_slice(&self.public_key_bytes);
        id.extend_from_slice(&self.payload);
        id
    }

    /// The byte string the envelope signature is computed over.
    pub fn bytes_to_sign(payload: &[u8], nonce: u64) -> Vec<u8> {
        let mut buff = Vec::with_capacity(payload.len() + 8);
        buff.extend_from_slice(payload);
        buff.extend_from_slice(&nonce.to_be_bytes());
        buff
    }
}

/// A signature authorising a batch execution on the Ethereum side,
/// broadcast as the payload of a [`SignedMessage`] on the sign topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthereumSignature {
    /// The 65-byte Ethereum signature (including the recovery byte).
    #[serde(rename = "signature")]
    pub signature: Vec<u8>,
    /// The message hash the signature commits to.
    #[serde(rename = "messageHash")]
    pub message_hash: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_id_is_public_key_then_payload() {
        let msg = SignedMessage {
            payload: vec![10, 11],
            public_key_bytes: vec![1, 2, 3],
            signature: vec![99],
            nonce: 7,
        };
        assert_eq!(msg.unique_id(), vec![1, 2, 3, 10, 11]);
    }

    #[test]
    fn two_copies_of_the_same_message_share_the_unique_id() {
        let msg = SignedMessage {
            payload: b"payload".to_vec(),
            public_key_bytes: vec![5; 32],
            signature: vec![1; 64],
            nonce: 42,
        };
        assert_eq!(msg.unique_id(), msg.clone().unique_id());
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let msg = SignedMessage {
            payload: b"sig-payload".to_vec(),
            public_key_bytes: vec![5; 32],
            signature: vec![1; 64],
            nonce: 3,
        };
        let buff = serde_json::to_vec(&msg).unwrap();
        let decoded: SignedMessage = serde_json::from_slice(&buff).unwrap();
        assert_eq!(decoded, msg);
    }
}
