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

//! Creation and verification of the signed envelopes travelling over
//! the mesh, including the per-sender nonce monotonicity that drops
//! replays of old messages.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use mvx_bridge_core::SignedMessage;
use mvx_bridge_relayer_utils::{Error, Result};

use crate::SingleSigner;

/// Wraps payloads into signed envelopes and validates inbound ones.
pub struct RelayerMessageHandler {
    signer: Arc<dyn SingleSigner>,
    public_key_bytes: Vec<u8>,
    counter: AtomicU64,
    nonces_of_public_keys: Mutex<HashMap<Vec<u8>, u64>>,
}

impl RelayerMessageHandler {
    /// Creates a handler signing with the given scheme. `counter_seed`
    /// makes the nonces of a restarted relayer start above everything
    /// it sent before (callers seed it with the current unix nanos).
    pub fn new(signer: Arc<dyn SingleSigner>, counter_seed: u64) -> Self {
        let public_key_bytes = signer.public_key();
        Self {
            signer,
            public_key_bytes,
            counter: AtomicU64::new(counter_seed),
            nonces_of_public_keys: Mutex::new(HashMap::new()),
        }
    }

    /// The handler's own public key.
    pub fn public_key_bytes(&self) -> &[u8] {
        &self.public_key_bytes
    }

    /// Wraps and signs a payload.
    pub fn create_message(&self, payload: Vec<u8>) -> Result<SignedMessage> {
        let nonce = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let signature = self
            .signer
            .sign(&SignedMessage::bytes_to_sign(&payload, nonce))?;
        Ok(SignedMessage {
            payload,
            public_key_bytes: self.public_key_bytes.clone(),
            signature,
            nonce,
        })
    }

    /// Decodes an inbound envelope and verifies its signature.
    pub fn preprocess_message(&self, data: &[u8]) -> Result<SignedMessage> {
        let message: SignedMessage = serde_json::from_slice(data)?;
        self.signer.verify(
            &message.public_key_bytes,
            &SignedMessage::bytes_to_sign(&message.payload, message.nonce),
            &message.signature,
        )?;
        Ok(message)
    }

    /// Enforces nonce monotonicity per sender. Someone might resend
    /// old, already seen by the network, messages; those are dropped
    /// and never dispatched.
    pub fn process_nonce(&self, message: &SignedMessage) -> Result<()> {
        let mut nonces = self
            .nonces_of_public_keys
            .lock()
            .expect("nonces lock poisoned");
        let last = nonces
            .get(&message.public_key_bytes)
            .copied()
            .unwrap_or_default();
        if message.nonce <= last {
            return Err(Error::NonceTooLowInReceivedMessage);
        }
        nonces.insert(message.public_key_bytes.clone(), message.nonce);
        Ok(())
    }

    /// Serializes an envelope for the wire.
    pub fn marshal(&self, message: &SignedMessage) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(message)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Ed25519Signer;

    fn handler() -> RelayerMessageHandler {
        let signer = Arc::new(Ed25519Signer::from_secret_key(&[7u8; 32]).unwrap());
        RelayerMessageHandler::new(signer, 100)
    }

    #[test]
    fn created_messages_round_trip_and_verify() {
        let handler = handler();
        let message = handler.create_message(b"payload".to_vec()).unwrap();
        assert_eq!(message.nonce, 101);

        let wire = handler.marshal(&message).unwrap();
        let decoded = handler.preprocess_message(&wire).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn tampered_envelopes_fail_verification() {
        let handler = handler();
        let mut message = handler.create_message(b"payload".to_vec()).unwrap();
        message.payload = b"tampered".to_vec();

        let wire = handler.marshal(&message).unwrap();
        assert!(handler.preprocess_message(&wire).is_err());
    }

    #[test]
    fn nonces_must_strictly_increase_per_sender() {
        let handler = handler();
        let first = handler.create_message(b"a".to_vec()).unwrap();
        let second = handler.create_message(b"b".to_vec()).unwrap();

        handler.process_nonce(&first).unwrap();
        handler.process_nonce(&second).unwrap();
        // a replay of either message is dropped
        assert!(matches!(
            handler.process_nonce(&second),
            Err(Error::NonceTooLowInReceivedMessage)
        ));
        assert!(matches!(
            handler.process_nonce(&first),
            Err(Error::NonceTooLowInReceivedMessage)
        ));
    }
}
