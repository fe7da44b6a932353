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

//! The MultiversX-native ed25519 scheme used to authenticate envelope
//! senders.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use mvx_bridge_relayer_utils::{Error, Result};

use crate::SingleSigner;

/// An ed25519 [`SingleSigner`].
pub struct Ed25519Signer {
    signing_key: SigningKey,
}

impl Ed25519Signer {
    /// Creates a signer from a raw 32-byte secret key.
    pub fn from_secret_key(secret_key: &[u8]) -> Result<Self> {
        let bytes: [u8; 32] = secret_key
            .try_into()
            .map_err(|_| Error::PublicKeyCast)?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&bytes),
        })
    }
}

impl SingleSigner for Ed25519Signer {
    fn public_key(&self) -> Vec<u8> {
        self.signing_key.verifying_key().as_bytes().to_vec()
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(self.signing_key.sign(data).to_bytes().to_vec())
    }

    fn verify(
        &self,
        public_key: &[u8],
        data: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        let key_bytes: [u8; 32] = public_key
            .try_into()
            .map_err(|_| Error::PublicKeyCast)?;
        let verifying_key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|_| Error::PublicKeyCast)?;
        let signature_bytes: [u8; 64] = signature
            .try_into()
            .map_err(|_| Error::InvalidSignature)?;
        verifying_key
            .verify(data, &Signature::from_bytes(&signature_bytes))
            .map_err(|_| Error::InvalidSignature)
    }
}
