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

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use ethers::types::{Address, Signature, H256};
use mvx_bridge_core::converters;
use mvx_bridge_relayer_utils::{Error, Result};

use super::PollingExecutor;

const ETH_SIGNATURE_SIZE: usize = 64;

/// The on-chain query the provider polls.
#[async_trait]
pub trait EthereumRolesQuery: Send + Sync {
    /// The currently authorised relayer addresses.
    async fn get_relayers(&self) -> Result<Vec<Address>>;
}

/// Mirrors the Ethereum-side relayer whitelist and verifies Ethereum
/// signatures against it.
pub struct EthereumRoleProvider {
    query: Arc<dyn EthereumRolesQuery>,
    whitelist: RwLock<HashSet<Address>>,
}

impl EthereumRoleProvider {
    /// Creates a provider polling through the given query.
    pub fn new(query: Arc<dyn EthereumRolesQuery>) -> Self {
        Self {
            query,
            whitelist: RwLock::new(HashSet::new()),
        }
    }

    /// Whether the address belongs to the whitelist.
    pub fn is_whitelisted(&self, address: &Address) -> bool {
        if address.is_zero() {
            return false;
        }
        self.whitelist
            .read()
            .expect("whitelist lock poisoned")
            .contains(address)
    }

    /// Verifies a 65-byte Ethereum signature over the message hash:
    /// recovers the signer, checks the whitelist, verifies the trimmed
    /// r||s pair.
    pub fn verify_signature(
        &self,
        signature: &[u8],
        message_hash: &[u8],
    ) -> Result<()> {
        if message_hash.len() != H256::len_bytes() {
            return Err(Error::InvalidSignature);
        }
        let hash = H256::from_slice(message_hash);

        // the recovery byte must be present; anything shorter than
        // r||s||v is undecodable
        if signature.len() <= ETH_SIGNATURE_SIZE {
            return Err(Error::InvalidSignature);
        }
        let signature = Signature::try_from(&signature[..ETH_SIGNATURE_SIZE + 1])
            .map_err(|_| Error::InvalidSignature)?;

        let address = signature
            .recover(hash)
            .map_err(|_| Error::InvalidSignature)?;
        if !self.is_whitelisted(&address) {
            return Err(Error::AddressIsNotWhitelisted(
                converters::to_hex_string(address.as_bytes()),
            ));
        }

        signature
            .verify(hash, address)
            .map_err(|_| Error::InvalidSignature)
    }
}

#[async_trait]
impl PollingExecutor for EthereumRoleProvider {
    fn name(&self) -> &str {
        "ethereum role provider"
    }

    async fn execute(&self) -> Result<()> {
        let addresses = self.query.get_relayers().await?;
        let rendered: Vec<String> = addresses
            .iter()
            .map(|a| converters::to_hex_string(a.as_bytes()))
            .collect();

        *self.whitelist.write().expect("whitelist lock poisoned") =
            addresses.into_iter().collect();

        tracing::debug!(
            "fetched Ethereum whitelisted addresses:\n{}",
            rendered.join("\n")
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::signers::{LocalWallet, Signer};

    struct FixedQuery(Vec<Address>);

    #[async_trait]
    impl EthereumRolesQuery for FixedQuery {
        async fn get_relayers(&self) -> Result<Vec<Address>> {
            Ok(self.0.clone())
        }
    }

    fn wallet() -> LocalWallet {
        "4c0883a69102937d6231471b5dbb6204fe51296170827936ea5cce4b76994b0f"
            .parse()
            .unwrap()
    }

    async fn provider_with(addresses: Vec<Address>) -> EthereumRoleProvider {
        let provider = EthereumRoleProvider::new(Arc::new(FixedQuery(addresses)));
        provider.execute().await.unwrap();
        provider
    }

    #[tokio::test]
    async fn whitelist_replaces_atomically_and_rejects_the_zero_address() {
        let first = Address::repeat_byte(1);
        let second = Address::repeat_byte(2);

        let provider = provider_with(vec![first]).await;
        assert!(provider.is_whitelisted(&first));
        assert!(!provider.is_whitelisted(&second));
        assert!(!provider.is_whitelisted(&Address::zero()));

        // a later poll fully replaces the previous set
        let provider = EthereumRoleProvider::new(Arc::new(FixedQuery(vec![second])));
        provider.execute().await.unwrap();
        assert!(!provider.is_whitelisted(&first));
        assert!(provider.is_whitelisted(&second));
    }

    #[tokio::test]
    async fn a_whitelisted_signer_verifies() {
        let wallet = wallet();
        let provider = provider_with(vec![wallet.address()]).await;

        let hash = H256::repeat_byte(0x42);
        let signature = wallet.sign_hash(hash).unwrap();
        provider
            .verify_signature(&signature.to_vec(), hash.as_bytes())
            .unwrap();
    }

    #[tokio::test]
    async fn a_non_whitelisted_signer_is_rejected() {
        let wallet = wallet();
        let provider = provider_with(vec![Address::repeat_byte(9)]).await;

        let hash = H256::repeat_byte(0x42);
        let signature = wallet.sign_hash(hash).unwrap();
        let result =
            provider.verify_signature(&signature.to_vec(), hash.as_bytes());
        assert!(matches!(result, Err(Error::AddressIsNotWhitelisted(_))));
    }

    #[tokio::test]
    async fn garbage_signatures_are_rejected_as_invalid() {
        let provider = provider_with(vec![Address::repeat_byte(9)]).await;
        let hash = H256::repeat_byte(0x42);

        // too short to carry the recovery byte
        assert!(matches!(
            provider.verify_signature(&[0u8; 64], hash.as_bytes()),
            Err(Error::InvalidSignature)
        ));
        // undecodable r||s||v
        assert!(matches!(
            provider.verify_signature(&[0u8; 65], hash.as_bytes()),
            Err(Error::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn a_signature_over_a_different_hash_does_not_verify_as_the_signer() {
        let wallet = wallet();
        let provider = provider_with(vec![wallet.address()]).await;

        let signature = wallet.sign_hash(H256::repeat_byte(0x42)).unwrap();
        let other_hash = H256::repeat_byte(0x43);
        // recovery over the wrong hash yields a different address,
        // which is not whitelisted
        let result =
            provider.verify_signature(&signature.to_vec(), other_hash.as_bytes());
        assert!(result.is_err());
    }
}
