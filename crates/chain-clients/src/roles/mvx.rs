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
use mvx_bridge_core::converters;
use mvx_bridge_relayer_utils::{Error, Result};

use super::{PollingExecutor, SortedPublicKeysProvider};

/// The on-chain query the provider polls.
#[async_trait]
pub trait MvxRolesQuery: Send + Sync {
    /// The currently staked relayer addresses, raw bytes.
    async fn get_all_staked_relayers(&self) -> Result<Vec<Vec<u8>>>;
}

#[derive(Default)]
struct Whitelist {
    members: HashSet<Vec<u8>>,
    sorted: Vec<Vec<u8>>,
}

/// Mirrors the MultiversX-side relayer whitelist. The sorted key list
/// doubles as the leader-election ballot.
pub struct MultiversXRoleProvider {
    query: Arc<dyn MvxRolesQuery>,
    whitelist: RwLock<Whitelist>,
}

impl MultiversXRoleProvider {
    /// Creates a provider polling through the given query.
    pub fn new(query: Arc<dyn MvxRolesQuery>) -> Self {
        Self {
            query,
            whitelist: RwLock::new(Whitelist::default()),
        }
    }

    /// Whether the address bytes belong to the whitelist. Null and
    /// empty addresses are never whitelisted.
    pub fn is_whitelisted(&self, address: &[u8]) -> bool {
        if address.is_empty() {
            return false;
        }
        self.whitelist
            .read()
            .expect("whitelist lock poisoned")
            .members
            .contains(address)
    }
}

impl SortedPublicKeysProvider for MultiversXRoleProvider {
    fn sorted_public_keys(&self) -> Vec<Vec<u8>> {
        self.whitelist
            .read()
            .expect("whitelist lock poisoned")
            .sorted
            .clone()
    }
}

#[async_trait]
impl PollingExecutor for MultiversXRoleProvider {
    fn name(&self) -> &str {
        "multiversx role provider"
    }

    async fn execute(&self) -> Result<()> {
        let addresses = self.query.get_all_staked_relayers().await?;

        // a single malformed entry aborts the whole update: the
        // in-memory whitelist is never partially updated
        let mut rendered = Vec::with_capacity(addresses.len());
        for address in &addresses {
            match converters::to_bech32_string(address) {
                Ok(bech32) => rendered.push(bech32),
                Err(_) => {
                    return Err(Error::InvalidAddressBytes(hex::encode(address)))
                }
            }
        }

        let mut sorted = addresses.clone();
        sorted.sort();
        sorted.dedup();
        let members: HashSet<Vec<u8>> = addresses.into_iter().collect();

        *self.whitelist.write().expect("whitelist lock poisoned") =
            Whitelist { members, sorted };

        tracing::debug!(
            "fetched MultiversX whitelisted addresses:\n{}",
            rendered.join("\n")
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mvx_bridge_core::MVX_ADDRESS_LEN;

    struct FixedQuery(Vec<Vec<u8>>);

    #[async_trait]
    impl MvxRolesQuery for FixedQuery {
        async fn get_all_staked_relayers(&self) -> Result<Vec<Vec<u8>>> {
            Ok(self.0.clone())
        }
    }

    fn address(fill: u8) -> Vec<u8> {
        vec![fill; MVX_ADDRESS_LEN]
    }

    #[tokio::test]
    async fn keys_are_sorted_lexicographically() {
        let provider = MultiversXRoleProvider::new(Arc::new(FixedQuery(vec![
            address(3),
            address(1),
            address(2),
        ])));
        provider.execute().await.unwrap();

        assert_eq!(
            provider.sorted_public_keys(),
            vec![address(1), address(2), address(3)]
        );
        assert!(provider.is_whitelisted(&address(2)));
        assert!(!provider.is_whitelisted(&address(9)));
        assert!(!provider.is_whitelisted(&[]));
    }

    #[tokio::test]
    async fn a_malformed_address_aborts_the_whole_update() {
        let provider = MultiversXRoleProvider::new(Arc::new(FixedQuery(vec![
            address(1),
        ])));
        provider.execute().await.unwrap();
        assert!(provider.is_whitelisted(&address(1)));

        // second snapshot contains garbage: the first one must survive
        let provider_update = MultiversXRoleProvider {
            query: Arc::new(FixedQuery(vec![address(2), vec![1, 2, 3]])),
            whitelist: RwLock::new(Whitelist {
                members: [address(1)].into_iter().collect(),
                sorted: vec![address(1)],
            }),
        };
        let result = provider_update.execute().await;
        assert!(matches!(result, Err(Error::InvalidAddressBytes(_))));
        assert!(provider_update.is_whitelisted(&address(1)));
        assert!(!provider_update.is_whitelisted(&address(2)));
    }
}
