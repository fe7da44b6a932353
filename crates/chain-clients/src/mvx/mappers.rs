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

//! Token mapping collaborators backed by the multisig registry. One
//! mapper per direction; both consult the same on-chain registry.

use std::sync::Arc;

use async_trait::async_trait;
use mvx_bridge_relayer_utils::Result;

use super::proxy::MvxProxy;
use crate::TokensMapper;

/// Maps ERC20 addresses to their MultiversX token identifiers; used
/// when ingesting Ethereum batches.
pub struct Erc20ToMvxTokenMapper {
    proxy: Arc<dyn MvxProxy>,
}

impl Erc20ToMvxTokenMapper {
    /// Creates the mapper over the registry proxy.
    pub fn new(proxy: Arc<dyn MvxProxy>) -> Self {
        Self { proxy }
    }
}

#[async_trait]
impl TokensMapper for Erc20ToMvxTokenMapper {
    async fn convert_token(&self, source_token: &[u8]) -> Result<Vec<u8>> {
        self.proxy.token_id_for_erc20_address(source_token).await
    }
}

/// Maps MultiversX token identifiers to their ERC20 addresses; used
/// when ingesting MultiversX batches.
pub struct MvxToErc20TokenMapper {
    proxy: Arc<dyn MvxProxy>,
}

impl MvxToErc20TokenMapper {
    /// Creates the mapper over the registry proxy.
    pub fn new(proxy: Arc<dyn MvxProxy>) -> Self {
        Self { proxy }
    }
}

#[async_trait]
impl TokensMapper for MvxToErc20TokenMapper {
    async fn convert_token(&self, source_token: &[u8]) -> Result<Vec<u8>> {
        self.proxy.erc20_address_for_token_id(source_token).await
    }
}
