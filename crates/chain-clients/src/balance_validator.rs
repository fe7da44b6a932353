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

//! Validates the token setup before a batch progresses. A token must be
//! either native or mint/burn on each chain, and its canonical ledger
//! can only live on one of the two.

use std::sync::Arc;

use ethers::types::U256;
use mvx_bridge_relayer_utils::{Error, Result};

use crate::BridgeChain;

/// Validates cross-chain token setups for one bridging direction.
pub struct BalanceValidator {
    source: Arc<dyn BridgeChain>,
    destination: Arc<dyn BridgeChain>,
}

impl BalanceValidator {
    /// Creates a validator between the two chains of a half bridge.
    pub fn new(
        source: Arc<dyn BridgeChain>,
        destination: Arc<dyn BridgeChain>,
    ) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Returns an error if the bridge can not happen for the provided
    /// token pair due to a faulty setup or missing destination funds.
    pub async fn check_token(
        &self,
        source_token: &[u8],
        destination_token: &[u8],
        amount: U256,
    ) -> Result<()> {
        self.destination
            .check_required_balance(destination_token, amount)
            .await?;

        let is_native_on_source =
            self.source.is_native_token(source_token).await?;
        let is_mint_burn_on_source =
            self.source.is_mint_burn_token(source_token).await?;
        let is_native_on_destination = self
            .destination
            .is_native_token(destination_token)
            .await?;
        let is_mint_burn_on_destination = self
            .destination
            .is_mint_burn_token(destination_token)
            .await?;

        if !is_native_on_source && !is_mint_burn_on_source {
            return Err(Error::InvalidSetup(format!(
                "isNativeOnSource = {is_native_on_source}, isMintBurnOnSource = {is_mint_burn_on_source}"
            )));
        }
        if !is_native_on_destination && !is_mint_burn_on_destination {
            return Err(Error::InvalidSetup(format!(
                "isNativeOnDestination = {is_native_on_destination}, isMintBurnOnDestination = {is_mint_burn_on_destination}"
            )));
        }
        if is_native_on_source == is_native_on_destination {
            return Err(Error::InvalidSetup(format!(
                "isNativeOnSource = {is_native_on_source}, isNativeOnDestination = {is_native_on_destination}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailWith, FakeChain};

    const SOURCE_TOKEN: &[u8] = &[0x33; 32];
    const DESTINATION_TOKEN: &[u8] = &[0x22; 20];

    fn chains() -> (Arc<FakeChain>, Arc<FakeChain>) {
        (
            Arc::new(FakeChain::default()),
            Arc::new(FakeChain::default()),
        )
    }

    fn mark_native(chain: &FakeChain, token: &[u8]) {
        chain.native_tokens.lock().unwrap().insert(token.to_vec());
    }

    fn mark_mint_burn(chain: &FakeChain, token: &[u8]) {
        chain
            .mint_burn_tokens
            .lock()
            .unwrap()
            .insert(token.to_vec());
    }

    #[tokio::test]
    async fn native_on_source_mint_burn_on_destination_is_accepted() {
        let (source, destination) = chains();
        mark_native(&source, SOURCE_TOKEN);
        mark_mint_burn(&destination, DESTINATION_TOKEN);

        let validator = BalanceValidator::new(source, destination);
        validator
            .check_token(SOURCE_TOKEN, DESTINATION_TOKEN, U256::from(100u64))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn native_on_both_chains_is_an_invalid_setup() {
        let (source, destination) = chains();
        mark_native(&source, SOURCE_TOKEN);
        mark_native(&destination, DESTINATION_TOKEN);

        let validator = BalanceValidator::new(source, destination);
        let result = validator
            .check_token(SOURCE_TOKEN, DESTINATION_TOKEN, U256::from(100u64))
            .await;
        assert!(matches!(result, Err(Error::InvalidSetup(_))));
    }

    #[tokio::test]
    async fn neither_native_nor_mint_burn_is_an_invalid_setup() {
        let (source, destination) = chains();
        mark_mint_burn(&destination, DESTINATION_TOKEN);

        let validator = BalanceValidator::new(source, destination);
        let result = validator
            .check_token(SOURCE_TOKEN, DESTINATION_TOKEN, U256::from(100u64))
            .await;
        assert!(matches!(result, Err(Error::InvalidSetup(_))));
    }

    #[tokio::test]
    async fn missing_destination_funds_surface_before_the_setup_checks() {
        let (source, destination) = chains();
        mark_native(&source, SOURCE_TOKEN);
        mark_mint_burn(&destination, DESTINATION_TOKEN);
        destination.fail_on(
            "check_required_balance",
            FailWith::InsufficientErc20Balance,
        );

        let validator = BalanceValidator::new(source, destination);
        let result = validator
            .check_token(SOURCE_TOKEN, DESTINATION_TOKEN, U256::from(100u64))
            .await;
        assert!(matches!(
            result,
            Err(Error::InsufficientErc20Balance { .. })
        ));
    }
}
