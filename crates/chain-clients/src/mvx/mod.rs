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

//! The MultiversX side of the bridge. The multisig there works with
//! propose/sign/perform actions; this client maps that protocol onto
//! the uniform facade, resolving action ids from the stored batch on
//! every call.

use std::collections::HashMap;
use std::sync::Mutex;

use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::{H256, U256};
use ethers::utils::keccak256;
use mvx_bridge_core::status::{
    StatusHandler, METRIC_LAST_MVX_CLIENT_ERROR, METRIC_LAST_QUERIED_MVX_BLOCK,
    METRIC_MVX_CLIENT_STATUS,
};
use mvx_bridge_core::{converters, DepositTransfer, TransferBatch};
use mvx_bridge_relayer_config::GasMapConfig;
use mvx_bridge_relayer_utils::{Error, Result};

use crate::availability::AvailabilityTracker;
use crate::{BridgeChain, TokensMapper};

/// The reqwest-backed gateway adapter.
pub mod gateway;
/// Token mapping collaborators backed by the multisig queries.
pub mod mappers;
/// The collaborator trait of the MultiversX client.
pub mod proxy;

pub use proxy::{MvxProxy, RawMvxBatch, RawMvxDeposit};

const MIN_ALLOWED_DELTA: u64 = 1;

/// The arguments DTO for [`MultiversXClient::new`].
pub struct ArgsMultiversXClient {
    /// Gateway and contract access.
    pub proxy: Arc<dyn MvxProxy>,
    /// Source-to-destination token translation.
    pub tokens_mapper: Arc<dyn TokensMapper>,
    /// Gas limits per contract operation.
    pub gas_map: GasMapConfig,
    /// Same-block tolerance of the availability tracker.
    pub allow_delta: u64,
    /// The client's status metrics.
    pub status_handler: Arc<StatusHandler>,
}

/// The MultiversX implementation of [`BridgeChain`].
pub struct MultiversXClient {
    proxy: Arc<dyn MvxProxy>,
    tokens_mapper: Arc<dyn TokensMapper>,
    gas_map: GasMapConfig,
    status_handler: Arc<StatusHandler>,
    availability: tokio::sync::Mutex<AvailabilityTracker>,
    // message hashes handed to the state machine, resolved back to the
    // multisig action ids they stand for
    signed_actions: Mutex<HashMap<H256, u64>>,
}

#[derive(Clone, Copy)]
enum ActionKind {
    Transfer,
    SetStatus,
}

impl MultiversXClient {
    /// Creates a new MultiversX client.
    pub fn new(args: ArgsMultiversXClient) -> Result<Self> {
        if args.allow_delta < MIN_ALLOWED_DELTA {
            return Err(Error::InvalidValue(format!(
                "for args.AllowDelta, got: {}, minimum: {}",
                args.allow_delta, MIN_ALLOWED_DELTA
            )));
        }

        let availability = tokio::sync::Mutex::new(AvailabilityTracker::new(
            args.status_handler.clone(),
            METRIC_MVX_CLIENT_STATUS,
            METRIC_LAST_MVX_CLIENT_ERROR,
            args.allow_delta,
        ));

        Ok(Self {
            proxy: args.proxy,
            tokens_mapper: args.tokens_mapper,
            gas_map: args.gas_map,
            status_handler: args.status_handler,
            availability,
            signed_actions: Mutex::new(HashMap::new()),
        })
    }

    async fn action_id(
        &self,
        kind: ActionKind,
        batch: &TransferBatch,
    ) -> Result<u64> {
        match kind {
            ActionKind::Transfer => {
                self.proxy.action_id_for_propose_transfer(batch).await
            }
            ActionKind::SetStatus => {
                self.proxy.action_id_for_set_status(batch).await
            }
        }
    }

    /// The opaque handle the state machine carries between the sign and
    /// execute phases. Derived from the action rather than the batch so
    /// re-proposals yield fresh handles.
    fn action_message_hash(kind: ActionKind, batch_id: u64, action_id: u64) -> H256 {
        let domain: &[u8] = match kind {
            ActionKind::Transfer => b"proposeTransfer",
            ActionKind::SetStatus => b"proposeSetStatus",
        };
        let mut buff = domain.to_vec();
        buff.extend_from_slice(&batch_id.to_be_bytes());
        buff.extend_from_slice(&action_id.to_be_bytes());
        H256::from(keccak256(buff))
    }

    async fn sign_action(
        &self,
        kind: ActionKind,
        batch: &TransferBatch,
    ) -> Result<H256> {
        let action_id = self.action_id(kind, batch).await?;
        let msg_hash = Self::action_message_hash(kind, batch.id, action_id);

        let was_signed = self.proxy.was_action_signed(action_id).await?;
        if was_signed {
            tracing::debug!(action_id, "action already signed");
        } else {
            let tx_hash = self
                .proxy
                .sign_action(action_id, self.gas_map.sign)
                .await?;
            tracing::info!(hash = tx_hash, action_id, "signed action");
        }

        self.signed_actions
            .lock()
            .expect("signed actions lock poisoned")
            .insert(msg_hash, action_id);
        Ok(msg_hash)
    }

    async fn resolve_action(
        &self,
        msg_hash: H256,
        batch: &TransferBatch,
    ) -> Result<u64> {
        let known = self
            .signed_actions
            .lock()
            .expect("signed actions lock poisoned")
            .get(&msg_hash)
            .copied();
        match known {
            Some(action_id) => Ok(action_id),
            // a restarted relayer re-resolves the action from the batch
            None => self.proxy.action_id_for_propose_transfer(batch).await,
        }
    }

    async fn perform_resolved_action(
        &self,
        msg_hash: H256,
        batch: &TransferBatch,
        gas_limit: u64,
    ) -> Result<String> {
        if self.proxy.is_paused().await? {
            return Err(Error::MultisigContractPaused);
        }
        let action_id = self.resolve_action(msg_hash, batch).await?;
        let tx_hash = self.proxy.perform_action(action_id, gas_limit).await?;
        tracing::info!(
            hash = tx_hash,
            batch_id = batch.id,
            action_id,
            "sent perform action transaction"
        );
        Ok(tx_hash)
    }

    fn displayable_token(token: &[u8]) -> String {
        String::from_utf8_lossy(token).into_owned()
    }
}

#[async_trait]
impl BridgeChain for MultiversXClient {
    fn name(&self) -> &'static str {
        "multiversx"
    }

    async fn last_executed_batch_id(&self) -> Result<u64> {
        self.proxy.last_executed_batch_id().await
    }

    async fn get_batch(&self, nonce: u64) -> Result<Option<(TransferBatch, bool)>> {
        tracing::info!(nonce, "getting batch");
        let raw = match self.proxy.get_batch(nonce).await? {
            None => return Ok(None),
            Some(raw) => raw,
        };
        if raw.deposits_count as usize != raw.deposits.len() {
            return Err(Error::DepositsAndBatchDepositsCountDiffer {
                declared: raw.deposits_count as u64,
                fetched: raw.deposits.len() as u64,
            });
        }
        if raw.id != nonce || raw.deposits.is_empty() {
            return Err(Error::BatchNotFound {
                requested: nonce,
                fetched: raw.id,
                num_deposits: raw.deposits.len(),
            });
        }

        self.status_handler.set_int_metric(
            METRIC_LAST_QUERIED_MVX_BLOCK,
            raw.block_number as i64,
        );

        let mut batch = TransferBatch {
            id: raw.id,
            block_number: raw.block_number,
            deposits: Vec::with_capacity(raw.deposits.len()),
            statuses: vec![0u8; raw.deposits.len()],
        };

        let mut cached_tokens: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();
        for deposit in raw.deposits {
            let destination_token =
                match cached_tokens.get(&deposit.token_identifier) {
                    Some(converted) => converted.clone(),
                    None => {
                        let converted = self
                            .tokens_mapper
                            .convert_token(&deposit.token_identifier)
                            .await?;
                        cached_tokens.insert(
                            deposit.token_identifier.clone(),
                            converted.clone(),
                        );
                        converted
                    }
                };

            let displayable_data = deposit
                .data
                .as_deref()
                .map(hex::encode)
                .unwrap_or_default();
            batch.deposits.push(DepositTransfer {
                nonce: deposit.nonce,
                displayable_to: converters::to_hex_string(&deposit.to),
                to_bytes: deposit.to,
                displayable_from: converters::to_bech32_string_silent(
                    &deposit.from,
                ),
                from_bytes: deposit.from,
                displayable_token: Self::displayable_token(
                    &deposit.token_identifier,
                ),
                source_token_bytes: deposit.token_identifier,
                destination_token_bytes: destination_token,
                amount: deposit.amount,
                data: deposit.data,
                displayable_data,
            });
        }

        Ok(Some((batch, raw.is_final)))
    }

    async fn last_executed_deposit_nonce(&self) -> Result<u64> {
        self.proxy.last_executed_deposit_nonce().await
    }

    async fn was_executed(&self, batch_id: u64) -> Result<bool> {
        self.proxy.was_batch_executed(batch_id).await
    }

    async fn get_transactions_statuses(&self, batch_id: u64) -> Result<Vec<u8>> {
        let (statuses, is_final) =
            self.proxy.get_statuses_after_execution(batch_id).await?;
        if !is_final {
            return Err(Error::StatusIsNotFinal);
        }
        Ok(statuses)
    }

    async fn get_quorum_size(&self) -> Result<U256> {
        let quorum = self.proxy.quorum().await?;
        if quorum < U256::one() {
            return Err(Error::InvalidValue(format!(
                "for quorum size, got: {quorum}, minimum: 1"
            )));
        }
        Ok(quorum)
    }

    async fn is_quorum_reached(
        &self,
        batch: &TransferBatch,
        msg_hash: H256,
    ) -> Result<bool> {
        let action_id = self.resolve_action(msg_hash, batch).await?;
        self.proxy.quorum_reached_for_action(action_id).await
    }

    async fn was_transfer_proposed(&self, batch: &TransferBatch) -> Result<bool> {
        self.proxy.was_transfer_proposed(batch).await
    }

    async fn propose_transfer(&self, batch: &TransferBatch) -> Result<String> {
        let gas_limit = self.gas_map.propose_transfer_base
            + batch.deposits.len() as u64 * self.gas_map.propose_transfer_for_each;
        let tx_hash = self.proxy.propose_transfer(batch, gas_limit).await?;
        tracing::info!(hash = tx_hash, batch_id = batch.id, "proposed transfer");
        Ok(tx_hash)
    }

    async fn was_set_status_proposed(
        &self,
        batch: &TransferBatch,
    ) -> Result<bool> {
        self.proxy.was_set_status_proposed(batch).await
    }

    async fn propose_set_status(&self, batch: &TransferBatch) -> Result<String> {
        let gas_limit = self.gas_map.propose_status_base
            + batch.deposits.len() as u64 * self.gas_map.propose_status_for_each;
        let tx_hash = self.proxy.propose_set_status(batch, gas_limit).await?;
        tracing::info!(hash = tx_hash, batch_id = batch.id, "proposed set status");
        Ok(tx_hash)
    }

    async fn sign_transfer(&self, batch: &TransferBatch) -> Result<H256> {
        self.sign_action(ActionKind::Transfer, batch).await
    }

    async fn sign_set_status(&self, batch: &TransferBatch) -> Result<H256> {
        self.sign_action(ActionKind::SetStatus, batch).await
    }

    async fn execute_transfer(
        &self,
        msg_hash: H256,
        batch: &TransferBatch,
        _quorum: usize,
    ) -> Result<String> {
        let gas_limit = self.gas_map.perform_action_base
            + batch.deposits.len() as u64 * self.gas_map.perform_action_for_each;
        self.perform_resolved_action(msg_hash, batch, gas_limit).await
    }

    async fn execute_set_status(
        &self,
        msg_hash: H256,
        batch: &TransferBatch,
        _quorum: usize,
    ) -> Result<String> {
        let gas_limit = self.gas_map.perform_action_base
            + batch.deposits.len() as u64 * self.gas_map.perform_action_for_each;
        self.perform_resolved_action(msg_hash, batch, gas_limit).await
    }

    async fn check_required_balance(
        &self,
        token: &[u8],
        amount: U256,
    ) -> Result<()> {
        if self.proxy.is_mint_burn_token(token).await? {
            return Ok(());
        }
        let existing = self.proxy.safe_token_balance(token).await?;
        if amount > existing {
            return Err(Error::InsufficientErc20Balance {
                existing: existing.to_string(),
                required: amount.to_string(),
                token: Self::displayable_token(token),
            });
        }
        Ok(())
    }

    async fn is_mint_burn_token(&self, token: &[u8]) -> Result<bool> {
        self.proxy.is_mint_burn_token(token).await
    }

    async fn is_native_token(&self, token: &[u8]) -> Result<bool> {
        self.proxy.is_native_token(token).await
    }

    async fn check_client_availability(&self) -> Result<()> {
        let fetch_result = self
            .proxy
            .latest_block_nonce()
            .await
            .map_err(|e| e.to_string());
        let mut tracker = self.availability.lock().await;
        tracker.update(fetch_result);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct StubProxy {
        batch: Option<RawMvxBatch>,
        already_signed: AtomicBool,
        sign_calls: AtomicUsize,
        quorum_reached: AtomicBool,
        statuses_final: AtomicBool,
    }

    #[async_trait]
    impl MvxProxy for StubProxy {
        async fn get_batch(&self, _nonce: u64) -> Result<Option<RawMvxBatch>> {
            Ok(self.batch.clone())
        }

        async fn last_executed_batch_id(&self) -> Result<u64> {
            Ok(41)
        }

        async fn last_executed_deposit_nonce(&self) -> Result<u64> {
            Ok(0)
        }

        async fn was_batch_executed(&self, _batch_id: u64) -> Result<bool> {
            Ok(false)
        }

        async fn get_statuses_after_execution(
            &self,
            _batch_id: u64,
        ) -> Result<(Vec<u8>, bool)> {
            Ok((vec![3, 4], self.statuses_final.load(Ordering::SeqCst)))
        }

        async fn quorum(&self) -> Result<U256> {
            Ok(U256::from(3u64))
        }

        async fn is_paused(&self) -> Result<bool> {
            Ok(false)
        }

        async fn was_transfer_proposed(
            &self,
            _batch: &TransferBatch,
        ) -> Result<bool> {
            Ok(false)
        }

        async fn propose_transfer(
            &self,
            _batch: &TransferBatch,
            _gas_limit: u64,
        ) -> Result<String> {
            Ok("hash".to_string())
        }

        async fn was_set_status_proposed(
            &self,
            _batch: &TransferBatch,
        ) -> Result<bool> {
            Ok(false)
        }

        async fn propose_set_status(
            &self,
            _batch: &TransferBatch,
            _gas_limit: u64,
        ) -> Result<String> {
            Ok("hash".to_string())
        }

        async fn action_id_for_propose_transfer(
            &self,
            _batch: &TransferBatch,
        ) -> Result<u64> {
            Ok(662)
        }

        async fn action_id_for_set_status(
            &self,
            _batch: &TransferBatch,
        ) -> Result<u64> {
            Ok(663)
        }

        async fn was_action_signed(&self, _action_id: u64) -> Result<bool> {
            Ok(self.already_signed.load(Ordering::SeqCst))
        }

        async fn sign_action(
            &self,
            _action_id: u64,
            _gas_limit: u64,
        ) -> Result<String> {
            self.sign_calls.fetch_add(1, Ordering::SeqCst);
            Ok("sign-hash".to_string())
        }

        async fn quorum_reached_for_action(&self, action_id: u64) -> Result<bool> {
            assert_eq!(action_id, 662);
            Ok(self.quorum_reached.load(Ordering::SeqCst))
        }

        async fn perform_action(
            &self,
            _action_id: u64,
            _gas_limit: u64,
        ) -> Result<String> {
            Ok("perform-hash".to_string())
        }

        async fn is_mint_burn_token(&self, _token: &[u8]) -> Result<bool> {
            Ok(false)
        }

        async fn is_native_token(&self, _token: &[u8]) -> Result<bool> {
            Ok(true)
        }

        async fn safe_token_balance(&self, _token: &[u8]) -> Result<U256> {
            Ok(U256::from(500u64))
        }

        async fn latest_block_nonce(&self) -> Result<u64> {
            Ok(77)
        }

        async fn token_id_for_erc20_address(
            &self,
            _address: &[u8],
        ) -> Result<Vec<u8>> {
            Ok(b"WEGLD-abcdef".to_vec())
        }

        async fn erc20_address_for_token_id(
            &self,
            _token_id: &[u8],
        ) -> Result<Vec<u8>> {
            Ok(vec![0x22; 20])
        }

        async fn get_all_staked_relayers(&self) -> Result<Vec<Vec<u8>>> {
            Ok(Vec::new())
        }
    }

    fn gas_map() -> GasMapConfig {
        GasMapConfig {
            sign: 8_000_000,
            propose_transfer_base: 30_000_000,
            propose_transfer_for_each: 1_500_000,
            propose_status_base: 30_000_000,
            propose_status_for_each: 7_000_000,
            perform_action_base: 70_000_000,
            perform_action_for_each: 30_000_000,
        }
    }

    fn make_client(proxy: Arc<StubProxy>) -> MultiversXClient {
        MultiversXClient::new(ArgsMultiversXClient {
            proxy,
            tokens_mapper: Arc::new(crate::testing::StubTokensMapper::default()),
            gas_map: gas_map(),
            allow_delta: 5,
            status_handler: Arc::new(StatusHandler::new("mvx-client")),
        })
        .unwrap()
    }

    fn sample_batch() -> TransferBatch {
        TransferBatch {
            id: 42,
            block_number: 1,
            deposits: vec![DepositTransfer::default()],
            statuses: vec![0],
        }
    }

    #[tokio::test]
    async fn sign_transfer_signs_once_and_resolves_quorum_by_action_id() {
        let proxy = Arc::new(StubProxy::default());
        let client = make_client(proxy.clone());
        let batch = sample_batch();

        let msg_hash = client.sign_transfer(&batch).await.unwrap();
        assert_eq!(proxy.sign_calls.load(Ordering::SeqCst), 1);

        // the returned handle resolves back to the same action
        proxy.quorum_reached.store(true, Ordering::SeqCst);
        assert!(client.is_quorum_reached(&batch, msg_hash).await.unwrap());
    }

    #[tokio::test]
    async fn an_already_signed_action_is_not_signed_again() {
        let proxy = Arc::new(StubProxy::default());
        proxy.already_signed.store(true, Ordering::SeqCst);
        let client = make_client(proxy.clone());

        client.sign_transfer(&sample_batch()).await.unwrap();
        assert_eq!(proxy.sign_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transfer_and_set_status_handles_differ() {
        let proxy = Arc::new(StubProxy::default());
        let client = make_client(proxy);
        let batch = sample_batch();

        let transfer_hash = client.sign_transfer(&batch).await.unwrap();
        let status_hash = client.sign_set_status(&batch).await.unwrap();
        assert_ne!(transfer_hash, status_hash);
    }

    #[tokio::test]
    async fn statuses_require_finality() {
        let proxy = Arc::new(StubProxy::default());
        let client = make_client(proxy.clone());
        assert!(matches!(
            client.get_transactions_statuses(42).await,
            Err(Error::StatusIsNotFinal)
        ));

        proxy.statuses_final.store(true, Ordering::SeqCst);
        assert_eq!(
            client.get_transactions_statuses(42).await.unwrap(),
            vec![3, 4]
        );
    }

    #[tokio::test]
    async fn required_balance_is_enforced_for_locked_tokens() {
        let proxy = Arc::new(StubProxy::default());
        let client = make_client(proxy);
        let result = client
            .check_required_balance(b"WEGLD-abcdef", U256::from(501u64))
            .await;
        assert!(matches!(
            result,
            Err(Error::InsufficientErc20Balance { .. })
        ));

        let proxy = Arc::new(StubProxy::default());
        let client = make_client(proxy);
        assert!(client
            .check_required_balance(b"WEGLD-abcdef", U256::from(500u64))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn deposits_count_mismatch_is_rejected() {
        let proxy = Arc::new(StubProxy {
            batch: Some(RawMvxBatch {
                id: 42,
                block_number: 10,
                deposits_count: 2,
                deposits: vec![RawMvxDeposit {
                    nonce: 1,
                    from: vec![7; 32],
                    to: vec![8; 20],
                    token_identifier: b"WEGLD-abcdef".to_vec(),
                    amount: U256::from(100u64),
                    data: None,
                }],
                is_final: true,
            }),
            ..Default::default()
        });
        let client = make_client(proxy);
        assert!(matches!(
            client.get_batch(42).await,
            Err(Error::DepositsAndBatchDepositsCountDiffer {
                declared: 2,
                fetched: 1,
            })
        ));
    }
}
