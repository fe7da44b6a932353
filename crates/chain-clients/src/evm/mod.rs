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

//! The Ethereum side of the bridge: batch ingestion from the safe
//! contract, signature creation/broadcast and multisig submissions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::Token;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;
use mvx_bridge_core::status::{
    StatusHandler, METRIC_ETH_CLIENT_STATUS, METRIC_LAST_ETH_CLIENT_ERROR,
    METRIC_LAST_QUERIED_ETH_BLOCK, METRIC_NUM_ETH_CLIENT_REQUESTS,
    METRIC_NUM_ETH_CLIENT_TRANSACTIONS,
};
use mvx_bridge_core::{converters, DepositTransfer, TransferBatch};
use mvx_bridge_relayer_utils::{Error, Result};
use tokio::sync::Mutex;

use crate::availability::AvailabilityTracker;
use crate::{
    BridgeChain, GasHandler, SignatureBroadcaster, SignaturesReader,
    TokensMapper,
};

/// Concrete ethers-backed contract adapters.
pub mod contracts;
/// The collaborator traits of the Ethereum client.
pub mod wrapper;

pub use wrapper::{
    ArgLists, Erc20ContractsHolder, EthereumChainWrapper, EvmBatchHeader,
    EvmDeposit, ScCallEvent, TxOptions,
};

const MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";
const MIN_ALLOWED_DELTA: u64 = 1;

/// The arguments DTO for [`EthereumClient::new`].
pub struct ArgsEthereumClient {
    /// Chain and contract access.
    pub wrapper: Arc<dyn EthereumChainWrapper>,
    /// ERC20 balance queries.
    pub erc20_contracts_holder: Arc<dyn Erc20ContractsHolder>,
    /// Source-to-destination token translation.
    pub tokens_mapper: Arc<dyn TokensMapper>,
    /// The gathered p2p signatures.
    pub signature_holder: Arc<dyn SignaturesReader>,
    /// The reverse edge used to publish own signatures.
    pub broadcaster: Arc<dyn SignatureBroadcaster>,
    /// The relayer's Ethereum wallet.
    pub wallet: LocalWallet,
    /// The safe contract address.
    pub safe_contract_address: Address,
    /// The gas price oracle.
    pub gas_handler: Arc<dyn GasHandler>,
    /// Base gas limit of an execution.
    pub transfer_gas_limit_base: u64,
    /// Additional gas limit per deposit.
    pub transfer_gas_limit_for_each: u64,
    /// Same-block tolerance of the availability tracker.
    pub allow_delta: u64,
    /// The client's status metrics.
    pub status_handler: Arc<StatusHandler>,
}

/// The Ethereum implementation of [`BridgeChain`].
pub struct EthereumClient {
    wrapper: Arc<dyn EthereumChainWrapper>,
    erc20_contracts_holder: Arc<dyn Erc20ContractsHolder>,
    tokens_mapper: Arc<dyn TokensMapper>,
    signature_holder: Arc<dyn SignaturesReader>,
    broadcaster: Arc<dyn SignatureBroadcaster>,
    wallet: LocalWallet,
    relayer_address: Address,
    safe_contract_address: Address,
    gas_handler: Arc<dyn GasHandler>,
    transfer_gas_limit_base: u64,
    transfer_gas_limit_for_each: u64,
    status_handler: Arc<StatusHandler>,
    availability: Mutex<AvailabilityTracker>,
}

impl EthereumClient {
    /// Creates a new Ethereum client.
    pub fn new(args: ArgsEthereumClient) -> Result<Self> {
        if args.transfer_gas_limit_base == 0
            || args.transfer_gas_limit_for_each == 0
        {
            return Err(Error::InvalidValue(
                "for Ethereum transfer gas limits, got: 0".to_string(),
            ));
        }
        if args.allow_delta < MIN_ALLOWED_DELTA {
            return Err(Error::InvalidValue(format!(
                "for args.AllowDelta, got: {}, minimum: {}",
                args.allow_delta, MIN_ALLOWED_DELTA
            )));
        }

        let relayer_address = args.wallet.address();
        tracing::info!(
            relayer_address = %converters::to_hex_string(relayer_address.as_bytes()),
            safe_contract_address = %converters::to_hex_string(args.safe_contract_address.as_bytes()),
            "created Ethereum client"
        );

        let availability = Mutex::new(AvailabilityTracker::new(
            args.status_handler.clone(),
            METRIC_ETH_CLIENT_STATUS,
            METRIC_LAST_ETH_CLIENT_ERROR,
            args.allow_delta,
        ));

        Ok(Self {
            wrapper: args.wrapper,
            erc20_contracts_holder: args.erc20_contracts_holder,
            tokens_mapper: args.tokens_mapper,
            signature_holder: args.signature_holder,
            broadcaster: args.broadcaster,
            wallet: args.wallet,
            relayer_address,
            safe_contract_address: args.safe_contract_address,
            gas_handler: args.gas_handler,
            transfer_gas_limit_base: args.transfer_gas_limit_base,
            transfer_gas_limit_for_each: args.transfer_gas_limit_for_each,
            status_handler: args.status_handler,
            availability,
        })
    }

    fn track_request(&self) {
        self.status_handler
            .add_int_metric(METRIC_NUM_ETH_CLIENT_REQUESTS, 1);
    }

    fn track_transaction(&self) {
        self.status_handler
            .add_int_metric(METRIC_NUM_ETH_CLIENT_TRANSACTIONS, 1);
    }

    fn transfer_gas_limit(&self, num_deposits: usize) -> u64 {
        self.transfer_gas_limit_base
            + num_deposits as u64 * self.transfer_gas_limit_for_each
    }

    async fn transaction_options(&self, gas_limit: u64) -> Result<TxOptions> {
        let block = self.wrapper.block_number().await?;
        let nonce = self.wrapper.nonce_at(self.relayer_address, block).await?;
        let chain_id = self.wrapper.chain_id().await?;
        let gas_price = self.gas_handler.get_current_gas_price()?;

        Ok(TxOptions {
            nonce,
            gas_price,
            gas_limit,
            chain_id,
        })
    }

    async fn check_relayer_funds_for_fee(&self, fee: U256) -> Result<()> {
        let existing = self.wrapper.balance_at(self.relayer_address).await?;
        if fee > existing {
            return Err(Error::InsufficientBalance {
                existing: existing.to_string(),
                required: fee.to_string(),
            });
        }
        tracing::debug!(
            existing_balance = %existing,
            needed = %fee,
            "checked relayer balance"
        );
        Ok(())
    }

    fn gathered_signatures(
        &self,
        msg_hash: H256,
        quorum: usize,
    ) -> Result<Vec<Vec<u8>>> {
        let mut signatures =
            self.signature_holder.signatures(msg_hash.as_bytes());
        if signatures.len() < quorum {
            return Err(Error::QuorumNotReached {
                num_signatures: signatures.len(),
                quorum,
            });
        }
        if signatures.len() > quorum {
            tracing::debug!(
                quorum,
                total_signatures = signatures.len(),
                "reducing the size of the signatures set"
            );
            signatures.truncate(quorum);
        }
        Ok(signatures)
    }

    async fn submission_preamble(
        &self,
        num_deposits: usize,
        msg_hash: H256,
        quorum: usize,
    ) -> Result<(TxOptions, Vec<Vec<u8>>)> {
        let is_paused = self.wrapper.is_paused().await?;
        if is_paused {
            return Err(Error::MultisigContractPaused);
        }

        let gas_limit = self.transfer_gas_limit(num_deposits);
        let options = self.transaction_options(gas_limit).await?;
        let signatures = self.gathered_signatures(msg_hash, quorum)?;

        let fee = U256::from(options.gas_limit) * options.gas_price;
        self.check_relayer_funds_for_fee(fee).await?;

        Ok((options, signatures))
    }

    fn token_address(token: &[u8]) -> Result<Address> {
        if token.len() != mvx_bridge_core::ETH_ADDRESS_LEN {
            return Err(Error::InvalidAddressBytes(hex::encode(token)));
        }
        Ok(Address::from_slice(token))
    }
}

/// Builds the per-deposit argument lists an Ethereum execution packs,
/// in deposit order.
pub fn extract_arg_lists(batch: &TransferBatch) -> Result<ArgLists> {
    let mut lists = ArgLists::default();
    for deposit in &batch.deposits {
        if deposit.to_bytes.len() != mvx_bridge_core::ETH_ADDRESS_LEN {
            return Err(Error::InvalidAddressBytes(hex::encode(
                &deposit.to_bytes,
            )));
        }
        lists
            .recipients
            .push(Address::from_slice(&deposit.to_bytes));
        lists
            .tokens
            .push(EthereumClient::token_address(&deposit.destination_token_bytes)?);
        lists.amounts.push(deposit.amount);
        lists.nonces.push(U256::from(deposit.nonce));
    }
    Ok(lists)
}

/// The batch execution message hash, reproducible across
/// implementations:
/// `keccak256(prefix || keccak256(abi.encode(recipients, tokens,
/// amounts, nonces, batch_id, "ExecuteBatchedTransfer")))`.
pub fn generate_transfer_message_hash(lists: &ArgLists, batch_id: u64) -> H256 {
    let encoded = ethers::abi::encode(&[
        Token::Array(lists.recipients.iter().copied().map(Token::Address).collect()),
        Token::Array(lists.tokens.iter().copied().map(Token::Address).collect()),
        Token::Array(lists.amounts.iter().copied().map(Token::Uint).collect()),
        Token::Array(lists.nonces.iter().copied().map(Token::Uint).collect()),
        Token::Uint(U256::from(batch_id)),
        Token::String("ExecuteBatchedTransfer".to_string()),
    ]);
    wrap_in_signed_message_prefix(keccak256(encoded))
}

/// The set-status message hash, mirroring the transfer hash with the
/// statuses byte string in place of the argument lists.
pub fn generate_set_status_message_hash(statuses: &[u8], batch_id: u64) -> H256 {
    let encoded = ethers::abi::encode(&[
        Token::Bytes(statuses.to_vec()),
        Token::Uint(U256::from(batch_id)),
        Token::String("ExecuteBatchedSetStatus".to_string()),
    ]);
    wrap_in_signed_message_prefix(keccak256(encoded))
}

fn wrap_in_signed_message_prefix(inner: [u8; 32]) -> H256 {
    let mut prefixed = MESSAGE_PREFIX.to_vec();
    prefixed.extend_from_slice(&inner);
    H256::from(keccak256(prefixed))
}

#[async_trait]
impl BridgeChain for EthereumClient {
    fn name(&self) -> &'static str {
        "ethereum"
    }

    async fn last_executed_batch_id(&self) -> Result<u64> {
        self.track_request();
        self.wrapper.last_executed_batch_id().await
    }

    async fn get_batch(&self, nonce: u64) -> Result<Option<(TransferBatch, bool)>> {
        tracing::info!(nonce, "getting batch");
        self.track_request();
        let (header, is_final) = match self.wrapper.get_batch(nonce).await? {
            None => return Ok(None),
            Some(answer) => answer,
        };
        let deposits = self.wrapper.get_batch_deposits(nonce).await?;
        if header.deposits_count as usize != deposits.len() {
            return Err(Error::DepositsAndBatchDepositsCountDiffer {
                declared: header.deposits_count as u64,
                fetched: deposits.len() as u64,
            });
        }
        if header.nonce != nonce || deposits.is_empty() {
            return Err(Error::BatchNotFound {
                requested: nonce,
                fetched: header.nonce,
                num_deposits: deposits.len(),
            });
        }

        self.status_handler.set_int_metric(
            METRIC_LAST_QUERIED_ETH_BLOCK,
            header.block_number as i64,
        );

        let mut batch = TransferBatch {
            id: header.nonce,
            block_number: header.block_number,
            deposits: Vec::with_capacity(deposits.len()),
            statuses: vec![0u8; deposits.len()],
        };

        // one mapping lookup per distinct token within this call
        let mut cached_tokens: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();
        for deposit in deposits {
            let source_token = deposit.token_address.as_bytes().to_vec();
            let destination_token = match cached_tokens.get(&source_token) {
                Some(converted) => converted.clone(),
                None => {
                    let converted =
                        self.tokens_mapper.convert_token(&source_token).await?;
                    cached_tokens.insert(source_token.clone(), converted.clone());
                    converted
                }
            };

            batch.deposits.push(DepositTransfer {
                nonce: deposit.nonce,
                displayable_to: converters::to_bech32_string_silent(
                    &deposit.recipient,
                ),
                to_bytes: deposit.recipient,
                from_bytes: deposit.depositor.as_bytes().to_vec(),
                displayable_from: converters::to_hex_string(
                    deposit.depositor.as_bytes(),
                ),
                displayable_token: converters::to_hex_string(&source_token),
                source_token_bytes: source_token,
                destination_token_bytes: destination_token,
                amount: deposit.amount,
                data: None,
                displayable_data: String::new(),
            });
        }

        // attach the SC-call metadata emitted alongside the deposits
        let events = self.wrapper.get_batch_sc_metadata(batch.id).await?;
        for deposit in batch.deposits.iter_mut() {
            if let Some(event) =
                events.iter().find(|e| e.deposit_nonce == deposit.nonce)
            {
                deposit.displayable_data = hex::encode(&event.call_data);
                deposit.data = Some(event.call_data.clone());
            }
        }

        Ok(Some((batch, is_final)))
    }

    async fn last_executed_deposit_nonce(&self) -> Result<u64> {
        self.track_request();
        self.wrapper.last_executed_deposit_nonce().await
    }

    async fn was_executed(&self, batch_id: u64) -> Result<bool> {
        self.track_request();
        self.wrapper.was_batch_executed(batch_id).await
    }

    async fn get_transactions_statuses(&self, batch_id: u64) -> Result<Vec<u8>> {
        self.track_request();
        let (statuses, is_final) =
            self.wrapper.get_statuses_after_execution(batch_id).await?;
        if !is_final {
            return Err(Error::StatusIsNotFinal);
        }
        Ok(statuses)
    }

    async fn get_quorum_size(&self) -> Result<U256> {
        self.track_request();
        let quorum = self.wrapper.quorum().await?;
        if quorum < U256::one() {
            return Err(Error::InvalidValue(format!(
                "for quorum size, got: {quorum}, minimum: 1"
            )));
        }
        Ok(quorum)
    }

    async fn is_quorum_reached(
        &self,
        _batch: &TransferBatch,
        msg_hash: H256,
    ) -> Result<bool> {
        let quorum = self.get_quorum_size().await?.as_usize();
        let signatures = self.signature_holder.signatures(msg_hash.as_bytes());
        Ok(signatures.len() >= quorum)
    }

    async fn was_transfer_proposed(&self, batch: &TransferBatch) -> Result<bool> {
        self.track_request();
        self.wrapper.was_transfer_proposed(batch.id).await
    }

    async fn propose_transfer(&self, batch: &TransferBatch) -> Result<String> {
        let lists = extract_arg_lists(batch)?;
        let gas_limit = self.transfer_gas_limit(batch.deposits.len());
        let options = self.transaction_options(gas_limit).await?;
        let tx_hash = self
            .wrapper
            .propose_transfer(&options, &lists, batch.id)
            .await?;
        self.track_transaction();
        Ok(tx_hash)
    }

    async fn was_set_status_proposed(
        &self,
        batch: &TransferBatch,
    ) -> Result<bool> {
        self.track_request();
        self.wrapper.was_set_status_proposed(batch.id).await
    }

    async fn propose_set_status(&self, batch: &TransferBatch) -> Result<String> {
        let gas_limit = self.transfer_gas_limit(batch.deposits.len());
        let options = self.transaction_options(gas_limit).await?;
        let tx_hash = self
            .wrapper
            .propose_set_status(&options, &batch.statuses, batch.id)
            .await?;
        self.track_transaction();
        Ok(tx_hash)
    }

    async fn sign_transfer(&self, batch: &TransferBatch) -> Result<H256> {
        let lists = extract_arg_lists(batch)?;
        let msg_hash = generate_transfer_message_hash(&lists, batch.id);
        let signature = self.wallet.sign_hash(msg_hash)?;
        self.broadcaster
            .broadcast_signature(signature.to_vec(), msg_hash.as_bytes().to_vec());
        tracing::info!(hash = %msg_hash, batch_id = batch.id, "generated message hash on Ethereum");
        Ok(msg_hash)
    }

    async fn sign_set_status(&self, batch: &TransferBatch) -> Result<H256> {
        let msg_hash =
            generate_set_status_message_hash(&batch.statuses, batch.id);
        let signature = self.wallet.sign_hash(msg_hash)?;
        self.broadcaster
            .broadcast_signature(signature.to_vec(), msg_hash.as_bytes().to_vec());
        tracing::info!(hash = %msg_hash, batch_id = batch.id, "generated set-status hash on Ethereum");
        Ok(msg_hash)
    }

    async fn execute_transfer(
        &self,
        msg_hash: H256,
        batch: &TransferBatch,
        quorum: usize,
    ) -> Result<String> {
        tracing::info!("executing transfer {batch}");
        let (options, signatures) = self
            .submission_preamble(batch.deposits.len(), msg_hash, quorum)
            .await?;
        let lists = extract_arg_lists(batch)?;
        let tx_hash = self
            .wrapper
            .execute_transfer(&options, &lists, batch.id, signatures)
            .await?;
        self.track_transaction();
        tracing::info!(batch_id = batch.id, hash = %tx_hash, "executed transfer transaction");
        Ok(tx_hash)
    }

    async fn execute_set_status(
        &self,
        msg_hash: H256,
        batch: &TransferBatch,
        quorum: usize,
    ) -> Result<String> {
        let (options, signatures) = self
            .submission_preamble(batch.deposits.len(), msg_hash, quorum)
            .await?;
        let tx_hash = self
            .wrapper
            .execute_set_status(&options, &batch.statuses, batch.id, signatures)
            .await?;
        self.track_transaction();
        tracing::info!(batch_id = batch.id, hash = %tx_hash, "executed set-status transaction");
        Ok(tx_hash)
    }

    async fn check_required_balance(
        &self,
        token: &[u8],
        amount: U256,
    ) -> Result<()> {
        let token = Self::token_address(token)?;
        if self.wrapper.is_mint_burn_token(token).await? {
            return Ok(());
        }
        let existing = self
            .erc20_contracts_holder
            .balance_of(token, self.safe_contract_address)
            .await?;
        if amount > existing {
            return Err(Error::InsufficientErc20Balance {
                existing: existing.to_string(),
                required: amount.to_string(),
                token: converters::to_hex_string(token.as_bytes()),
            });
        }
        tracing::debug!(
            token = %converters::to_hex_string(token.as_bytes()),
            existing_balance = %existing,
            needed = %amount,
            "checked ERC20 balance"
        );
        Ok(())
    }

    async fn is_mint_burn_token(&self, token: &[u8]) -> Result<bool> {
        self.track_request();
        self.wrapper
            .is_mint_burn_token(Self::token_address(token)?)
            .await
    }

    async fn is_native_token(&self, token: &[u8]) -> Result<bool> {
        self.track_request();
        self.wrapper
            .is_native_token(Self::token_address(token)?)
            .await
    }

    async fn check_client_availability(&self) -> Result<()> {
        let fetch_result = self
            .wrapper
            .block_number()
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
    use crate::testing::{
        StubBroadcaster, StubErc20Holder, StubEthereumWrapper, StubGasHandler,
        StubSignaturesReader, StubTokensMapper,
    };

    fn test_wallet() -> LocalWallet {
        // fixed key so tests are deterministic
        "4c0883a69102937d6231471b5dbb6204fe51296170827936ea5cce4b76994b0f"
            .parse()
            .unwrap()
    }

    fn sample_batch(num_deposits: usize) -> TransferBatch {
        TransferBatch {
            id: 112,
            block_number: 900,
            deposits: (0..num_deposits)
                .map(|i| DepositTransfer {
                    nonce: i as u64 + 1,
                    to_bytes: vec![0x11; 20],
                    destination_token_bytes: vec![0x22; 20],
                    source_token_bytes: vec![0x33; 32],
                    amount: U256::from(1_000u64),
                    ..Default::default()
                })
                .collect(),
            statuses: vec![0; num_deposits],
        }
    }

    fn client_with(
        wrapper: StubEthereumWrapper,
        signatures: StubSignaturesReader,
    ) -> EthereumClient {
        EthereumClient::new(ArgsEthereumClient {
            wrapper: Arc::new(wrapper),
            erc20_contracts_holder: Arc::new(StubErc20Holder::default()),
            tokens_mapper: Arc::new(StubTokensMapper::default()),
            signature_holder: Arc::new(signatures),
            broadcaster: Arc::new(StubBroadcaster::default()),
            wallet: test_wallet(),
            safe_contract_address: Address::repeat_byte(0x5a),
            gas_handler: Arc::new(StubGasHandler::new(U256::from(50u64))),
            transfer_gas_limit_base: 350_000,
            transfer_gas_limit_for_each: 30_000,
            allow_delta: 5,
            status_handler: Arc::new(StatusHandler::new("eth-client")),
        })
        .unwrap()
    }

    #[test]
    fn message_hash_is_deterministic_and_batch_id_sensitive() {
        let batch = sample_batch(2);
        let lists = extract_arg_lists(&batch).unwrap();

        let first = generate_transfer_message_hash(&lists, 112);
        let second = generate_transfer_message_hash(&lists, 112);
        let other = generate_transfer_message_hash(&lists, 113);
        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_ne!(first, generate_set_status_message_hash(&[3, 3], 112));
    }

    #[tokio::test]
    async fn get_batch_rejects_a_deposit_count_mismatch() {
        let mut wrapper = StubEthereumWrapper::default();
        wrapper.batch_header = Some(EvmBatchHeader {
            nonce: 7,
            block_number: 100,
            deposits_count: 2,
        });
        wrapper.deposits = vec![EvmDeposit {
            nonce: 1,
            depositor: Address::repeat_byte(1),
            recipient: vec![2; 32],
            token_address: Address::repeat_byte(3),
            amount: U256::from(10u64),
        }];

        let client = client_with(wrapper, StubSignaturesReader::default());
        let result = client.get_batch(7).await;
        assert!(matches!(
            result,
            Err(Error::DepositsAndBatchDepositsCountDiffer {
                declared: 2,
                fetched: 1,
            })
        ));
    }

    #[tokio::test]
    async fn get_batch_translates_tokens_once_per_distinct_token() {
        let token = Address::repeat_byte(3);
        let mut wrapper = StubEthereumWrapper::default();
        wrapper.batch_header = Some(EvmBatchHeader {
            nonce: 7,
            block_number: 100,
            deposits_count: 2,
        });
        wrapper.deposits = (1..=2)
            .map(|nonce| EvmDeposit {
                nonce,
                depositor: Address::repeat_byte(1),
                recipient: vec![2; 32],
                token_address: token,
                amount: U256::from(10u64),
            })
            .collect();

        let mapper = StubTokensMapper::default();
        let conversions = mapper.conversions.clone();
        let client = EthereumClient::new(ArgsEthereumClient {
            wrapper: Arc::new(wrapper),
            erc20_contracts_holder: Arc::new(StubErc20Holder::default()),
            tokens_mapper: Arc::new(mapper),
            signature_holder: Arc::new(StubSignaturesReader::default()),
            broadcaster: Arc::new(StubBroadcaster::default()),
            wallet: test_wallet(),
            safe_contract_address: Address::repeat_byte(0x5a),
            gas_handler: Arc::new(StubGasHandler::new(U256::from(50u64))),
            transfer_gas_limit_base: 350_000,
            transfer_gas_limit_for_each: 30_000,
            allow_delta: 5,
            status_handler: Arc::new(StatusHandler::new("eth-client")),
        })
        .unwrap();

        let (batch, is_final) = client.get_batch(7).await.unwrap().unwrap();
        assert!(is_final);
        assert_eq!(batch.deposits.len(), 2);
        assert_eq!(batch.statuses, vec![0, 0]);
        assert_eq!(*conversions.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn execute_transfer_requires_quorum_signatures() {
        let mut wrapper = StubEthereumWrapper::default();
        wrapper.quorum = U256::from(10u64);
        let signatures = StubSignaturesReader::with_signatures(9);

        let client = client_with(wrapper, signatures);
        let batch = sample_batch(1);
        let result = client
            .execute_transfer(H256::repeat_byte(7), &batch, 10)
            .await;
        assert!(matches!(
            result,
            Err(Error::QuorumNotReached {
                num_signatures: 9,
                quorum: 10,
            })
        ));
    }

    #[tokio::test]
    async fn execute_transfer_trims_extra_signatures_in_holder_order() {
        let wrapper = StubEthereumWrapper::default();
        let submitted = wrapper.submitted_signatures.clone();
        let signatures = StubSignaturesReader::with_signatures(5);

        let client = client_with(wrapper, signatures);
        let batch = sample_batch(1);
        client
            .execute_transfer(H256::repeat_byte(7), &batch, 3)
            .await
            .unwrap();

        let submitted = submitted.lock().unwrap().clone();
        assert_eq!(submitted.len(), 3);
        // holder order is preserved: the first `quorum` signatures win
        assert_eq!(submitted, vec![vec![0u8; 65], vec![1u8; 65], vec![2u8; 65]]);
    }

    #[tokio::test]
    async fn execute_transfer_refuses_when_the_contract_is_paused() {
        let mut wrapper = StubEthereumWrapper::default();
        wrapper.paused = true;
        let client = client_with(wrapper, StubSignaturesReader::with_signatures(3));
        let batch = sample_batch(1);
        let result = client
            .execute_transfer(H256::repeat_byte(7), &batch, 3)
            .await;
        assert!(matches!(result, Err(Error::MultisigContractPaused)));
    }

    #[tokio::test]
    async fn execute_transfer_checks_the_fee_balance() {
        let mut wrapper = StubEthereumWrapper::default();
        // gas limit 380_000 * gas price 50 = 19_000_000 > balance
        wrapper.relayer_balance = U256::from(1_000u64);
        let client = client_with(wrapper, StubSignaturesReader::with_signatures(3));
        let batch = sample_batch(1);
        let result = client
            .execute_transfer(H256::repeat_byte(7), &batch, 3)
            .await;
        assert!(matches!(result, Err(Error::InsufficientBalance { .. })));
    }

    #[tokio::test]
    async fn statuses_are_only_returned_when_final() {
        let mut wrapper = StubEthereumWrapper::default();
        wrapper.statuses = (vec![3, 4], false);
        let client = client_with(wrapper, StubSignaturesReader::default());
        assert!(matches!(
            client.get_transactions_statuses(1).await,
            Err(Error::StatusIsNotFinal)
        ));

        let mut wrapper = StubEthereumWrapper::default();
        wrapper.statuses = (vec![3, 4], true);
        let client = client_with(wrapper, StubSignaturesReader::default());
        assert_eq!(client.get_transactions_statuses(1).await.unwrap(), vec![3, 4]);
    }

    #[tokio::test]
    async fn a_zero_quorum_is_an_invalid_value() {
        let mut wrapper = StubEthereumWrapper::default();
        wrapper.quorum = U256::zero();
        let client = client_with(wrapper, StubSignaturesReader::default());
        let batch = sample_batch(1);
        assert!(matches!(
            client.is_quorum_reached(&batch, H256::zero()).await,
            Err(Error::InvalidValue(_))
        ));
    }

    #[tokio::test]
    async fn sign_transfer_broadcasts_a_65_byte_signature() {
        let wrapper = StubEthereumWrapper::default();
        let broadcaster = StubBroadcaster::default();
        let sent = broadcaster.sent.clone();
        let client = EthereumClient::new(ArgsEthereumClient {
            wrapper: Arc::new(wrapper),
            erc20_contracts_holder: Arc::new(StubErc20Holder::default()),
            tokens_mapper: Arc::new(StubTokensMapper::default()),
            signature_holder: Arc::new(StubSignaturesReader::default()),
            broadcaster: Arc::new(broadcaster),
            wallet: test_wallet(),
            safe_contract_address: Address::repeat_byte(0x5a),
            gas_handler: Arc::new(StubGasHandler::new(U256::from(50u64))),
            transfer_gas_limit_base: 350_000,
            transfer_gas_limit_for_each: 30_000,
            allow_delta: 5,
            status_handler: Arc::new(StatusHandler::new("eth-client")),
        })
        .unwrap();

        let batch = sample_batch(1);
        let msg_hash = client.sign_transfer(&batch).await.unwrap();

        let sent = sent.lock().unwrap();
        let (signature, hash) = sent.last().unwrap().clone();
        assert_eq!(hash, msg_hash.as_bytes().to_vec());
        assert_eq!(signature.len(), 65);
    }
}
