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

//! The collaborator traits the Ethereum client consumes. The multisig
//! and safe contracts are external; everything chain-shaped enters the
//! client through these interfaces.

use async_trait::async_trait;
use ethers::types::{Address, U256};
use mvx_bridge_relayer_utils::Result;

/// The header of a batch as reported by the safe contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvmBatchHeader {
    /// The batch nonce.
    pub nonce: u64,
    /// The block that sealed the batch.
    pub block_number: u64,
    /// How many deposits the batch declares.
    pub deposits_count: u32,
}

/// One deposit as reported by the safe contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmDeposit {
    /// The deposit nonce.
    pub nonce: u64,
    /// The depositing address.
    pub depositor: Address,
    /// The raw recipient bytes on the counterparty chain.
    pub recipient: Vec<u8>,
    /// The deposited ERC20 token.
    pub token_address: Address,
    /// The deposited amount.
    pub amount: U256,
}

/// An SC-call metadata event attached to a deposit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScCallEvent {
    /// The deposit the call data belongs to.
    pub deposit_nonce: u64,
    /// The raw encoded call data.
    pub call_data: Vec<u8>,
}

/// Submission options resolved by the client before every transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOptions {
    /// The relayer's account nonce.
    pub nonce: U256,
    /// The gas price from the oracle.
    pub gas_price: U256,
    /// The computed gas limit.
    pub gas_limit: u64,
    /// The chain id the transaction is bound to.
    pub chain_id: U256,
}

/// The per-deposit argument lists an execution packs, extracted from a
/// batch in deposit order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgLists {
    /// The recipient addresses.
    pub recipients: Vec<Address>,
    /// The destination token addresses.
    pub tokens: Vec<Address>,
    /// The transferred amounts.
    pub amounts: Vec<U256>,
    /// The deposit nonces.
    pub nonces: Vec<U256>,
}

/// Everything the Ethereum client asks of the chain and its contracts.
#[async_trait]
pub trait EthereumChainWrapper: Send + Sync {
    /// The batch header for a nonce, plus the chain's finality verdict,
    /// or `None` when no batch with this nonce exists.
    async fn get_batch(&self, nonce: u64) -> Result<Option<(EvmBatchHeader, bool)>>;
    /// The deposits of a batch.
    async fn get_batch_deposits(&self, nonce: u64) -> Result<Vec<EvmDeposit>>;
    /// The SC-call metadata events of a batch.
    async fn get_batch_sc_metadata(&self, nonce: u64) -> Result<Vec<ScCallEvent>>;
    /// The id of the last executed batch.
    async fn last_executed_batch_id(&self) -> Result<u64>;
    /// The nonce of the last executed deposit.
    async fn last_executed_deposit_nonce(&self) -> Result<u64>;
    /// Whether the batch was executed.
    async fn was_batch_executed(&self, batch_id: u64) -> Result<bool>;
    /// The per-deposit statuses after execution and their finality.
    async fn get_statuses_after_execution(
        &self,
        batch_id: u64,
    ) -> Result<(Vec<u8>, bool)>;
    /// The multisig quorum.
    async fn quorum(&self) -> Result<U256>;
    /// Whether the multisig is paused.
    async fn is_paused(&self) -> Result<bool>;

    /// Whether a transfer proposal for the batch is on chain.
    async fn was_transfer_proposed(&self, batch_id: u64) -> Result<bool>;
    /// Submits a transfer proposal.
    async fn propose_transfer(
        &self,
        options: &TxOptions,
        lists: &ArgLists,
        batch_id: u64,
    ) -> Result<String>;
    /// Whether a set-status proposal for the batch is on chain.
    async fn was_set_status_proposed(&self, batch_id: u64) -> Result<bool>;
    /// Submits a set-status proposal.
    async fn propose_set_status(
        &self,
        options: &TxOptions,
        statuses: &[u8],
        batch_id: u64,
    ) -> Result<String>;
    /// Submits the transfer execution with the gathered signatures.
    async fn execute_transfer(
        &self,
        options: &TxOptions,
        lists: &ArgLists,
        batch_id: u64,
        signatures: Vec<Vec<u8>>,
    ) -> Result<String>;
    /// Submits the set-status execution with the gathered signatures.
    async fn execute_set_status(
        &self,
        options: &TxOptions,
        statuses: &[u8],
        batch_id: u64,
        signatures: Vec<Vec<u8>>,
    ) -> Result<String>;

    /// Whether the token is minted/burned on this chain.
    async fn is_mint_burn_token(&self, token: Address) -> Result<bool>;
    /// Whether the token is native to this chain.
    async fn is_native_token(&self, token: Address) -> Result<bool>;

    /// The current block number.
    async fn block_number(&self) -> Result<u64>;
    /// The account nonce at a block.
    async fn nonce_at(&self, address: Address, block: u64) -> Result<U256>;
    /// The native-token balance of an account.
    async fn balance_at(&self, address: Address) -> Result<U256>;
    /// The chain id.
    async fn chain_id(&self) -> Result<U256>;
}

/// ERC20 balance queries, kept separate from the chain wrapper so tests
/// can substitute token state independently.
#[async_trait]
pub trait Erc20ContractsHolder: Send + Sync {
    /// The `balanceOf(holder)` of the given ERC20 contract.
    async fn balance_of(&self, token: Address, holder: Address) -> Result<U256>;
}
