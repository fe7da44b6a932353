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

//! The collaborator trait the MultiversX client consumes. The gateway
//! wire encoding and the contract call layout live behind it.

use async_trait::async_trait;
use ethers::types::U256;
use mvx_bridge_core::TransferBatch;
use mvx_bridge_relayer_utils::Result;

/// One deposit as reported by the safe contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMvxDeposit {
    /// The deposit nonce.
    pub nonce: u64,
    /// The 32-byte depositing address.
    pub from: Vec<u8>,
    /// The raw recipient bytes on the counterparty chain.
    pub to: Vec<u8>,
    /// The token identifier (ticker bytes).
    pub token_identifier: Vec<u8>,
    /// The deposited amount.
    pub amount: U256,
    /// Optional SC-call instruction bytes.
    pub data: Option<Vec<u8>>,
}

/// A batch as reported by the safe contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMvxBatch {
    /// The batch nonce.
    pub id: u64,
    /// The block that sealed the batch.
    pub block_number: u64,
    /// How many deposits the batch declares.
    pub deposits_count: u32,
    /// The deposits.
    pub deposits: Vec<RawMvxDeposit>,
    /// Whether the chain considers the batch final.
    pub is_final: bool,
}

/// Everything the MultiversX client asks of the gateway and the
/// contracts.
#[async_trait]
pub trait MvxProxy: Send + Sync {
    /// The batch with the given nonce, or `None`.
    async fn get_batch(&self, nonce: u64) -> Result<Option<RawMvxBatch>>;
    /// The id of the last executed counterparty batch.
    async fn last_executed_batch_id(&self) -> Result<u64>;
    /// The nonce of the last executed counterparty deposit.
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
    async fn was_transfer_proposed(&self, batch: &TransferBatch) -> Result<bool>;
    /// Submits a transfer proposal.
    async fn propose_transfer(
        &self,
        batch: &TransferBatch,
        gas_limit: u64,
    ) -> Result<String>;
    /// Whether a set-status proposal for the batch is on chain.
    async fn was_set_status_proposed(
        &self,
        batch: &TransferBatch,
    ) -> Result<bool>;
    /// Submits a set-status proposal.
    async fn propose_set_status(
        &self,
        batch: &TransferBatch,
        gas_limit: u64,
    ) -> Result<String>;

    /// The action id bound to the batch's transfer proposal.
    async fn action_id_for_propose_transfer(
        &self,
        batch: &TransferBatch,
    ) -> Result<u64>;
    /// The action id bound to the batch's set-status proposal.
    async fn action_id_for_set_status(&self, batch: &TransferBatch)
        -> Result<u64>;
    /// Whether this relayer already signed the action.
    async fn was_action_signed(&self, action_id: u64) -> Result<bool>;
    /// Signs the action on chain.
    async fn sign_action(&self, action_id: u64, gas_limit: u64) -> Result<String>;
    /// Whether the action gathered the multisig quorum.
    async fn quorum_reached_for_action(&self, action_id: u64) -> Result<bool>;
    /// Performs the action on chain.
    async fn perform_action(
        &self,
        action_id: u64,
        gas_limit: u64,
    ) -> Result<String>;

    /// Whether the token is minted/burned on this chain.
    async fn is_mint_burn_token(&self, token: &[u8]) -> Result<bool>;
    /// Whether the token is native to this chain.
    async fn is_native_token(&self, token: &[u8]) -> Result<bool>;
    /// The safe's balance of the token.
    async fn safe_token_balance(&self, token: &[u8]) -> Result<U256>;

    /// The latest block nonce, for availability checks.
    async fn latest_block_nonce(&self) -> Result<u64>;

    /// The MultiversX token bound to an ERC20 address.
    async fn token_id_for_erc20_address(&self, address: &[u8]) -> Result<Vec<u8>>;
    /// The ERC20 address bound to a MultiversX token.
    async fn erc20_address_for_token_id(&self, token_id: &[u8]) -> Result<Vec<u8>>;
    /// The authorised relayer set.
    async fn get_all_staked_relayers(&self) -> Result<Vec<Vec<u8>>>;
}
