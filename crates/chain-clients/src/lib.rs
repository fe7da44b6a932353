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

#![warn(missing_docs)]
//! # Chain Clients Module 🕸️
//!
//! The uniform [`BridgeChain`] facade over the two chains, the gas price
//! oracle, the role providers, the client availability tracker and the
//! balance validator.

use async_trait::async_trait;
use ethers::types::{H256, U256};
use mvx_bridge_core::TransferBatch;
use mvx_bridge_relayer_utils::Result;

/// Client liveness tracking shared by both chain clients.
pub mod availability;
/// Native vs mint/burn token setup validation.
pub mod balance_validator;
/// The Ethereum-side gas price oracle.
pub mod gas_oracle;
/// Configurable fake collaborators for tests across the workspace.
pub mod testing;

/// The Ethereum chain client.
pub mod evm;
/// The MultiversX chain client.
pub mod mvx;
/// Authorised-relayer role providers.
pub mod roles;

/// The uniform facade hiding chain-specific semantics. Each half-bridge
/// drives one `source` and one `destination` implementation of this
/// trait; the state machine itself never sees a concrete chain.
#[async_trait]
pub trait BridgeChain: Send + Sync {
    /// A short chain name used in logs.
    fn name(&self) -> &'static str;

    /// The id of the last batch this chain considers executed; the next
    /// pending batch nonce is one above the counterpart's answer.
    async fn last_executed_batch_id(&self) -> Result<u64>;
    /// Returns the batch with the given nonce together with a flag
    /// meaning "the chain considers this state irreversible", or `None`
    /// when no such batch exists yet.
    async fn get_batch(&self, nonce: u64) -> Result<Option<(TransferBatch, bool)>>;
    /// The nonce of the last deposit this chain has seen executed; used
    /// to verify batch deposit nonces are consecutive.
    async fn last_executed_deposit_nonce(&self) -> Result<u64>;

    /// Returns true if the batch was executed on this chain.
    async fn was_executed(&self, batch_id: u64) -> Result<bool>;
    /// The per-deposit statuses after execution. Only returned when the
    /// underlying query is final ([`StatusIsNotFinal`] otherwise).
    ///
    /// [`StatusIsNotFinal`]: mvx_bridge_relayer_utils::Error::StatusIsNotFinal
    async fn get_transactions_statuses(&self, batch_id: u64) -> Result<Vec<u8>>;

    /// The multisig quorum size; at least 1.
    async fn get_quorum_size(&self) -> Result<U256>;
    /// Whether enough signatures were gathered for the message hash.
    async fn is_quorum_reached(
        &self,
        batch: &TransferBatch,
        msg_hash: H256,
    ) -> Result<bool>;

    /// Whether the transfer of this batch was already proposed here.
    async fn was_transfer_proposed(&self, batch: &TransferBatch) -> Result<bool>;
    /// Proposes the transfer of this batch; returns the tx hash.
    async fn propose_transfer(&self, batch: &TransferBatch) -> Result<String>;
    /// Whether the status report of this batch was already proposed here.
    async fn was_set_status_proposed(
        &self,
        batch: &TransferBatch,
    ) -> Result<bool>;
    /// Proposes the status report of this batch; returns the tx hash.
    async fn propose_set_status(&self, batch: &TransferBatch) -> Result<String>;

    /// Signs the proposed transfer locally and publishes the signature;
    /// returns the message hash the signature commits to.
    async fn sign_transfer(&self, batch: &TransferBatch) -> Result<H256>;
    /// Signs the proposed status report locally and publishes the
    /// signature; returns the message hash.
    async fn sign_set_status(&self, batch: &TransferBatch) -> Result<H256>;

    /// Submits the transfer execution backed by `quorum` gathered
    /// signatures; returns the tx hash.
    async fn execute_transfer(
        &self,
        msg_hash: H256,
        batch: &TransferBatch,
        quorum: usize,
    ) -> Result<String>;
    /// Submits the status-report execution; returns the tx hash.
    async fn execute_set_status(
        &self,
        msg_hash: H256,
        batch: &TransferBatch,
        quorum: usize,
    ) -> Result<String>;

    /// Unless the token is in mint/burn mode, the safe's balance of it
    /// must cover `amount`.
    async fn check_required_balance(&self, token: &[u8], amount: U256)
        -> Result<()>;
    /// Whether the token's cross-chain representation is minted/burned
    /// on this chain.
    async fn is_mint_burn_token(&self, token: &[u8]) -> Result<bool>;
    /// Whether the token's canonical ledger is this chain.
    async fn is_native_token(&self, token: &[u8]) -> Result<bool>;

    /// Triggers a self availability check; the outcome lands in the
    /// client's status metrics.
    async fn check_client_availability(&self) -> Result<()>;
}

/// Translates a source-chain token identifier into its destination-chain
/// counterpart at batch ingestion time.
#[async_trait]
pub trait TokensMapper: Send + Sync {
    /// Converts the token identifier.
    async fn convert_token(&self, source_token: &[u8]) -> Result<Vec<u8>>;
}

/// Read access to the signatures gathered over the p2p layer, keyed by
/// message hash. Returned signatures are ordered by public key
/// ascending so every relayer packs the same transaction payload.
pub trait SignaturesReader: Send + Sync {
    /// The signatures gathered for this message hash.
    fn signatures(&self, msg_hash: &[u8]) -> Vec<Vec<u8>>;
}

/// The reverse edge from a chain client to the p2p broadcaster, used
/// only to publish freshly created signatures.
pub trait SignatureBroadcaster: Send + Sync {
    /// Signs-and-broadcasts are chain-side concerns; the broadcaster
    /// only wraps and publishes.
    fn broadcast_signature(&self, signature: Vec<u8>, message_hash: Vec<u8>);
}

/// A provider of the current gas price, consulted before every Ethereum
/// transaction.
pub trait GasHandler: Send + Sync {
    /// The latest gas price, already multiplied by the configured
    /// multiplier.
    fn get_current_gas_price(&self) -> Result<U256>;
}
