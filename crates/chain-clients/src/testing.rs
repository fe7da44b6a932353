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

//! Configurable fake collaborators shared by the unit tests of this
//! crate and of the bridge-logic crate.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use mvx_bridge_core::TransferBatch;
use mvx_bridge_relayer_utils::{Error, Result};

use crate::evm::{
    ArgLists, Erc20ContractsHolder, EthereumChainWrapper, EvmBatchHeader,
    EvmDeposit, ScCallEvent, TxOptions,
};
use crate::{
    BridgeChain, GasHandler, SignatureBroadcaster, SignaturesReader,
    TokensMapper,
};

/// A stub Ethereum chain wrapper with directly settable answers.
pub struct StubEthereumWrapper {
    /// Answer of `get_batch`.
    pub batch_header: Option<EvmBatchHeader>,
    /// Answer of `get_batch_deposits`.
    pub deposits: Vec<EvmDeposit>,
    /// Answer of `get_batch_sc_metadata`.
    pub sc_metadata: Vec<ScCallEvent>,
    /// Answer of `quorum`.
    pub quorum: U256,
    /// Answer of `is_paused`.
    pub paused: bool,
    /// Answer of `balance_at`.
    pub relayer_balance: U256,
    /// Answer of `get_statuses_after_execution`.
    pub statuses: (Vec<u8>, bool),
    /// Answer of `was_batch_executed`.
    pub batch_executed: bool,
    /// Answer of the proposal queries.
    pub transfer_proposed: bool,
    /// Answer of the set-status proposal query.
    pub set_status_proposed: bool,
    /// Records the signatures passed to the execute calls.
    pub submitted_signatures: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Default for StubEthereumWrapper {
    fn default() -> Self {
        Self {
            batch_header: None,
            deposits: Vec::new(),
            sc_metadata: Vec::new(),
            quorum: U256::from(3u64),
            paused: false,
            relayer_balance: U256::MAX,
            statuses: (Vec::new(), true),
            batch_executed: false,
            transfer_proposed: false,
            set_status_proposed: false,
            submitted_signatures: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl EthereumChainWrapper for StubEthereumWrapper {
    async fn get_batch(&self, _nonce: u64) -> Result<Option<(EvmBatchHeader, bool)>> {
        Ok(self.batch_header.map(|header| (header, true)))
    }

    async fn get_batch_deposits(&self, _nonce: u64) -> Result<Vec<EvmDeposit>> {
        Ok(self.deposits.clone())
    }

    async fn get_batch_sc_metadata(&self, _nonce: u64) -> Result<Vec<ScCallEvent>> {
        Ok(self.sc_metadata.clone())
    }

    async fn last_executed_batch_id(&self) -> Result<u64> {
        Ok(self.batch_header.map(|h| h.nonce.saturating_sub(1)).unwrap_or(0))
    }

    async fn last_executed_deposit_nonce(&self) -> Result<u64> {
        Ok(0)
    }

    async fn was_batch_executed(&self, _batch_id: u64) -> Result<bool> {
        Ok(self.batch_executed)
    }

    async fn get_statuses_after_execution(
        &self,
        _batch_id: u64,
    ) -> Result<(Vec<u8>, bool)> {
        Ok(self.statuses.clone())
    }

    async fn quorum(&self) -> Result<U256> {
        Ok(self.quorum)
    }

    async fn is_paused(&self) -> Result<bool> {
        Ok(self.paused)
    }

    async fn was_transfer_proposed(&self, _batch_id: u64) -> Result<bool> {
        Ok(self.transfer_proposed)
    }

    async fn propose_transfer(
        &self,
        _options: &TxOptions,
        _lists: &ArgLists,
        _batch_id: u64,
    ) -> Result<String> {
        Ok("0xproposed".to_string())
    }

    async fn was_set_status_proposed(&self, _batch_id: u64) -> Result<bool> {
        Ok(self.set_status_proposed)
    }

    async fn propose_set_status(
        &self,
        _options: &TxOptions,
        _statuses: &[u8],
        _batch_id: u64,
    ) -> Result<String> {
        Ok("0xproposed-status".to_string())
    }

    async fn execute_transfer(
        &self,
        _options: &TxOptions,
        _lists: &ArgLists,
        _batch_id: u64,
        signatures: Vec<Vec<u8>>,
    ) -> Result<String> {
        *self.submitted_signatures.lock().unwrap() = signatures;
        Ok("0xexecuted".to_string())
    }

    async fn execute_set_status(
        &self,
        _options: &TxOptions,
        _statuses: &[u8],
        _batch_id: u64,
        signatures: Vec<Vec<u8>>,
    ) -> Result<String> {
        *self.submitted_signatures.lock().unwrap() = signatures;
        Ok("0xexecuted-status".to_string())
    }

    async fn is_mint_burn_token(&self, _token: Address) -> Result<bool> {
        Ok(false)
    }

    async fn is_native_token(&self, _token: Address) -> Result<bool> {
        Ok(true)
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(1024)
    }

    async fn nonce_at(&self, _address: Address, _block: u64) -> Result<U256> {
        Ok(U256::from(11u64))
    }

    async fn balance_at(&self, _address: Address) -> Result<U256> {
        Ok(self.relayer_balance)
    }

    async fn chain_id(&self) -> Result<U256> {
        Ok(U256::from(5u64))
    }
}

/// A stub ERC20 holder answering every balance query with one value.
pub struct StubErc20Holder {
    /// The balance returned for every token.
    pub balance: U256,
}

impl Default for StubErc20Holder {
    fn default() -> Self {
        Self { balance: U256::MAX }
    }
}

#[async_trait]
impl Erc20ContractsHolder for StubErc20Holder {
    async fn balance_of(&self, _token: Address, _holder: Address) -> Result<U256> {
        Ok(self.balance)
    }
}

/// A stub tokens mapper counting its conversions.
#[derive(Default)]
pub struct StubTokensMapper {
    /// How many conversions were actually performed.
    pub conversions: Arc<Mutex<usize>>,
}

#[async_trait]
impl TokensMapper for StubTokensMapper {
    async fn convert_token(&self, _source_token: &[u8]) -> Result<Vec<u8>> {
        *self.conversions.lock().unwrap() += 1;
        Ok(vec![0x22; 20])
    }
}

/// A stub signatures reader pre-loaded with `n` distinct signatures.
#[derive(Default)]
pub struct StubSignaturesReader {
    /// The signatures returned for every hash.
    pub signatures: Vec<Vec<u8>>,
}

impl StubSignaturesReader {
    /// Pre-loads `n` distinct 65-byte signatures.
    pub fn with_signatures(n: usize) -> Self {
        Self {
            signatures: (0..n).map(|i| vec![i as u8; 65]).collect(),
        }
    }
}

impl SignaturesReader for StubSignaturesReader {
    fn signatures(&self, _msg_hash: &[u8]) -> Vec<Vec<u8>> {
        self.signatures.clone()
    }
}

/// A stub broadcaster recording every published signature.
#[derive(Default)]
pub struct StubBroadcaster {
    /// The published `(signature, message hash)` pairs.
    pub sent: Arc<Mutex<Vec<(Vec<u8>, Vec<u8>)>>>,
}

impl SignatureBroadcaster for StubBroadcaster {
    fn broadcast_signature(&self, signature: Vec<u8>, message_hash: Vec<u8>) {
        self.sent.lock().unwrap().push((signature, message_hash));
    }
}

/// A stub gas handler serving a fixed price.
pub struct StubGasHandler {
    price: U256,
}

impl StubGasHandler {
    /// Creates a handler serving `price`.
    pub fn new(price: U256) -> Self {
        Self { price }
    }
}

impl GasHandler for StubGasHandler {
    fn get_current_gas_price(&self) -> Result<U256> {
        Ok(self.price)
    }
}

/// The error kinds a [`FakeChain`] verb can be configured to fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailWith {
    /// A transient client error.
    ClientError,
    /// The multisig contract is paused.
    Paused,
    /// The relayer can not cover the fee.
    InsufficientBalance,
    /// The safe can not cover the batch value.
    InsufficientErc20Balance,
    /// Statuses are not final yet.
    StatusNotFinal,
}

impl FailWith {
    fn to_error(self) -> Error {
        match self {
            FailWith::ClientError => {
                Error::ClientUnavailable("stubbed failure".to_string())
            }
            FailWith::Paused => Error::MultisigContractPaused,
            FailWith::InsufficientBalance => Error::InsufficientBalance {
                existing: "0".to_string(),
                required: "1".to_string(),
            },
            FailWith::InsufficientErc20Balance => {
                Error::InsufficientErc20Balance {
                    existing: "0".to_string(),
                    required: "1".to_string(),
                    token: "0x22".to_string(),
                }
            }
            FailWith::StatusNotFinal => Error::StatusIsNotFinal,
        }
    }
}

/// A fully configurable in-memory [`BridgeChain`], recording every verb
/// invocation by name.
pub struct FakeChain {
    /// The chain name.
    pub chain_name: &'static str,
    /// Answer of `last_executed_batch_id`.
    pub last_executed_batch_id: Mutex<u64>,
    /// Answer of `get_batch`.
    pub batch: Mutex<Option<(TransferBatch, bool)>>,
    /// Answer of `last_executed_deposit_nonce`.
    pub last_executed_deposit_nonce: Mutex<u64>,
    /// Answer of `was_executed`.
    pub executed: AtomicBool,
    /// Answer of `get_transactions_statuses`.
    pub statuses: Mutex<Vec<u8>>,
    /// Answer of `get_quorum_size`.
    pub quorum: Mutex<U256>,
    /// Answer of `is_quorum_reached`.
    pub quorum_reached: AtomicBool,
    /// Answer of `was_transfer_proposed`.
    pub transfer_proposed: AtomicBool,
    /// Answer of `was_set_status_proposed`.
    pub set_status_proposed: AtomicBool,
    /// Tokens this chain reports as native.
    pub native_tokens: Mutex<HashSet<Vec<u8>>>,
    /// Tokens this chain reports as mint/burn.
    pub mint_burn_tokens: Mutex<HashSet<Vec<u8>>>,
    /// Per-verb failure injection, keyed by verb name.
    pub fail: Mutex<HashMap<&'static str, FailWith>>,
    /// Every verb invocation, in order.
    pub calls: Mutex<Vec<&'static str>>,
}

impl Default for FakeChain {
    fn default() -> Self {
        Self {
            chain_name: "fake-chain",
            last_executed_batch_id: Mutex::new(0),
            batch: Mutex::new(None),
            last_executed_deposit_nonce: Mutex::new(0),
            executed: AtomicBool::new(false),
            statuses: Mutex::new(Vec::new()),
            quorum: Mutex::new(U256::from(3u64)),
            quorum_reached: AtomicBool::new(false),
            transfer_proposed: AtomicBool::new(false),
            set_status_proposed: AtomicBool::new(false),
            native_tokens: Mutex::new(HashSet::new()),
            mint_burn_tokens: Mutex::new(HashSet::new()),
            fail: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeChain {
    /// Configures `verb` to fail with the given kind.
    pub fn fail_on(&self, verb: &'static str, with: FailWith) {
        self.fail.lock().unwrap().insert(verb, with);
    }

    /// Returns the recorded verb invocations.
    pub fn recorded_calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn enter(&self, verb: &'static str) -> Result<()> {
        self.calls.lock().unwrap().push(verb);
        match self.fail.lock().unwrap().get(verb) {
            Some(kind) => Err(kind.to_error()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BridgeChain for FakeChain {
    fn name(&self) -> &'static str {
        self.chain_name
    }

    async fn last_executed_batch_id(&self) -> Result<u64> {
        self.enter("last_executed_batch_id")?;
        Ok(*self.last_executed_batch_id.lock().unwrap())
    }

    async fn get_batch(&self, _nonce: u64) -> Result<Option<(TransferBatch, bool)>> {
        self.enter("get_batch")?;
        Ok(self.batch.lock().unwrap().clone())
    }

    async fn last_executed_deposit_nonce(&self) -> Result<u64> {
        self.enter("last_executed_deposit_nonce")?;
        Ok(*self.last_executed_deposit_nonce.lock().unwrap())
    }

    async fn was_executed(&self, _batch_id: u64) -> Result<bool> {
        self.enter("was_executed")?;
        Ok(self.executed.load(Ordering::SeqCst))
    }

    async fn get_transactions_statuses(&self, _batch_id: u64) -> Result<Vec<u8>> {
        self.enter("get_transactions_statuses")?;
        Ok(self.statuses.lock().unwrap().clone())
    }

    async fn get_quorum_size(&self) -> Result<U256> {
        self.enter("get_quorum_size")?;
        Ok(*self.quorum.lock().unwrap())
    }

    async fn is_quorum_reached(
        &self,
        _batch: &TransferBatch,
        _msg_hash: H256,
    ) -> Result<bool> {
        self.enter("is_quorum_reached")?;
        Ok(self.quorum_reached.load(Ordering::SeqCst))
    }

    async fn was_transfer_proposed(&self, _batch: &TransferBatch) -> Result<bool> {
        self.enter("was_transfer_proposed")?;
        Ok(self.transfer_proposed.load(Ordering::SeqCst))
    }

    async fn propose_transfer(&self, _batch: &TransferBatch) -> Result<String> {
        self.enter("propose_transfer")?;
        self.transfer_proposed.store(true, Ordering::SeqCst);
        Ok("0xproposed".to_string())
    }

    async fn was_set_status_proposed(
        &self,
        _batch: &TransferBatch,
    ) -> Result<bool> {
        self.enter("was_set_status_proposed")?;
        Ok(self.set_status_proposed.load(Ordering::SeqCst))
    }

    async fn propose_set_status(&self, _batch: &TransferBatch) -> Result<String> {
        self.enter("propose_set_status")?;
        self.set_status_proposed.store(true, Ordering::SeqCst);
        Ok("0xproposed-status".to_string())
    }

    async fn sign_transfer(&self, batch: &TransferBatch) -> Result<H256> {
        self.enter("sign_transfer")?;
        Ok(H256::from_low_u64_be(batch.id))
    }

    async fn sign_set_status(&self, batch: &TransferBatch) -> Result<H256> {
        self.enter("sign_set_status")?;
        Ok(H256::from_low_u64_be(batch.id + 1_000_000))
    }

    async fn execute_transfer(
        &self,
        _msg_hash: H256,
        _batch: &TransferBatch,
        _quorum: usize,
    ) -> Result<String> {
        self.enter("execute_transfer")?;
        self.executed.store(true, Ordering::SeqCst);
        Ok("0xexecuted".to_string())
    }

    async fn execute_set_status(
        &self,
        _msg_hash: H256,
        _batch: &TransferBatch,
        _quorum: usize,
    ) -> Result<String> {
        self.enter("execute_set_status")?;
        Ok("0xexecuted-status".to_string())
    }

    async fn check_required_balance(
        &self,
        _token: &[u8],
        _amount: U256,
    ) -> Result<()> {
        self.enter("check_required_balance")
    }

    async fn is_mint_burn_token(&self, token: &[u8]) -> Result<bool> {
        self.enter("is_mint_burn_token")?;
        Ok(self.mint_burn_tokens.lock().unwrap().contains(token))
    }

    async fn is_native_token(&self, token: &[u8]) -> Result<bool> {
        self.enter("is_native_token")?;
        Ok(self.native_tokens.lock().unwrap().contains(token))
    }

    async fn check_client_availability(&self) -> Result<()> {
        self.enter("check_client_availability")
    }
}
