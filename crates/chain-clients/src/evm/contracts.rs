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

//! Ethers-backed adapters for the multisig and safe contracts. The
//! contract surface consumed here is the bridge's external interface;
//! everything above it only sees the wrapper traits.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::Abi;
use ethers::contract::Contract;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::LocalWallet;
use ethers::types::{Address, Bytes, H256, U256};
use mvx_bridge_relayer_utils::{Error, Result};

use super::wrapper::{
    ArgLists, Erc20ContractsHolder, EthereumChainWrapper, EvmBatchHeader,
    EvmDeposit, ScCallEvent, TxOptions,
};

type EthersClient = SignerMiddleware<Provider<Http>, LocalWallet>;

const MULTISIG_ABI: [&str; 13] = [
    "function getRelayers() view returns (address[])",
    "function lastExecutedBatchId() view returns (uint256)",
    "function lastExecutedDepositNonce() view returns (uint256)",
    "function wasBatchExecuted(uint256 batchNonce) view returns (bool)",
    "function getStatusesAfterExecution(uint256 batchNonce) view returns (bytes statuses, bool isFinal)",
    "function quorum() view returns (uint256)",
    "function paused() view returns (bool)",
    "function wasTransferProposed(uint256 batchNonce) view returns (bool)",
    "function proposeTransfer(address[] recipients, address[] tokens, uint256[] amounts, uint256[] depositNonces, uint256 batchNonce)",
    "function wasSetStatusProposed(uint256 batchNonce) view returns (bool)",
    "function proposeSetStatus(bytes statuses, uint256 batchNonce)",
    "function executeTransfer(address[] tokens, address[] recipients, uint256[] amounts, uint256[] depositNonces, uint256 batchNonce, bytes[] signatures)",
    "function executeSetStatus(bytes statuses, uint256 batchNonce, bytes[] signatures)",
];

const SAFE_ABI: [&str; 5] = [
    "function getBatch(uint256 batchNonce) view returns (uint256 nonce, uint256 blockNumber, uint256 depositsCount)",
    "function getBatchDeposits(uint256 batchNonce) view returns (uint256[] nonces, address[] tokens, uint256[] amounts, address[] depositors, bytes32[] recipients)",
    "function getBatchCallData(uint256 batchNonce) view returns (uint256[] depositNonces, bytes[] callData)",
    "function mintBurnTokens(address token) view returns (bool)",
    "function nativeTokens(address token) view returns (bool)",
];

const ERC20_ABI: [&str; 1] =
    ["function balanceOf(address account) view returns (uint256)"];

fn call_err<E: std::fmt::Display>(error: E) -> Error {
    Error::ClientUnavailable(error.to_string())
}

fn parse_abi(human_readable: &[&str]) -> Result<Abi> {
    ethers::abi::parse_abi(human_readable)
        .map_err(|e| Error::InvalidValue(format!("for contract abi: {e}")))
}

/// The ethers adapter implementing [`EthereumChainWrapper`] over the
/// multisig and safe contracts.
pub struct EthereumContractsWrapper {
    client: Arc<EthersClient>,
    multisig: Contract<EthersClient>,
    safe: Contract<EthersClient>,
}

impl EthereumContractsWrapper {
    /// Wires the adapter to the deployed contracts.
    pub fn new(
        client: Arc<EthersClient>,
        multisig_address: Address,
        safe_address: Address,
    ) -> Result<Self> {
        let multisig =
            Contract::new(multisig_address, parse_abi(&MULTISIG_ABI)?, client.clone());
        let safe = Contract::new(safe_address, parse_abi(&SAFE_ABI)?, client.clone());
        Ok(Self {
            client,
            multisig,
            safe,
        })
    }

    async fn send_transaction<T: ethers::abi::Tokenize>(
        &self,
        method: &str,
        args: T,
        options: &TxOptions,
    ) -> Result<String> {
        let mut call = self
            .multisig
            .method::<T, ()>(method, args)
            .map_err(call_err)?
            .gas(options.gas_limit)
            .legacy();
        call.tx.set_nonce(options.nonce);
        call.tx.set_gas_price(options.gas_price);
        let pending = call.send().await.map_err(call_err)?;
        Ok(format!("{:#x}", pending.tx_hash()))
    }
}

#[async_trait]
impl EthereumChainWrapper for EthereumContractsWrapper {
    async fn get_batch(&self, nonce: u64) -> Result<Option<(EvmBatchHeader, bool)>> {
        let (batch_nonce, block_number, deposits_count): (U256, U256, U256) =
            self.safe
                .method("getBatch", U256::from(nonce))
                .map_err(call_err)?
                .call()
                .await
                .map_err(call_err)?;
        if batch_nonce.is_zero() {
            return Ok(None);
        }

        // the chain's own finality window: a batch younger than the
        // current head is still reorganisable
        let current_block = self.block_number().await?;
        let is_final = block_number.as_u64() < current_block;

        Ok(Some((
            EvmBatchHeader {
                nonce: batch_nonce.as_u64(),
                block_number: block_number.as_u64(),
                deposits_count: deposits_count.as_u32(),
            },
            is_final,
        )))
    }

    async fn get_batch_deposits(&self, nonce: u64) -> Result<Vec<EvmDeposit>> {
        let (nonces, tokens, amounts, depositors, recipients): (
            Vec<U256>,
            Vec<Address>,
            Vec<U256>,
            Vec<Address>,
            Vec<H256>,
        ) = self
            .safe
            .method("getBatchDeposits", U256::from(nonce))
            .map_err(call_err)?
            .call()
            .await
            .map_err(call_err)?;

        Ok(nonces
            .into_iter()
            .zip(tokens)
            .zip(amounts)
            .zip(depositors)
            .zip(recipients)
            .map(|((((nonce, token), amount), depositor), recipient)| EvmDeposit {
                nonce: nonce.as_u64(),
                depositor,
                recipient: recipient.as_bytes().to_vec(),
                token_address: token,
                amount,
            })
            .collect())
    }

    async fn get_batch_sc_metadata(&self, nonce: u64) -> Result<Vec<ScCallEvent>> {
        let (deposit_nonces, call_data): (Vec<U256>, Vec<Bytes>) = self
            .safe
            .method("getBatchCallData", U256::from(nonce))
            .map_err(call_err)?
            .call()
            .await
            .map_err(call_err)?;
        Ok(deposit_nonces
            .into_iter()
            .zip(call_data)
            .map(|(deposit_nonce, data)| ScCallEvent {
                deposit_nonce: deposit_nonce.as_u64(),
                call_data: data.to_vec(),
            })
            .collect())
    }

    async fn last_executed_batch_id(&self) -> Result<u64> {
        let id: U256 = self
            .multisig
            .method("lastExecutedBatchId", ())
            .map_err(call_err)?
            .call()
            .await
            .map_err(call_err)?;
        Ok(id.as_u64())
    }

    async fn last_executed_deposit_nonce(&self) -> Result<u64> {
        let nonce: U256 = self
            .multisig
            .method("lastExecutedDepositNonce", ())
            .map_err(call_err)?
            .call()
            .await
            .map_err(call_err)?;
        Ok(nonce.as_u64())
    }

    async fn was_batch_executed(&self, batch_id: u64) -> Result<bool> {
        self.multisig
            .method("wasBatchExecuted", U256::from(batch_id))
            .map_err(call_err)?
            .call()
            .await
            .map_err(call_err)
    }

    async fn get_statuses_after_execution(
        &self,
        batch_id: u64,
    ) -> Result<(Vec<u8>, bool)> {
        let (statuses, is_final): (Bytes, bool) = self
            .multisig
            .method("getStatusesAfterExecution", U256::from(batch_id))
            .map_err(call_err)?
            .call()
            .await
            .map_err(call_err)?;
        Ok((statuses.to_vec(), is_final))
    }

    async fn quorum(&self) -> Result<U256> {
        self.multisig
            .method("quorum", ())
            .map_err(call_err)?
            .call()
            .await
            .map_err(call_err)
    }

    async fn is_paused(&self) -> Result<bool> {
        self.multisig
            .method("paused", ())
            .map_err(call_err)?
            .call()
            .await
            .map_err(call_err)
    }

    async fn was_transfer_proposed(&self, batch_id: u64) -> Result<bool> {
        self.multisig
            .method("wasTransferProposed", U256::from(batch_id))
            .map_err(call_err)?
            .call()
            .await
            .map_err(call_err)
    }

    async fn propose_transfer(
        &self,
        options: &TxOptions,
        lists: &ArgLists,
        batch_id: u64,
    ) -> Result<String> {
        self.send_transaction(
            "proposeTransfer",
            (
                lists.recipients.clone(),
                lists.tokens.clone(),
                lists.amounts.clone(),
                lists.nonces.clone(),
                U256::from(batch_id),
            ),
            options,
        )
        .await
    }

    async fn was_set_status_proposed(&self, batch_id: u64) -> Result<bool> {
        self.multisig
            .method("wasSetStatusProposed", U256::from(batch_id))
            .map_err(call_err)?
            .call()
            .await
            .map_err(call_err)
    }

    async fn propose_set_status(
        &self,
        options: &TxOptions,
        statuses: &[u8],
        batch_id: u64,
    ) -> Result<String> {
        self.send_transaction(
            "proposeSetStatus",
            (Bytes::from(statuses.to_vec()), U256::from(batch_id)),
            options,
        )
        .await
    }

    async fn execute_transfer(
        &self,
        options: &TxOptions,
        lists: &ArgLists,
        batch_id: u64,
        signatures: Vec<Vec<u8>>,
    ) -> Result<String> {
        let signatures: Vec<Bytes> =
            signatures.into_iter().map(Bytes::from).collect();
        self.send_transaction(
            "executeTransfer",
            (
                lists.tokens.clone(),
                lists.recipients.clone(),
                lists.amounts.clone(),
                lists.nonces.clone(),
                U256::from(batch_id),
                signatures,
            ),
            options,
        )
        .await
    }

    async fn execute_set_status(
        &self,
        options: &TxOptions,
        statuses: &[u8],
        batch_id: u64,
        signatures: Vec<Vec<u8>>,
    ) -> Result<String> {
        let signatures: Vec<Bytes> =
            signatures.into_iter().map(Bytes::from).collect();
        self.send_transaction(
            "executeSetStatus",
            (
                Bytes::from(statuses.to_vec()),
                U256::from(batch_id),
                signatures,
            ),
            options,
        )
        .await
    }

    async fn is_mint_burn_token(&self, token: Address) -> Result<bool> {
        self.safe
            .method("mintBurnTokens", token)
            .map_err(call_err)?
            .call()
            .await
            .map_err(call_err)
    }

    async fn is_native_token(&self, token: Address) -> Result<bool> {
        self.safe
            .method("nativeTokens", token)
            .map_err(call_err)?
            .call()
            .await
            .map_err(call_err)
    }

    async fn block_number(&self) -> Result<u64> {
        let block = self
            .client
            .get_block_number()
            .await
            .map_err(call_err)?;
        Ok(block.as_u64())
    }

    async fn nonce_at(&self, address: Address, block: u64) -> Result<U256> {
        self.client
            .get_transaction_count(address, Some(block.into()))
            .await
            .map_err(call_err)
    }

    async fn balance_at(&self, address: Address) -> Result<U256> {
        self.client
            .get_balance(address, None)
            .await
            .map_err(call_err)
    }

    async fn chain_id(&self) -> Result<U256> {
        self.client.get_chainid().await.map_err(call_err)
    }
}

#[async_trait]
impl crate::roles::evm::EthereumRolesQuery for EthereumContractsWrapper {
    async fn get_relayers(&self) -> Result<Vec<Address>> {
        self.multisig
            .method("getRelayers", ())
            .map_err(call_err)?
            .call()
            .await
            .map_err(call_err)
    }
}

/// The ethers adapter implementing [`Erc20ContractsHolder`]; one parsed
/// ABI shared by every queried token contract.
pub struct Erc20Contracts {
    client: Arc<EthersClient>,
    abi: Abi,
}

impl Erc20Contracts {
    /// Creates the holder.
    pub fn new(client: Arc<EthersClient>) -> Result<Self> {
        Ok(Self {
            abi: parse_abi(&ERC20_ABI)?,
            client,
        })
    }
}

#[async_trait]
impl Erc20ContractsHolder for Erc20Contracts {
    async fn balance_of(&self, token: Address, holder: Address) -> Result<U256> {
        let contract =
            Contract::new(token, self.abi.clone(), self.client.clone());
        contract
            .method::<Address, U256>("balanceOf", holder)
            .map_err(call_err)?
            .call()
            .await
            .map_err(call_err)
    }
}
