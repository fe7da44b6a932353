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

//! The reqwest-backed MultiversX gateway adapter. The gateway's JSON
//! wire shapes and the contract endpoint names are the bridge's
//! external interface; the client above only sees [`MvxProxy`].
//!
//! Contract queries go through `vm-values/query` and decode the
//! base64 `returnData` items; transactions are signed ed25519 over the
//! serialized frame and posted to `transaction/send`.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use ed25519_dalek::{Signer as _, SigningKey};
use ethers::types::U256;
use mvx_bridge_core::{converters, CallData, TransferBatch};
use mvx_bridge_relayer_utils::{Error, Result};
use serde::{Deserialize, Serialize};

use super::proxy::{MvxProxy, RawMvxBatch, RawMvxDeposit};

const TX_VERSION: u32 = 1;
// per-deposit items in a getBatch answer: nonce, from, to, token, amount
const FIELDS_PER_DEPOSIT: usize = 5;
// header items: batch id, block nonce, deposits count, finality flag
const HEADER_FIELDS: usize = 4;

/// The arguments DTO for [`GatewayMvxProxy::new`].
pub struct ArgsGatewayMvxProxy {
    /// The gateway base url.
    pub base_url: String,
    /// The multisig contract, bech32.
    pub multisig_address: String,
    /// The safe contract, bech32.
    pub safe_address: String,
    /// The relayer's raw ed25519 secret key (32 bytes).
    pub secret_key: Vec<u8>,
    /// Per-request time budget.
    pub request_time: Duration,
    /// Whether queries must be answered from finalized state.
    pub finality_check: bool,
}

/// The gateway implementation of [`MvxProxy`].
pub struct GatewayMvxProxy {
    base_url: String,
    multisig_address: String,
    safe_address: String,
    signing_key: SigningKey,
    own_address: String,
    http_client: reqwest::Client,
    request_time: Duration,
    finality_check: bool,
}

#[derive(Serialize)]
struct VmQueryRequest<'a> {
    #[serde(rename = "scAddress")]
    sc_address: &'a str,
    #[serde(rename = "funcName")]
    func_name: &'a str,
    args: Vec<String>,
}

#[derive(Deserialize)]
struct GatewayEnvelope<T> {
    data: Option<T>,
    #[serde(default)]
    error: String,
}

impl<T> GatewayEnvelope<T> {
    fn into_data(self) -> Result<T> {
        if !self.error.is_empty() {
            return Err(Error::ClientUnavailable(self.error));
        }
        self.data.ok_or_else(|| {
            Error::ClientUnavailable("empty gateway answer".to_string())
        })
    }
}

#[derive(Deserialize)]
struct VmQueryData {
    data: VmQueryResult,
}

#[derive(Deserialize)]
struct VmQueryResult {
    #[serde(rename = "returnData", default)]
    return_data: Vec<String>,
}

#[derive(Deserialize)]
struct AccountData {
    account: AccountInfo,
}

#[derive(Deserialize)]
struct AccountInfo {
    nonce: u64,
}

#[derive(Deserialize)]
struct NetworkConfigData {
    config: NetworkConfig,
}

#[derive(Deserialize)]
struct NetworkConfig {
    #[serde(rename = "erd_chain_id")]
    chain_id: String,
    #[serde(rename = "erd_min_gas_price")]
    min_gas_price: u64,
}

#[derive(Deserialize)]
struct NetworkStatusData {
    status: NetworkStatus,
}

#[derive(Deserialize)]
struct NetworkStatus {
    #[serde(rename = "erd_nonce")]
    nonce: u64,
}

#[derive(Deserialize)]
struct SendTxData {
    #[serde(rename = "txHash")]
    tx_hash: String,
}

#[derive(Serialize)]
struct UnsignedTransaction<'a> {
    nonce: u64,
    value: &'a str,
    receiver: &'a str,
    sender: &'a str,
    #[serde(rename = "gasPrice")]
    gas_price: u64,
    #[serde(rename = "gasLimit")]
    gas_limit: u64,
    data: String,
    #[serde(rename = "chainID")]
    chain_id: &'a str,
    version: u32,
}

#[derive(Serialize)]
struct SignedTransaction<'a> {
    #[serde(flatten)]
    frame: UnsignedTransaction<'a>,
    signature: String,
}

impl GatewayMvxProxy {
    /// Creates a gateway proxy for the given contracts and key.
    pub fn new(args: ArgsGatewayMvxProxy) -> Result<Self> {
        let key_bytes: [u8; 32] = args
            .secret_key
            .as_slice()
            .try_into()
            .map_err(|_| Error::PublicKeyCast)?;
        let signing_key = SigningKey::from_bytes(&key_bytes);
        let own_address = converters::to_bech32_string(
            signing_key.verifying_key().as_bytes(),
        )?;

        Ok(Self {
            base_url: args.base_url.trim_end_matches('/').to_string(),
            multisig_address: args.multisig_address,
            safe_address: args.safe_address,
            signing_key,
            own_address,
            http_client: reqwest::Client::new(),
            request_time: args.request_time,
            finality_check: args.finality_check,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T> {
        let url = format!("{}/{path}", self.base_url);
        let request = self.http_client.get(&url).send();
        let response = tokio::time::timeout(self.request_time, request)
            .await
            .map_err(|_| Error::RequestTimeout)??;
        let envelope: GatewayEnvelope<T> = response.json().await?;
        envelope.into_data()
    }

    async fn vm_query(
        &self,
        sc_address: &str,
        func_name: &str,
        args: Vec<Vec<u8>>,
    ) -> Result<Vec<Vec<u8>>> {
        let url = format!("{}/vm-values/query", self.base_url);
        let body = VmQueryRequest {
            sc_address,
            func_name,
            args: args.iter().map(hex::encode).collect(),
        };
        let request = self.http_client.post(&url).json(&body).send();
        let response = tokio::time::timeout(self.request_time, request)
            .await
            .map_err(|_| Error::RequestTimeout)??;
        let envelope: GatewayEnvelope<VmQueryData> = response.json().await?;
        let data = envelope.into_data()?;

        let engine = base64::engine::general_purpose::STANDARD;
        data.data
            .return_data
            .iter()
            .map(|item| {
                engine.decode(item).map_err(|_| {
                    Error::ClientUnavailable(
                        "undecodable vm query return data".to_string(),
                    )
                })
            })
            .collect()
    }

    async fn multisig_query(
        &self,
        func_name: &str,
        args: Vec<Vec<u8>>,
    ) -> Result<Vec<Vec<u8>>> {
        self.vm_query(&self.multisig_address, func_name, args).await
    }

    async fn query_u64(&self, func_name: &str, args: Vec<Vec<u8>>) -> Result<u64> {
        let items = self.multisig_query(func_name, args).await?;
        Ok(items.first().map(|b| be_bytes_to_u64(b)).unwrap_or(0))
    }

    async fn query_bool(&self, func_name: &str, args: Vec<Vec<u8>>) -> Result<bool> {
        Ok(self.query_u64(func_name, args).await? == 1)
    }

    async fn send_transaction(&self, data: String, gas_limit: u64) -> Result<String> {
        let account: AccountData = self
            .get_json(&format!("address/{}", self.own_address))
            .await?;
        let network: NetworkConfigData = self.get_json("network/config").await?;

        let engine = base64::engine::general_purpose::STANDARD;
        let frame = UnsignedTransaction {
            nonce: account.account.nonce,
            value: "0",
            receiver: &self.multisig_address,
            sender: &self.own_address,
            gas_price: network.config.min_gas_price,
            gas_limit,
            data: engine.encode(data.as_bytes()),
            chain_id: &network.config.chain_id,
            version: TX_VERSION,
        };

        let frame_bytes = serde_json::to_vec(&frame)?;
        let signature = self.signing_key.sign(&frame_bytes);
        let signed = SignedTransaction {
            frame,
            signature: hex::encode(signature.to_bytes()),
        };

        let url = format!("{}/transaction/send", self.base_url);
        let request = self.http_client.post(&url).json(&signed).send();
        let response = tokio::time::timeout(self.request_time, request)
            .await
            .map_err(|_| Error::RequestTimeout)??;
        let envelope: GatewayEnvelope<SendTxData> = response.json().await?;
        Ok(envelope.into_data()?.tx_hash)
    }

    /// The argument list shared by the proposal transactions and their
    /// lookup queries: batch id followed by the per-deposit fields.
    fn batch_args(batch: &TransferBatch) -> Vec<Vec<u8>> {
        let mut args = vec![u64_to_trimmed_be_bytes(batch.id)];
        for deposit in &batch.deposits {
            args.push(deposit.from_bytes.clone());
            args.push(deposit.to_bytes.clone());
            args.push(deposit.destination_token_bytes.clone());
            args.push(u256_to_be_bytes(deposit.amount));
            args.push(u64_to_trimmed_be_bytes(deposit.nonce));
            // the data field already carries the encoded call-data frame
            args.push(
                deposit
                    .data
                    .clone()
                    .unwrap_or_else(|| CallData::encode(None)),
            );
        }
        args
    }
}

fn be_bytes_to_u64(bytes: &[u8]) -> u64 {
    let mut value: u64 = 0;
    for byte in bytes.iter().take(8) {
        value = (value << 8) | u64::from(*byte);
    }
    value
}

fn u64_to_trimmed_be_bytes(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(7);
    bytes[first..].to_vec()
}

fn u256_to_be_bytes(value: U256) -> Vec<u8> {
    let mut buff = [0u8; 32];
    value.to_big_endian(&mut buff);
    let first = buff.iter().position(|b| *b != 0).unwrap_or(31);
    buff[first..].to_vec()
}

fn tx_data(endpoint: &str, args: &[Vec<u8>]) -> String {
    let mut data = endpoint.to_string();
    for arg in args {
        data.push('@');
        data.push_str(&hex::encode(arg));
    }
    data
}

#[async_trait]
impl MvxProxy for GatewayMvxProxy {
    async fn get_batch(&self, nonce: u64) -> Result<Option<RawMvxBatch>> {
        let items = self
            .multisig_query("getBatch", vec![u64_to_trimmed_be_bytes(nonce)])
            .await?;
        if items.is_empty() || items.iter().all(|i| i.is_empty()) {
            return Ok(None);
        }
        if items.len() < HEADER_FIELDS
            || (items.len() - HEADER_FIELDS) % FIELDS_PER_DEPOSIT != 0
        {
            return Err(Error::ClientUnavailable(
                "malformed getBatch answer".to_string(),
            ));
        }

        let id = be_bytes_to_u64(&items[0]);
        let block_number = be_bytes_to_u64(&items[1]);
        let deposits_count = be_bytes_to_u64(&items[2]) as u32;
        let is_final = be_bytes_to_u64(&items[3]) == 1;

        let mut deposits = Vec::new();
        for fields in items[HEADER_FIELDS..].chunks(FIELDS_PER_DEPOSIT) {
            deposits.push(RawMvxDeposit {
                nonce: be_bytes_to_u64(&fields[0]),
                from: fields[1].clone(),
                to: fields[2].clone(),
                token_identifier: fields[3].clone(),
                amount: U256::from_big_endian(&fields[4]),
                data: None,
            });
        }

        Ok(Some(RawMvxBatch {
            id,
            block_number,
            deposits_count,
            deposits,
            is_final: is_final || !self.finality_check,
        }))
    }

    async fn last_executed_batch_id(&self) -> Result<u64> {
        self.query_u64("getLastExecutedEthBatchId", Vec::new()).await
    }

    async fn last_executed_deposit_nonce(&self) -> Result<u64> {
        self.query_u64("getLastExecutedEthTxId", Vec::new()).await
    }

    async fn was_batch_executed(&self, batch_id: u64) -> Result<bool> {
        self.query_bool(
            "wasTransferBatchExecuted",
            vec![u64_to_trimmed_be_bytes(batch_id)],
        )
        .await
    }

    async fn get_statuses_after_execution(
        &self,
        batch_id: u64,
    ) -> Result<(Vec<u8>, bool)> {
        let items = self
            .multisig_query(
                "getStatusesAfterExecution",
                vec![u64_to_trimmed_be_bytes(batch_id)],
            )
            .await?;
        // first item: finality flag, rest: one status byte each
        let is_final = items
            .first()
            .map(|b| be_bytes_to_u64(b) == 1)
            .unwrap_or(false);
        let statuses = items
            .iter()
            .skip(1)
            .map(|b| b.first().copied().unwrap_or(0))
            .collect();
        Ok((statuses, is_final))
    }

    async fn quorum(&self) -> Result<U256> {
        let value = self.query_u64("getQuorum", Vec::new()).await?;
        Ok(U256::from(value))
    }

    async fn is_paused(&self) -> Result<bool> {
        self.query_bool("isPaused", Vec::new()).await
    }

    async fn was_transfer_proposed(&self, batch: &TransferBatch) -> Result<bool> {
        self.query_bool("wasTransferActionProposed", Self::batch_args(batch))
            .await
    }

    async fn propose_transfer(
        &self,
        batch: &TransferBatch,
        gas_limit: u64,
    ) -> Result<String> {
        let data = tx_data(
            "proposeMultiTransferEsdtBatch",
            &Self::batch_args(batch),
        );
        self.send_transaction(data, gas_limit).await
    }

    async fn was_set_status_proposed(
        &self,
        batch: &TransferBatch,
    ) -> Result<bool> {
        let mut args = vec![u64_to_trimmed_be_bytes(batch.id)];
        args.extend(batch.statuses.iter().map(|s| vec![*s]));
        self.query_bool(
            "wasSetCurrentTransactionBatchStatusActionProposed",
            args,
        )
        .await
    }

    async fn propose_set_status(
        &self,
        batch: &TransferBatch,
        gas_limit: u64,
    ) -> Result<String> {
        let mut args = vec![u64_to_trimmed_be_bytes(batch.id)];
        args.extend(batch.statuses.iter().map(|s| vec![*s]));
        let data = tx_data(
            "proposeEsdtSafeSetCurrentTransactionBatchStatus",
            &args,
        );
        self.send_transaction(data, gas_limit).await
    }

    async fn action_id_for_propose_transfer(
        &self,
        batch: &TransferBatch,
    ) -> Result<u64> {
        self.query_u64("getActionIdForTransferBatch", Self::batch_args(batch))
            .await
    }

    async fn action_id_for_set_status(
        &self,
        batch: &TransferBatch,
    ) -> Result<u64> {
        let mut args = vec![u64_to_trimmed_be_bytes(batch.id)];
        args.extend(batch.statuses.iter().map(|s| vec![*s]));
        self.query_u64(
            "getActionIdForSetCurrentTransactionBatchStatus",
            args,
        )
        .await
    }

    async fn was_action_signed(&self, action_id: u64) -> Result<bool> {
        let own_address =
            converters::from_bech32_string(&self.own_address)?;
        self.query_bool(
            "signed",
            vec![own_address, u64_to_trimmed_be_bytes(action_id)],
        )
        .await
    }

    async fn sign_action(&self, action_id: u64, gas_limit: u64) -> Result<String> {
        let data = tx_data("sign", &[u64_to_trimmed_be_bytes(action_id)]);
        self.send_transaction(data, gas_limit).await
    }

    async fn quorum_reached_for_action(&self, action_id: u64) -> Result<bool> {
        self.query_bool(
            "quorumReached",
            vec![u64_to_trimmed_be_bytes(action_id)],
        )
        .await
    }

    async fn perform_action(
        &self,
        action_id: u64,
        gas_limit: u64,
    ) -> Result<String> {
        let data = tx_data("performAction", &[u64_to_trimmed_be_bytes(action_id)]);
        self.send_transaction(data, gas_limit).await
    }

    async fn is_mint_burn_token(&self, token: &[u8]) -> Result<bool> {
        self.vm_query(&self.safe_address, "isMintBurnToken", vec![token.to_vec()])
            .await
            .map(|items| {
                items.first().map(|b| be_bytes_to_u64(b) == 1).unwrap_or(false)
            })
    }

    async fn is_native_token(&self, token: &[u8]) -> Result<bool> {
        self.vm_query(&self.safe_address, "isNativeToken", vec![token.to_vec()])
            .await
            .map(|items| {
                items.first().map(|b| be_bytes_to_u64(b) == 1).unwrap_or(false)
            })
    }

    async fn safe_token_balance(&self, token: &[u8]) -> Result<U256> {
        let items = self
            .vm_query(&self.safe_address, "getTokenBalance", vec![token.to_vec()])
            .await?;
        Ok(items
            .first()
            .map(|b| U256::from_big_endian(b))
            .unwrap_or_default())
    }

    async fn latest_block_nonce(&self) -> Result<u64> {
        let status: NetworkStatusData =
            self.get_json("network/status/4294967295").await?;
        Ok(status.status.nonce)
    }

    async fn token_id_for_erc20_address(&self, address: &[u8]) -> Result<Vec<u8>> {
        let items = self
            .multisig_query("getTokenIdForErc20Address", vec![address.to_vec()])
            .await?;
        items.into_iter().next().ok_or_else(|| {
            Error::ClientUnavailable("unknown ERC20 address mapping".to_string())
        })
    }

    async fn erc20_address_for_token_id(&self, token_id: &[u8]) -> Result<Vec<u8>> {
        let items = self
            .multisig_query("getErc20AddressForTokenId", vec![token_id.to_vec()])
            .await?;
        items.into_iter().next().ok_or_else(|| {
            Error::ClientUnavailable("unknown token id mapping".to_string())
        })
    }

    async fn get_all_staked_relayers(&self) -> Result<Vec<Vec<u8>>> {
        self.multisig_query("getAllStakedRelayers", Vec::new()).await
    }
}

#[async_trait]
impl crate::roles::mvx::MvxRolesQuery for GatewayMvxProxy {
    async fn get_all_staked_relayers(&self) -> Result<Vec<Vec<u8>>> {
        MvxProxy::get_all_staked_relayers(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trimmed_be_bytes_drop_leading_zeros_but_keep_one_byte() {
        assert_eq!(u64_to_trimmed_be_bytes(0), vec![0]);
        assert_eq!(u64_to_trimmed_be_bytes(1), vec![1]);
        assert_eq!(u64_to_trimmed_be_bytes(0x0102), vec![1, 2]);
        assert_eq!(be_bytes_to_u64(&[1, 2]), 0x0102);
    }

    #[test]
    fn tx_data_joins_hex_arguments_with_at_signs() {
        let data = tx_data("sign", &[vec![0x02, 0x96]]);
        assert_eq!(data, "sign@0296");
    }

    #[test]
    fn u256_round_trips_through_trimmed_bytes() {
        let value = U256::from(1_000_000u64);
        assert_eq!(
            U256::from_big_endian(&u256_to_be_bytes(value)),
            value
        );
    }
}
