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
//! # Relayer Configuration Module 🕸️
//!
//! The TOML configuration of the bridge relayer. Keys mirror the
//! historical PascalCase layout so configs stay portable across
//! implementations.

use std::path::PathBuf;

use mvx_bridge_relayer_types::RpcUrl;
use mvx_bridge_relayer_utils::{Error, Result};
use serde::{Deserialize, Serialize};

/// CLI options and logger bootstrap.
pub mod cli;
/// Default values for optional config keys.
pub mod defaults;
/// Config file loading and post-load validation.
pub mod utils;

/// The whole relayer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BridgeRelayerConfig {
    /// The Ethereum side of the bridge.
    pub eth: EthereumConfig,
    /// The MultiversX side of the bridge.
    #[serde(rename = "MultiversX")]
    pub multiversx: MultiversXConfig,
    /// Peer-to-peer settings.
    #[serde(rename = "P2P")]
    pub p2p: P2PConfig,
    /// Per-direction state machine settings.
    pub state_machine: StateMachineConfig,
    /// General relayer settings.
    pub relayer: RelayerConfig,
    /// Logging sub-system settings.
    #[serde(default)]
    pub logs: LogsConfig,
}

/// The Ethereum chain section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EthereumConfig {
    /// The chain name, also the base of the p2p bridge topic names
    /// (e.g. `Ethereum` yields `EthereumToMultiversX`).
    pub chain: String,
    /// The JSON-RPC endpoint.
    pub network_address: RpcUrl,
    /// The multisig (bridge) contract address, 0x-hex.
    pub multisig_contract_address: String,
    /// The safe contract address, 0x-hex.
    pub safe_contract_address: String,
    /// Path of the file holding the relayer's hex-encoded private key.
    pub private_key_file: PathBuf,
    /// Base gas limit of an execute-transfer transaction.
    pub gas_limit_base: u64,
    /// Additional gas limit per deposit in the batch.
    pub gas_limit_for_each: u64,
    /// Retry budget while waiting for quorum on the Ethereum side.
    pub max_retries_on_quorum_reached: u64,
    /// How long a step waits for an Ethereum confirmation, in seconds.
    pub interval_to_wait_for_transfer_in_seconds: u64,
    /// How many identical block numbers in a row are tolerated before the
    /// client is flagged unavailable.
    pub client_availability_allow_delta: u64,
    /// Lower bound of the deposit-events block window.
    #[serde(default)]
    pub events_block_range_from: u64,
    /// Upper bound of the deposit-events block window.
    #[serde(default = "defaults::events_block_range_to")]
    pub events_block_range_to: u64,
    /// Gas price oracle settings.
    pub gas_station: GasStationConfig,
}

/// The gas price oracle section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GasStationConfig {
    /// Whether the oracle polls the feed; a disabled oracle serves the
    /// fixed `DefaultGasPrice`.
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
    /// The HTTP gas-price feed.
    #[serde(rename = "RequestURL")]
    pub request_url: String,
    /// Seconds between polls. Minimum 1.
    pub request_polling_interval_in_seconds: u64,
    /// Seconds between retries after a failed poll. Minimum 1.
    pub request_retry_delay_in_seconds: u64,
    /// Failed fetches tolerated before the failure is escalated from
    /// debug to error level. Minimum 2.
    pub maximum_fetch_retries: u64,
    /// Per-request time budget, in milliseconds. Minimum 1.
    pub request_time_in_millis: u64,
    /// The highest gas price the relayer accepts.
    pub maximum_gas_price: u64,
    /// Which field of the feed to use: `Fast`, `Propose` or `Safe`.
    pub gas_price_selector: String,
    /// Multiplier applied to the fetched value. Minimum 1.
    pub gas_price_multiplier: u64,
    /// The price served while the oracle is disabled.
    #[serde(default = "defaults::default_gas_price")]
    pub default_gas_price: u64,
}

/// The MultiversX chain section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MultiversXConfig {
    /// The gateway endpoint.
    pub network_address: RpcUrl,
    /// The multisig contract address, bech32.
    pub multisig_contract_address: String,
    /// The safe contract address, bech32.
    pub safe_contract_address: String,
    /// Path of the file holding the relayer's hex-encoded private key.
    pub private_key_file: PathBuf,
    /// Seconds before an unconfirmed transaction is resent.
    pub interval_to_resend_txs_in_seconds: u64,
    /// Gas limits per contract operation.
    pub gas_map: GasMapConfig,
    /// Retry budget while waiting for quorum on the MultiversX side.
    pub max_retries_on_quorum_reached: u64,
    /// Retry budget while waiting for a proposal to land on chain.
    pub max_retries_on_was_transfer_proposed: u64,
    /// Same-block tolerance before the client is flagged unavailable.
    pub client_availability_allow_delta: u64,
    /// Gateway proxy tuning.
    #[serde(default)]
    pub proxy: ProxyConfig,
}

/// Gas limits per MultiversX contract operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GasMapConfig {
    /// Gas limit of a sign transaction.
    pub sign: u64,
    /// Base gas limit of a propose-transfer transaction.
    pub propose_transfer_base: u64,
    /// Additional gas per deposit in a propose-transfer.
    pub propose_transfer_for_each: u64,
    /// Base gas limit of a propose-set-status transaction.
    pub propose_status_base: u64,
    /// Additional gas per deposit in a propose-set-status.
    pub propose_status_for_each: u64,
    /// Base gas limit of a perform-action transaction.
    pub perform_action_base: u64,
    /// Additional gas per deposit in a perform-action.
    pub perform_action_for_each: u64,
}

/// MultiversX gateway proxy tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProxyConfig {
    /// Per-request time budget, in seconds.
    pub request_time_in_seconds: u64,
    /// Whether queries must be answered from finalized state.
    pub finality_check: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            request_time_in_seconds: 10,
            finality_check: true,
        }
    }
}

/// The peer-to-peer section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct P2PConfig {
    /// The listen port.
    pub port: String,
    /// Bootstrap peers.
    #[serde(default)]
    pub initial_peer_list: Vec<String>,
    /// The protocol identifier announced on the mesh.
    #[serde(rename = "ProtocolID")]
    pub protocol_id: String,
    /// Enabled transport stacks.
    #[serde(default)]
    pub transports: Vec<String>,
    /// Seconds between join-topic announcements. Minimum 30.
    #[serde(default = "defaults::time_before_repeat_join")]
    pub time_before_repeat_join_in_seconds: u64,
    /// Antiflood quotas.
    #[serde(default)]
    pub antiflood_config: AntifloodConfig,
}

/// The antiflood quota section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AntifloodConfig {
    /// Master switch.
    pub enabled: bool,
    /// Length of a quota interval, in seconds.
    pub interval_in_seconds: u64,
    /// Messages accepted from one peer per interval.
    pub peer_max_messages_per_interval: u32,
    /// Bytes accepted from one peer per interval.
    pub peer_max_total_size_per_interval: u64,
    /// Messages accepted from one peer on one topic per interval.
    pub topic_max_messages_per_interval: u32,
    /// Quota violations after which a peer is black-listed.
    pub black_list_threshold: u32,
    /// Seconds a black-listed peer stays denied.
    pub black_list_duration_in_seconds: u64,
}

impl Default for AntifloodConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_in_seconds: 1,
            peer_max_messages_per_interval: 75,
            peer_max_total_size_per_interval: 2_097_152,
            topic_max_messages_per_interval: 30,
            black_list_threshold: 10,
            black_list_duration_in_seconds: 300,
        }
    }
}

/// The per-direction state machine section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StateMachineConfig {
    /// Ethereum -> MultiversX half-bridge settings.
    #[serde(rename = "EthereumToMultiversX")]
    pub eth_to_mvx: HalfBridgeConfig,
    /// MultiversX -> Ethereum half-bridge settings.
    #[serde(rename = "MultiversXToEthereum")]
    pub mvx_to_eth: HalfBridgeConfig,
}

/// Settings of one half-bridge state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HalfBridgeConfig {
    /// Milliseconds between two state machine ticks.
    pub step_duration_in_millis: u64,
    /// Length of one leader rotation window, in seconds.
    pub interval_for_leader_in_seconds: u64,
}

/// The general relayer section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RelayerConfig {
    /// The peer message marshalizer; only `json` is supported.
    #[serde(default = "defaults::marshalizer")]
    pub marshalizer: String,
    /// Role provider polling.
    pub role_provider: RoleProviderConfig,
    /// Where the persisted metric subset lives, relative to the working
    /// directory.
    #[serde(default = "defaults::status_metrics_storage")]
    pub status_metrics_storage: String,
}

/// The role provider polling section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoleProviderConfig {
    /// Milliseconds between two whitelist refreshes.
    pub polling_interval_in_millis: u64,
}

/// The logging section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogsConfig {
    /// Seconds before the log file is rotated.
    pub log_file_life_span_in_sec: u64,
    /// Megabytes before the log file is rotated.
    #[serde(rename = "LogFileLifeSpanInMB")]
    pub log_file_life_span_in_mb: u64,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            log_file_life_span_in_sec: 86_400,
            log_file_life_span_in_mb: 1024,
        }
    }
}

impl BridgeRelayerConfig {
    /// Validates the bounds the components rely on. Called once after
    /// loading; the components assume validated values from then on.
    pub fn validate(&self) -> Result<()> {
        let gs = &self.eth.gas_station;
        if gs.request_polling_interval_in_seconds < 1 {
            return Err(invalid("GasStation.RequestPollingIntervalInSeconds, minimum: 1"));
        }
        if gs.request_retry_delay_in_seconds < 1 {
            return Err(invalid("GasStation.RequestRetryDelayInSeconds, minimum: 1"));
        }
        if gs.maximum_fetch_retries < 2 {
            return Err(invalid("GasStation.MaximumFetchRetries, minimum: 2"));
        }
        if gs.request_time_in_millis < 1 {
            return Err(invalid("GasStation.RequestTimeInMillis, minimum: 1"));
        }
        if gs.gas_price_multiplier < 1 {
            return Err(invalid("GasStation.GasPriceMultiplier, minimum: 1"));
        }
        if self.eth.gas_limit_base == 0 || self.eth.gas_limit_for_each == 0 {
            return Err(invalid("Eth gas limits, got: 0"));
        }
        if self.eth.client_availability_allow_delta < 1 {
            return Err(invalid("Eth.ClientAvailabilityAllowDelta, minimum: 1"));
        }
        if self.eth.events_block_range_from > self.eth.events_block_range_to {
            return Err(invalid("Eth.EventsBlockRangeFrom > Eth.EventsBlockRangeTo"));
        }
        if self.multiversx.client_availability_allow_delta < 1 {
            return Err(invalid(
                "MultiversX.ClientAvailabilityAllowDelta, minimum: 1",
            ));
        }
        if self.p2p.time_before_repeat_join_in_seconds < 30 {
            return Err(invalid("P2P.TimeBeforeRepeatJoinInSeconds, minimum: 30"));
        }
        for (name, half) in [
            ("EthereumToMultiversX", &self.state_machine.eth_to_mvx),
            ("MultiversXToEthereum", &self.state_machine.mvx_to_eth),
        ] {
            if half.step_duration_in_millis == 0 {
                return Err(Error::InvalidValue(format!(
                    "for StateMachine.{name}.StepDurationInMillis, got: 0"
                )));
            }
            if half.interval_for_leader_in_seconds == 0 {
                return Err(Error::InvalidValue(format!(
                    "for StateMachine.{name}.IntervalForLeaderInSeconds, got: 0"
                )));
            }
        }
        if self.relayer.role_provider.polling_interval_in_millis == 0 {
            return Err(invalid("Relayer.RoleProvider.PollingIntervalInMillis, got: 0"));
        }
        if self.relayer.marshalizer != "json" {
            return Err(Error::InvalidValue(format!(
                "for Relayer.Marshalizer, got: {}, supported: json",
                self.relayer.marshalizer
            )));
        }

        Ok(())
    }

    /// The bridge name the p2p topics derive from, e.g.
    /// `EthereumToMultiversX`.
    pub fn bridge_topic_name(&self) -> String {
        format!("{}ToMultiversX", self.eth.chain)
    }
}

fn invalid(context: &str) -> Error {
    Error::InvalidValue(format!("for {context}"))
}
