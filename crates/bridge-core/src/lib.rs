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
//! # Bridge Core Module 🕸️
//!
//! Chain-agnostic building blocks of the bridge relayer: the transfer
//! batch data model, the call-data wire codec, the signed peer message
//! envelope, address converters, the NTP-disciplined timer and the
//! in-memory status metrics.

/// Transfer batches and deposits.
pub mod batch;
/// The binary call-data codec for deposits carrying SC-call instructions.
pub mod calldata;
/// Address display conversions (bech32 / hex).
pub mod converters;
/// The signed peer-to-peer message envelope.
pub mod message;
/// In-memory status metrics with a persisted subset.
pub mod status;
/// The wall-clock abstraction used for leader rotation.
pub mod timer;

pub use batch::{
    DepositTransfer, TransferBatch, STATUS_EXECUTED, STATUS_REJECTED,
    STATUS_UNKNOWN,
};
pub use calldata::CallData;
pub use message::{EthereumSignature, SignedMessage};
pub use timer::Timer;

/// Marker byte for deposits that carry no SC-call instruction.
pub const MISSING_DATA_PROTOCOL_MARKER: u8 = 0x00;
/// Marker byte for deposits whose data field holds an SC-call instruction.
pub const DATA_PRESENT_PROTOCOL_MARKER: u8 = 0x01;

/// The MultiversX address length, in bytes.
pub const MVX_ADDRESS_LEN: usize = 32;
/// The Ethereum address length, in bytes.
pub const ETH_ADDRESS_LEN: usize = 20;
