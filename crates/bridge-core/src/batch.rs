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

use std::fmt;

use ethers::types::U256;
use serde::{Deserialize, Serialize};

/// Status value for a deposit whose outcome is not yet known.
pub const STATUS_UNKNOWN: u8 = 0;
/// Status value for a deposit that was executed on the destination chain.
pub const STATUS_EXECUTED: u8 = 3;
/// Status value for a deposit that was rejected.
pub const STATUS_REJECTED: u8 = 4;

/// A set of deposits moved together across the bridge; the unit of
/// bridging. Immutable once fetched, except through
/// [`TransferBatch::resolve_new_deposits`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferBatch {
    /// The batch nonce, monotonic on the source chain.
    #[serde(rename = "batchId")]
    pub id: u64,
    /// The source-chain block that produced the batch.
    #[serde(rename = "blockNumber")]
    pub block_number: u64,
    /// The deposits moved by this batch, in source order.
    pub deposits: Vec<DepositTransfer>,
    /// One status byte per deposit, filled during the second half of the
    /// flow.
    pub statuses: Vec<u8>,
}

impl TransferBatch {
    /// Reconciles the statuses vector with a later observation of the same
    /// batch nonce. Extra deposits get a `Rejected` status appended; if the
    /// fresh observation shrank, the surplus tail is overwritten with
    /// `Rejected` as well.
    pub fn resolve_new_deposits(&mut self, new_num_deposits: usize) {
        let old_len = self.statuses.len();
        if new_num_deposits == old_len {
            tracing::debug!(len_statuses = old_len, "num statuses ok");
            return;
        }

        for status in self.statuses.iter_mut().skip(new_num_deposits) {
            *status = STATUS_REJECTED;
        }
        while self.statuses.len() < new_num_deposits {
            self.statuses.push(STATUS_REJECTED);
        }

        tracing::warn!(
            len_statuses = old_len,
            new_num_deposits,
            "recovered num statuses"
        );
    }

    /// Overwrites every deposit status with the provided value.
    pub fn set_statuses_on_all_deposits(&mut self, status: u8) {
        self.statuses = vec![status; self.deposits.len()];
    }

    /// Returns `true` once every deposit carries a non-`Unknown` status.
    pub fn statuses_are_set(&self) -> bool {
        !self.statuses.is_empty()
            && self.statuses.iter().all(|s| *s != STATUS_UNKNOWN)
    }
}

impl fmt::Display for TransferBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Batch id {}:", self.id)?;
        for deposit in &self.deposits {
            write!(f, "\n  {deposit}")?;
        }
        write!(f, "\nStatuses: {}", hex::encode(&self.statuses))
    }
}

/// One cross-chain transfer within a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositTransfer {
    /// The deposit nonce, unique within the batch.
    pub nonce: u64,
    /// Raw recipient address bytes.
    #[serde(skip)]
    pub to_bytes: Vec<u8>,
    /// The recipient in its chain-native encoding, used only for logging.
    #[serde(rename = "to")]
    pub displayable_to: String,
    /// Raw sender address bytes.
    #[serde(skip)]
    pub from_bytes: Vec<u8>,
    /// The sender in its chain-native encoding, used only for logging.
    #[serde(rename = "from")]
    pub displayable_from: String,
    /// The token identifier on the source chain.
    #[serde(skip)]
    pub source_token_bytes: Vec<u8>,
    /// The token identifier on the destination chain, filled in exactly
    /// once at ingestion through the token mapping collaborator.
    #[serde(skip)]
    pub destination_token_bytes: Vec<u8>,
    /// The source token in its chain-native encoding, for logging.
    #[serde(rename = "token")]
    pub displayable_token: String,
    /// The transferred amount.
    pub amount: U256,
    /// Optional raw bytes containing an SC-call instruction.
    #[serde(skip)]
    pub data: Option<Vec<u8>>,
    /// Hex rendering of `data`, for logging.
    #[serde(rename = "data")]
    pub displayable_data: String,
}

impl fmt::Display for DepositTransfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "to: {}, from: {}, token address: {}, amount: {}, deposit nonce: {}, data: {}",
            self.displayable_to,
            self.displayable_from,
            self.displayable_token,
            self.amount,
            self.nonce,
            self.displayable_data,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch_with_statuses(statuses: &[u8]) -> TransferBatch {
        TransferBatch {
            id: 2276,
            block_number: 100,
            deposits: statuses
                .iter()
                .enumerate()
                .map(|(i, _)| DepositTransfer {
                    nonce: i as u64 + 1,
                    amount: U256::from(1000u64),
                    ..Default::default()
                })
                .collect(),
            statuses: statuses.to_vec(),
        }
    }

    #[test]
    fn resolve_new_deposits_with_equal_count_changes_nothing() {
        let mut batch = batch_with_statuses(&[STATUS_EXECUTED, STATUS_EXECUTED]);
        batch.resolve_new_deposits(2);
        assert_eq!(batch.statuses, vec![STATUS_EXECUTED, STATUS_EXECUTED]);
    }

    #[test]
    fn resolve_new_deposits_appends_rejected_when_batch_grew() {
        let mut batch = batch_with_statuses(&[STATUS_EXECUTED]);
        batch.resolve_new_deposits(3);
        assert_eq!(
            batch.statuses,
            vec![STATUS_EXECUTED, STATUS_REJECTED, STATUS_REJECTED]
        );
    }

    #[test]
    fn resolve_new_deposits_rejects_the_tail_when_batch_shrank() {
        let mut batch = batch_with_statuses(&[
            STATUS_EXECUTED,
            STATUS_EXECUTED,
            STATUS_EXECUTED,
        ]);
        batch.resolve_new_deposits(1);
        assert_eq!(
            batch.statuses,
            vec![STATUS_EXECUTED, STATUS_REJECTED, STATUS_REJECTED]
        );
    }

    #[test]
    fn statuses_are_set_requires_every_deposit_resolved() {
        let mut batch = batch_with_statuses(&[STATUS_UNKNOWN, STATUS_EXECUTED]);
        assert!(!batch.statuses_are_set());

        batch.set_statuses_on_all_deposits(STATUS_REJECTED);
        assert!(batch.statuses_are_set());
        assert_eq!(batch.statuses.len(), batch.deposits.len());
    }

    #[test]
    fn display_renders_one_deposit_per_line() {
        let batch = batch_with_statuses(&[STATUS_EXECUTED]);
        let rendered = batch.to_string();
        assert!(rendered.starts_with("Batch id 2276:"));
        assert!(rendered.contains("deposit nonce: 1"));
        assert!(rendered.ends_with("Statuses: 03"));
    }
}
