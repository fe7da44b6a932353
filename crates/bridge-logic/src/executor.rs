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

//! The stateless operations layer between the steps and the two chain
//! clients. The executor owns the working batch, the in-flight message
//! hash and the retry counters behind one lock; the steps decide what
//! to do with every outcome.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{H256, U256};
use mvx_bridge_chain_clients::balance_validator::BalanceValidator;
use mvx_bridge_chain_clients::BridgeChain;
use mvx_bridge_core::status::{
    StatusHandler, METRIC_LAST_ERROR, METRIC_NUM_BATCHES,
};
use mvx_bridge_core::{TransferBatch, STATUS_EXECUTED, STATUS_REJECTED};
use mvx_bridge_relayer_context::Shutdown;
use mvx_bridge_relayer_utils::{Error, Result};

use crate::signatures::SignaturesHolder;
use crate::topology::TopologyProvider;

const MIN_RETRIES: u64 = 1;

/// The verb set the steps drive the bridge with. One implementation
/// per half bridge; the test suite substitutes its own.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// True when this relayer leads the current interval.
    async fn my_turn_as_leader(&self) -> bool;
    /// Runs the availability self-checks of both clients.
    async fn check_clients_availability(&self);

    /// Fetches the next pending batch from the source chain into the
    /// working set. `Ok(false)` means no batch is pending.
    async fn get_and_store_batch_from_source(&self) -> Result<bool>;
    /// A snapshot of the working batch.
    async fn stored_batch(&self) -> Option<TransferBatch>;
    /// Drops the working batch and resets the retry counters.
    async fn clear_stored_batch(&self);
    /// Validates token setups, required balances and deposit nonce
    /// continuity of the working batch.
    async fn validate_batch(&self) -> Result<()>;

    /// Whether the working batch's transfer is proposed on the
    /// destination.
    async fn was_transfer_proposed_on_destination(&self) -> Result<bool>;
    /// Proposes the transfer on the destination.
    async fn propose_transfer_on_destination(&self) -> Result<()>;
    /// Signs the proposed transfer and records the message hash.
    async fn sign_proposed_transfer_on_destination(&self) -> Result<()>;
    /// Whether the destination gathered quorum for the transfer.
    async fn process_quorum_reached_on_destination(&self) -> Result<bool>;
    /// Whether the transfer was executed on the destination.
    async fn was_transfer_executed_on_destination(&self) -> Result<bool>;
    /// Submits the transfer execution on the destination.
    async fn execute_transfer_on_destination(&self) -> Result<()>;

    /// Reconciles the working batch with a fresh source observation and
    /// fills the statuses from the destination's final answer; forced
    /// statuses from a rejection path are kept as they are.
    async fn resolve_set_status_on_source(&self) -> Result<()>;
    /// Whether the status report is proposed on the source.
    async fn was_set_status_proposed_on_source(&self) -> Result<bool>;
    /// Proposes the status report on the source.
    async fn propose_set_status_on_source(&self) -> Result<()>;
    /// Signs the proposed status report and records the message hash.
    async fn sign_proposed_set_status_on_source(&self) -> Result<()>;
    /// Whether the source gathered quorum for the status report.
    async fn process_quorum_reached_on_source(&self) -> Result<bool>;
    /// Whether the status report was executed on the source.
    async fn was_set_status_executed_on_source(&self) -> Result<bool>;
    /// Submits the status-report execution on the source.
    async fn execute_set_status_on_source(&self) -> Result<()>;

    /// Overwrites every deposit status with `Rejected`.
    async fn set_status_rejected_on_all_deposits(&self);
    /// Overwrites every deposit status with `Executed`.
    async fn mark_all_deposits_executed(&self);

    /// A cancellable pause of one step interval; `false` when the
    /// relayer is shutting down.
    async fn wait_step_to_finish(&self) -> bool;
    /// Clears the gathered signatures when the machine transitions out
    /// of a batch.
    fn clean_topology(&self);

    /// Counts one quorum wait on the destination; `true` once the
    /// budget is exhausted.
    async fn process_max_quorum_retries_on_destination(&self) -> bool;
    /// Resets the destination quorum counter.
    async fn reset_quorum_retries_on_destination(&self);
    /// Counts one quorum wait on the source; `true` once the budget is
    /// exhausted.
    async fn process_max_quorum_retries_on_source(&self) -> bool;
    /// Resets the source quorum counter.
    async fn reset_quorum_retries_on_source(&self);
    /// Counts one was-proposed wait; `true` once the budget is
    /// exhausted.
    async fn process_max_retries_on_was_proposed(&self) -> bool;
    /// Resets the was-proposed counter.
    async fn reset_retries_on_was_proposed(&self);

    /// Logs the error and records it in the half bridge's metrics.
    fn report_error(&self, context: &'static str, error: &Error);
}

/// The arguments DTO for [`BridgeExecutor::new`].
pub struct ArgsBridgeExecutor {
    /// A name for the logs, e.g. `EthereumToMultiversX`.
    pub name: String,
    /// The chain batches originate from in this direction.
    pub source: Arc<dyn BridgeChain>,
    /// The chain transfers land on in this direction.
    pub destination: Arc<dyn BridgeChain>,
    /// Leader election.
    pub topology_provider: Arc<dyn TopologyProvider>,
    /// The gathered p2p signatures, cleared on batch transitions.
    pub signatures_holder: Arc<SignaturesHolder>,
    /// The half bridge's status metrics.
    pub status_handler: Arc<StatusHandler>,
    /// The pause used by `wait_step_to_finish`.
    pub time_to_wait_per_step: Duration,
    /// Shutdown listener cancelling the step waits.
    pub shutdown: Shutdown,
    /// Quorum wait budget on the destination chain.
    pub max_quorum_retries_on_destination: u64,
    /// Quorum wait budget on the source chain.
    pub max_quorum_retries_on_source: u64,
    /// Was-proposed wait budget.
    pub max_retries_on_was_proposed: u64,
}

#[derive(Default)]
struct WorkingState {
    batch: Option<TransferBatch>,
    msg_hash: H256,
    quorum_retries_on_destination: u64,
    quorum_retries_on_source: u64,
    retries_on_was_proposed: u64,
}

/// The per-direction executor the steps talk to.
pub struct BridgeExecutor {
    name: String,
    source: Arc<dyn BridgeChain>,
    destination: Arc<dyn BridgeChain>,
    topology_provider: Arc<dyn TopologyProvider>,
    signatures_holder: Arc<SignaturesHolder>,
    balance_validator: BalanceValidator,
    status_handler: Arc<StatusHandler>,
    time_to_wait_per_step: Duration,
    shutdown: tokio::sync::Mutex<Shutdown>,
    max_quorum_retries_on_destination: u64,
    max_quorum_retries_on_source: u64,
    max_retries_on_was_proposed: u64,
    state: tokio::sync::Mutex<WorkingState>,
}

impl BridgeExecutor {
    /// Creates an executor for one direction.
    pub fn new(args: ArgsBridgeExecutor) -> Result<Self> {
        for (budget, name) in [
            (
                args.max_quorum_retries_on_destination,
                "MaxQuorumRetriesOnDestination",
            ),
            (args.max_quorum_retries_on_source, "MaxQuorumRetriesOnSource"),
            (args.max_retries_on_was_proposed, "MaxRetriesOnWasProposed"),
        ] {
            if budget < MIN_RETRIES {
                return Err(Error::InvalidValue(format!(
                    "for args.{name}, got: {budget}, minimum: {MIN_RETRIES}"
                )));
            }
        }

        let balance_validator =
            BalanceValidator::new(args.source.clone(), args.destination.clone());

        Ok(Self {
            name: args.name,
            source: args.source,
            destination: args.destination,
            topology_provider: args.topology_provider,
            signatures_holder: args.signatures_holder,
            balance_validator,
            status_handler: args.status_handler,
            time_to_wait_per_step: args.time_to_wait_per_step,
            shutdown: tokio::sync::Mutex::new(args.shutdown),
            max_quorum_retries_on_destination: args
                .max_quorum_retries_on_destination,
            max_quorum_retries_on_source: args.max_quorum_retries_on_source,
            max_retries_on_was_proposed: args.max_retries_on_was_proposed,
            state: tokio::sync::Mutex::new(WorkingState::default()),
        })
    }

    async fn with_batch<T>(
        &self,
        operation: impl FnOnce(&TransferBatch) -> T,
    ) -> Result<T> {
        let state = self.state.lock().await;
        match &state.batch {
            None => Err(Error::NoStoredBatch),
            Some(batch) => Ok(operation(batch)),
        }
    }

    async fn quorum_for(&self, chain: &Arc<dyn BridgeChain>) -> Result<usize> {
        let quorum = chain.get_quorum_size().await?;
        tracing::debug!(quorum = %quorum, "fetched quorum size");
        Ok(quorum.min(U256::from(u32::MAX)).as_usize())
    }

    fn ensure_statuses_cover_deposits(batch: &mut TransferBatch) {
        let deposits_len = batch.deposits.len();
        batch.statuses.truncate(deposits_len);
        while batch.statuses.len() < deposits_len {
            batch.statuses.push(STATUS_REJECTED);
        }
    }
}

#[async_trait]
impl StepExecutor for BridgeExecutor {
    async fn my_turn_as_leader(&self) -> bool {
        self.topology_provider.my_turn_as_leader()
    }

    async fn check_clients_availability(&self) {
        if let Err(error) = self.source.check_client_availability().await {
            tracing::debug!(chain = self.source.name(), %error, "client unavailable");
        }
        if let Err(error) = self.destination.check_client_availability().await {
            tracing::debug!(chain = self.destination.name(), %error, "client unavailable");
        }
    }

    async fn get_and_store_batch_from_source(&self) -> Result<bool> {
        let last_executed = self.destination.last_executed_batch_id().await?;
        self.status_handler
            .set_int_metric(METRIC_NUM_BATCHES, last_executed as i64);

        let nonce = last_executed + 1;
        let (batch, is_final) = match self.source.get_batch(nonce).await? {
            None => {
                tracing::debug!(
                    bridge = self.name,
                    last_executed,
                    "no new batch found on source"
                );
                return Ok(false);
            }
            Some(answer) => answer,
        };
        if !is_final {
            tracing::debug!(
                bridge = self.name,
                batch_id = batch.id,
                "batch is not final yet on the source chain"
            );
            return Ok(false);
        }

        tracing::info!(bridge = self.name, "fetched new batch from source {batch}");
        let mut state = self.state.lock().await;
        state.batch = Some(batch);
        Ok(true)
    }

    async fn stored_batch(&self) -> Option<TransferBatch> {
        self.state.lock().await.batch.clone()
    }

    async fn clear_stored_batch(&self) {
        let mut state = self.state.lock().await;
        *state = WorkingState::default();
    }

    async fn validate_batch(&self) -> Result<()> {
        let batch = self.with_batch(|batch| batch.clone()).await?;

        // deposit nonces must continue exactly where the destination
        // stopped
        let last_nonce = self.destination.last_executed_deposit_nonce().await?;
        let mut expected = last_nonce + 1;
        for deposit in &batch.deposits {
            if deposit.nonce != expected {
                return Err(Error::InvalidDepositNonce {
                    deposit: deposit.to_string(),
                    expected,
                });
            }
            expected += 1;
        }

        // cumulate the amounts per token pair, then check each pair once
        let mut cumulated: HashMap<(Vec<u8>, Vec<u8>), U256> = HashMap::new();
        for deposit in &batch.deposits {
            let key = (
                deposit.source_token_bytes.clone(),
                deposit.destination_token_bytes.clone(),
            );
            let entry = cumulated.entry(key).or_insert_with(U256::zero);
            *entry += deposit.amount;
        }
        for ((source_token, destination_token), amount) in cumulated {
            self.balance_validator
                .check_token(&source_token, &destination_token, amount)
                .await?;
        }

        Ok(())
    }

    async fn was_transfer_proposed_on_destination(&self) -> Result<bool> {
        let batch = self.with_batch(|batch| batch.clone()).await?;
        self.destination.was_transfer_proposed(&batch).await
    }

    async fn propose_transfer_on_destination(&self) -> Result<()> {
        let batch = self.with_batch(|batch| batch.clone()).await?;
        let tx_hash = self.destination.propose_transfer(&batch).await?;
        tracing::info!(
            bridge = self.name,
            hash = tx_hash,
            batch_id = batch.id,
            "proposed transfer"
        );
        Ok(())
    }

    async fn sign_proposed_transfer_on_destination(&self) -> Result<()> {
        let batch = self.with_batch(|batch| batch.clone()).await?;
        let msg_hash = self.destination.sign_transfer(&batch).await?;
        tracing::info!(
            bridge = self.name,
            hash = %msg_hash,
            batch_id = batch.id,
            "signed proposed transfer"
        );
        self.state.lock().await.msg_hash = msg_hash;
        Ok(())
    }

    async fn process_quorum_reached_on_destination(&self) -> Result<bool> {
        let (batch, msg_hash) = {
            let state = self.state.lock().await;
            match &state.batch {
                None => return Err(Error::NoStoredBatch),
                Some(batch) => (batch.clone(), state.msg_hash),
            }
        };
        self.destination.is_quorum_reached(&batch, msg_hash).await
    }

    async fn was_transfer_executed_on_destination(&self) -> Result<bool> {
        let batch_id = self.with_batch(|batch| batch.id).await?;
        self.destination.was_executed(batch_id).await
    }

    async fn execute_transfer_on_destination(&self) -> Result<()> {
        let (batch, msg_hash) = {
            let state = self.state.lock().await;
            match &state.batch {
                None => return Err(Error::NoStoredBatch),
                Some(batch) => (batch.clone(), state.msg_hash),
            }
        };
        let quorum = self.quorum_for(&self.destination).await?;
        let tx_hash = self
            .destination
            .execute_transfer(msg_hash, &batch, quorum)
            .await?;
        tracing::info!(
            bridge = self.name,
            hash = tx_hash,
            batch_id = batch.id,
            "sent execute transfer"
        );
        Ok(())
    }

    async fn resolve_set_status_on_source(&self) -> Result<()> {
        let batch = self.with_batch(|batch| batch.clone()).await?;
        if batch.statuses_are_set() {
            // the rejection path already forced every status
            return Ok(());
        }

        // a later observation of the same nonce may have grown or
        // shrunk; reconcile before asking for the final statuses
        let fresh_len = match self.source.get_batch(batch.id).await? {
            None => batch.deposits.len(),
            Some((fresh, _)) => fresh.deposits.len(),
        };

        let statuses = self
            .destination
            .get_transactions_statuses(batch.id)
            .await?;
        if statuses.is_empty() {
            return Err(Error::Generic("no status available"));
        }

        let mut state = self.state.lock().await;
        if let Some(stored) = state.batch.as_mut() {
            stored.resolve_new_deposits(fresh_len);
            stored.statuses = statuses;
            Self::ensure_statuses_cover_deposits(stored);
            tracing::debug!(
                bridge = self.name,
                statuses = %hex::encode(&stored.statuses),
                "resolved batch statuses"
            );
        }
        Ok(())
    }

    async fn was_set_status_proposed_on_source(&self) -> Result<bool> {
        let batch = self.with_batch(|batch| batch.clone()).await?;
        self.source.was_set_status_proposed(&batch).await
    }

    async fn propose_set_status_on_source(&self) -> Result<()> {
        let batch = self.with_batch(|batch| batch.clone()).await?;
        let tx_hash = self.source.propose_set_status(&batch).await?;
        tracing::info!(
            bridge = self.name,
            hash = tx_hash,
            batch_id = batch.id,
            "proposed set status"
        );
        Ok(())
    }

    async fn sign_proposed_set_status_on_source(&self) -> Result<()> {
        let batch = self.with_batch(|batch| batch.clone()).await?;
        let msg_hash = self.source.sign_set_status(&batch).await?;
        tracing::info!(
            bridge = self.name,
            hash = %msg_hash,
            batch_id = batch.id,
            "signed proposed set status"
        );
        self.state.lock().await.msg_hash = msg_hash;
        Ok(())
    }

    async fn process_quorum_reached_on_source(&self) -> Result<bool> {
        let (batch, msg_hash) = {
            let state = self.state.lock().await;
            match &state.batch {
                None => return Err(Error::NoStoredBatch),
                Some(batch) => (batch.clone(), state.msg_hash),
            }
        };
        self.source.is_quorum_reached(&batch, msg_hash).await
    }

    async fn was_set_status_executed_on_source(&self) -> Result<bool> {
        let batch_id = self.with_batch(|batch| batch.id).await?;
        self.source.was_executed(batch_id).await
    }

    async fn execute_set_status_on_source(&self) -> Result<()> {
        let (batch, msg_hash) = {
            let state = self.state.lock().await;
            match &state.batch {
                None => return Err(Error::NoStoredBatch),
                Some(batch) => (batch.clone(), state.msg_hash),
            }
        };
        let quorum = self.quorum_for(&self.source).await?;
        let tx_hash = self
            .source
            .execute_set_status(msg_hash, &batch, quorum)
            .await?;
        tracing::info!(
            bridge = self.name,
            hash = tx_hash,
            batch_id = batch.id,
            "sent execute set status"
        );
        Ok(())
    }

    async fn set_status_rejected_on_all_deposits(&self) {
        let mut state = self.state.lock().await;
        if let Some(batch) = state.batch.as_mut() {
            batch.set_statuses_on_all_deposits(STATUS_REJECTED);
        }
    }

    async fn mark_all_deposits_executed(&self) {
        let mut state = self.state.lock().await;
        if let Some(batch) = state.batch.as_mut() {
            batch.set_statuses_on_all_deposits(STATUS_EXECUTED);
        }
    }

    async fn wait_step_to_finish(&self) -> bool {
        let mut shutdown = self.shutdown.lock().await;
        if shutdown.is_shutdown() {
            return false;
        }
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!(bridge = self.name, "closing due to shutdown");
                false
            }
            _ = tokio::time::sleep(self.time_to_wait_per_step) => true,
        }
    }

    fn clean_topology(&self) {
        self.signatures_holder.clear_stored_signatures();
        tracing::info!(bridge = self.name, "cleared stored P2P signatures");
    }

    async fn process_max_quorum_retries_on_destination(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.quorum_retries_on_destination
            < self.max_quorum_retries_on_destination
        {
            state.quorum_retries_on_destination += 1;
            return false;
        }
        true
    }

    async fn reset_quorum_retries_on_destination(&self) {
        self.state.lock().await.quorum_retries_on_destination = 0;
    }

    async fn process_max_quorum_retries_on_source(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.quorum_retries_on_source < self.max_quorum_retries_on_source {
            state.quorum_retries_on_source += 1;
            return false;
        }
        true
    }

    async fn reset_quorum_retries_on_source(&self) {
        self.state.lock().await.quorum_retries_on_source = 0;
    }

    async fn process_max_retries_on_was_proposed(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.retries_on_was_proposed < self.max_retries_on_was_proposed {
            state.retries_on_was_proposed += 1;
            return false;
        }
        true
    }

    async fn reset_retries_on_was_proposed(&self) {
        self.state.lock().await.retries_on_was_proposed = 0;
    }

    fn report_error(&self, context: &'static str, error: &Error) {
        tracing::error!(bridge = self.name, %error, "{context}");
        self.status_handler
            .set_string_metric(METRIC_LAST_ERROR, &format!("{context}: {error}"));
    }
}
