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

//! The concrete transitions of a half bridge. Both directions run the
//! same seven steps; the executor instance decides which chain plays
//! source and which destination.

use std::sync::Arc;

use crate::executor::StepExecutor;
use crate::state_machine::Step;

mod execute_set_status;
mod execute_transfer;
mod get_pending;
mod propose_set_status;
mod propose_transfer;
mod wait_quorum_set_status;
mod wait_quorum_transfer;

pub use execute_set_status::ExecuteSetStatusStep;
pub use execute_transfer::ExecuteTransferStep;
pub use get_pending::GetPendingStep;
pub use propose_set_status::ProposeSetStatusStep;
pub use propose_transfer::ProposeTransferStep;
pub use wait_quorum_set_status::WaitQuorumSetStatusStep;
pub use wait_quorum_transfer::WaitQuorumTransferStep;

/// Builds the complete step table of one half bridge over a shared
/// executor.
pub fn create_steps(bridge: Arc<dyn StepExecutor>) -> Vec<Box<dyn Step>> {
    vec![
        Box::new(GetPendingStep::new(bridge.clone())),
        Box::new(ProposeTransferStep::new(bridge.clone())),
        Box::new(WaitQuorumTransferStep::new(bridge.clone())),
        Box::new(ExecuteTransferStep::new(bridge.clone())),
        Box::new(ProposeSetStatusStep::new(bridge.clone())),
        Box::new(WaitQuorumSetStatusStep::new(bridge.clone())),
        Box::new(ExecuteSetStatusStep::new(bridge)),
    ]
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use mvx_bridge_core::{TransferBatch, STATUS_EXECUTED, STATUS_REJECTED};
    use mvx_bridge_relayer_utils::{Error, Result};

    use crate::executor::StepExecutor;

    fn fail_flag(flag: &Mutex<Option<&'static str>>) -> Result<()> {
        match *flag.lock().unwrap() {
            None => Ok(()),
            Some("paused") => Err(Error::MultisigContractPaused),
            Some("quorum") => Err(Error::QuorumNotReached {
                num_signatures: 9,
                quorum: 10,
            }),
            Some(other) => Err(Error::ClientUnavailable(other.to_string())),
        }
    }

    /// A scripted executor for the step tests. Every flag has interior
    /// mutability so a single test can steer consecutive ticks.
    pub struct ScriptedExecutor {
        pub leader: AtomicBool,
        pub batch: Mutex<Option<TransferBatch>>,
        pub has_pending: AtomicBool,
        pub fail_get_batch: Mutex<Option<&'static str>>,
        pub fail_validate: Mutex<Option<Error>>,
        pub transfer_proposed: AtomicBool,
        pub fail_propose_transfer: Mutex<Option<&'static str>>,
        pub quorum_on_destination: AtomicBool,
        pub transfer_executed: AtomicBool,
        pub fail_execute_transfer: Mutex<Option<&'static str>>,
        pub fail_resolve: Mutex<Option<&'static str>>,
        pub set_status_proposed: AtomicBool,
        pub fail_propose_set_status: Mutex<Option<&'static str>>,
        pub quorum_on_source: AtomicBool,
        pub set_status_executed: AtomicBool,
        pub fail_execute_set_status: Mutex<Option<&'static str>>,
        pub destination_quorum_budget: AtomicU64,
        pub source_quorum_budget: AtomicU64,
        pub was_proposed_budget: AtomicU64,
        pub calls: Mutex<Vec<&'static str>>,
    }

    impl Default for ScriptedExecutor {
        fn default() -> Self {
            Self {
                leader: AtomicBool::new(false),
                batch: Mutex::new(None),
                has_pending: AtomicBool::new(false),
                fail_get_batch: Mutex::new(None),
                fail_validate: Mutex::new(None),
                transfer_proposed: AtomicBool::new(false),
                fail_propose_transfer: Mutex::new(None),
                quorum_on_destination: AtomicBool::new(false),
                transfer_executed: AtomicBool::new(false),
                fail_execute_transfer: Mutex::new(None),
                fail_resolve: Mutex::new(None),
                set_status_proposed: AtomicBool::new(false),
                fail_propose_set_status: Mutex::new(None),
                quorum_on_source: AtomicBool::new(false),
                set_status_executed: AtomicBool::new(false),
                fail_execute_set_status: Mutex::new(None),
                destination_quorum_budget: AtomicU64::new(10),
                source_quorum_budget: AtomicU64::new(10),
                was_proposed_budget: AtomicU64::new(10),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl ScriptedExecutor {
        pub fn with_batch(num_deposits: usize) -> Self {
            let executor = Self::default();
            *executor.batch.lock().unwrap() = Some(TransferBatch {
                id: 99,
                block_number: 5,
                deposits: vec![Default::default(); num_deposits],
                statuses: vec![0; num_deposits],
            });
            executor.has_pending.store(true, Ordering::SeqCst);
            executor
        }

        pub fn recorded(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }

        fn budget_step(budget: &AtomicU64) -> bool {
            if budget.load(Ordering::SeqCst) == 0 {
                return true;
            }
            budget.fetch_sub(1, Ordering::SeqCst);
            false
        }
    }

    #[async_trait]
    impl StepExecutor for ScriptedExecutor {
        async fn my_turn_as_leader(&self) -> bool {
            self.leader.load(Ordering::SeqCst)
        }

        async fn check_clients_availability(&self) {
            self.record("check_clients_availability");
        }

        async fn get_and_store_batch_from_source(&self) -> Result<bool> {
            self.record("get_and_store_batch_from_source");
            fail_flag(&self.fail_get_batch)?;
            Ok(self.has_pending.load(Ordering::SeqCst))
        }

        async fn stored_batch(&self) -> Option<TransferBatch> {
            self.batch.lock().unwrap().clone()
        }

        async fn clear_stored_batch(&self) {
            self.record("clear_stored_batch");
            *self.batch.lock().unwrap() = None;
        }

        async fn validate_batch(&self) -> Result<()> {
            self.record("validate_batch");
            match self.fail_validate.lock().unwrap().take() {
                None => Ok(()),
                Some(error) => Err(error),
            }
        }

        async fn was_transfer_proposed_on_destination(&self) -> Result<bool> {
            self.record("was_transfer_proposed_on_destination");
            Ok(self.transfer_proposed.load(Ordering::SeqCst))
        }

        async fn propose_transfer_on_destination(&self) -> Result<()> {
            self.record("propose_transfer_on_destination");
            fail_flag(&self.fail_propose_transfer)?;
            self.transfer_proposed.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn sign_proposed_transfer_on_destination(&self) -> Result<()> {
            self.record("sign_proposed_transfer_on_destination");
            Ok(())
        }

        async fn process_quorum_reached_on_destination(&self) -> Result<bool> {
            self.record("process_quorum_reached_on_destination");
            Ok(self.quorum_on_destination.load(Ordering::SeqCst))
        }

        async fn was_transfer_executed_on_destination(&self) -> Result<bool> {
            self.record("was_transfer_executed_on_destination");
            Ok(self.transfer_executed.load(Ordering::SeqCst))
        }

        async fn execute_transfer_on_destination(&self) -> Result<()> {
            self.record("execute_transfer_on_destination");
            fail_flag(&self.fail_execute_transfer)?;
            self.transfer_executed.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn resolve_set_status_on_source(&self) -> Result<()> {
            self.record("resolve_set_status_on_source");
            fail_flag(&self.fail_resolve)?;
            let mut batch = self.batch.lock().unwrap();
            if let Some(batch) = batch.as_mut() {
                if !batch.statuses_are_set() {
                    batch.set_statuses_on_all_deposits(STATUS_EXECUTED);
                }
            }
            Ok(())
        }

        async fn was_set_status_proposed_on_source(&self) -> Result<bool> {
            self.record("was_set_status_proposed_on_source");
            Ok(self.set_status_proposed.load(Ordering::SeqCst))
        }

        async fn propose_set_status_on_source(&self) -> Result<()> {
            self.record("propose_set_status_on_source");
            fail_flag(&self.fail_propose_set_status)?;
            self.set_status_proposed.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn sign_proposed_set_status_on_source(&self) -> Result<()> {
            self.record("sign_proposed_set_status_on_source");
            Ok(())
        }

        async fn process_quorum_reached_on_source(&self) -> Result<bool> {
            self.record("process_quorum_reached_on_source");
            Ok(self.quorum_on_source.load(Ordering::SeqCst))
        }

        async fn was_set_status_executed_on_source(&self) -> Result<bool> {
            self.record("was_set_status_executed_on_source");
            Ok(self.set_status_executed.load(Ordering::SeqCst))
        }

        async fn execute_set_status_on_source(&self) -> Result<()> {
            self.record("execute_set_status_on_source");
            fail_flag(&self.fail_execute_set_status)?;
            self.set_status_executed.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn set_status_rejected_on_all_deposits(&self) {
            self.record("set_status_rejected_on_all_deposits");
            let mut batch = self.batch.lock().unwrap();
            if let Some(batch) = batch.as_mut() {
                batch.set_statuses_on_all_deposits(STATUS_REJECTED);
            }
        }

        async fn mark_all_deposits_executed(&self) {
            self.record("mark_all_deposits_executed");
            let mut batch = self.batch.lock().unwrap();
            if let Some(batch) = batch.as_mut() {
                batch.set_statuses_on_all_deposits(STATUS_EXECUTED);
            }
        }

        async fn wait_step_to_finish(&self) -> bool {
            self.record("wait_step_to_finish");
            true
        }

        fn clean_topology(&self) {
            self.record("clean_topology");
        }

        async fn process_max_quorum_retries_on_destination(&self) -> bool {
            Self::budget_step(&self.destination_quorum_budget)
        }

        async fn reset_quorum_retries_on_destination(&self) {}

        async fn process_max_quorum_retries_on_source(&self) -> bool {
            Self::budget_step(&self.source_quorum_budget)
        }

        async fn reset_quorum_retries_on_source(&self) {}

        async fn process_max_retries_on_was_proposed(&self) -> bool {
            Self::budget_step(&self.was_proposed_budget)
        }

        async fn reset_retries_on_was_proposed(&self) {}

        fn report_error(&self, _context: &'static str, _error: &Error) {}
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::ScriptedExecutor;
    use super::*;
    use crate::state_machine::{ArgsStateMachine, StateMachine, StepIdentifier};
    use mvx_bridge_core::status::StatusHandler;
    use mvx_bridge_core::{STATUS_EXECUTED, STATUS_REJECTED};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn machine_over(executor: Arc<ScriptedExecutor>) -> StateMachine {
        StateMachine::new(ArgsStateMachine {
            name: "semi-integrated".to_string(),
            steps: create_steps(executor),
            start_identifier: StepIdentifier::GettingPendingBatchFromSource,
            duration_between_steps: Duration::from_millis(1),
            status_handler: Arc::new(StatusHandler::new("semi-integrated")),
        })
        .unwrap()
    }

    async fn drive(machine: &mut StateMachine, max_ticks: usize) -> Vec<StepIdentifier> {
        let mut visited = vec![machine.current_step()];
        for _ in 0..max_ticks {
            machine.execute_step().await.unwrap();
            visited.push(machine.current_step());
            if machine.current_step()
                == StepIdentifier::GettingPendingBatchFromSource
                && visited.len() > 1
            {
                break;
            }
        }
        visited
    }

    #[tokio::test]
    async fn the_happy_flow_walks_the_seven_states_in_order() {
        let executor = Arc::new(ScriptedExecutor::with_batch(2));
        executor.leader.store(true, Ordering::SeqCst);
        executor.quorum_on_destination.store(true, Ordering::SeqCst);
        executor.quorum_on_source.store(true, Ordering::SeqCst);

        let mut machine = machine_over(executor.clone());
        let visited = drive(&mut machine, 12).await;

        assert_eq!(
            visited,
            vec![
                StepIdentifier::GettingPendingBatchFromSource,
                StepIdentifier::ProposingTransfer,
                StepIdentifier::WaitingSignaturesForProposeTransfer,
                StepIdentifier::ExecutingTransfer,
                StepIdentifier::ProposingSetStatus,
                StepIdentifier::WaitingSignaturesForProposeSetStatus,
                StepIdentifier::ExecutingSetStatus,
                StepIdentifier::GettingPendingBatchFromSource,
            ]
        );
    }

    #[tokio::test]
    async fn a_signer_only_relayer_still_follows_the_flow() {
        // someone else proposes and executes; this relayer just signs
        let executor = Arc::new(ScriptedExecutor::with_batch(1));
        executor.transfer_proposed.store(true, Ordering::SeqCst);
        executor.quorum_on_destination.store(true, Ordering::SeqCst);
        executor.transfer_executed.store(true, Ordering::SeqCst);
        executor.set_status_proposed.store(true, Ordering::SeqCst);
        executor.quorum_on_source.store(true, Ordering::SeqCst);
        executor.set_status_executed.store(true, Ordering::SeqCst);

        let mut machine = machine_over(executor.clone());
        let visited = drive(&mut machine, 12).await;

        // the machine never calls the leader-only verbs
        let calls = executor.recorded();
        assert!(!calls.contains(&"propose_transfer_on_destination"));
        assert!(!calls.contains(&"execute_transfer_on_destination"));
        assert!(!calls.contains(&"propose_set_status_on_source"));
        assert!(!calls.contains(&"execute_set_status_on_source"));
        assert_eq!(
            *visited.last().unwrap(),
            StepIdentifier::GettingPendingBatchFromSource
        );
    }

    #[tokio::test]
    async fn a_paused_contract_rejects_the_batch_and_reports_statuses() {
        let executor = Arc::new(ScriptedExecutor::with_batch(2));
        executor.leader.store(true, Ordering::SeqCst);
        executor.quorum_on_destination.store(true, Ordering::SeqCst);
        *executor.fail_execute_transfer.lock().unwrap() = Some("paused");

        let mut machine = machine_over(executor.clone());
        // walk to ExecutingTransfer
        for _ in 0..3 {
            machine.execute_step().await.unwrap();
        }
        assert_eq!(machine.current_step(), StepIdentifier::ExecutingTransfer);

        machine.execute_step().await.unwrap();
        assert_eq!(machine.current_step(), StepIdentifier::ProposingSetStatus);

        let batch = executor.batch.lock().unwrap().clone().unwrap();
        assert_eq!(batch.statuses, vec![STATUS_REJECTED, STATUS_REJECTED]);
    }

    #[tokio::test]
    async fn quorum_not_reached_returns_to_the_waiting_state() {
        let executor = Arc::new(ScriptedExecutor::with_batch(1));
        executor.leader.store(true, Ordering::SeqCst);
        executor.quorum_on_destination.store(true, Ordering::SeqCst);
        *executor.fail_execute_transfer.lock().unwrap() = Some("quorum");

        let mut machine = machine_over(executor.clone());
        for _ in 0..3 {
            machine.execute_step().await.unwrap();
        }
        assert_eq!(machine.current_step(), StepIdentifier::ExecutingTransfer);

        machine.execute_step().await.unwrap();
        assert_eq!(
            machine.current_step(),
            StepIdentifier::WaitingSignaturesForProposeTransfer
        );
        // the batch is untouched: no forced statuses
        let batch = executor.batch.lock().unwrap().clone().unwrap();
        assert!(!batch.statuses_are_set());
    }

    #[tokio::test]
    async fn an_exhausted_quorum_budget_aborts_the_batch() {
        let executor = Arc::new(ScriptedExecutor::with_batch(1));
        executor.transfer_proposed.store(true, Ordering::SeqCst);
        executor.destination_quorum_budget.store(1, Ordering::SeqCst);

        let mut machine = machine_over(executor.clone());
        machine.execute_step().await.unwrap();
        machine.execute_step().await.unwrap();
        assert_eq!(
            machine.current_step(),
            StepIdentifier::WaitingSignaturesForProposeTransfer
        );

        // first visit: budget spent, remain; second visit: exhausted
        machine.execute_step().await.unwrap();
        assert_eq!(
            machine.current_step(),
            StepIdentifier::WaitingSignaturesForProposeTransfer
        );
        machine.execute_step().await.unwrap();
        assert_eq!(machine.current_step(), StepIdentifier::ProposingSetStatus);

        let batch = executor.batch.lock().unwrap().clone().unwrap();
        assert_eq!(batch.statuses, vec![STATUS_REJECTED]);
    }

    #[tokio::test]
    async fn an_execution_by_someone_else_marks_deposits_executed() {
        let executor = Arc::new(ScriptedExecutor::with_batch(2));
        executor.transfer_proposed.store(true, Ordering::SeqCst);

        let mut machine = machine_over(executor.clone());
        machine.execute_step().await.unwrap();
        machine.execute_step().await.unwrap();
        assert_eq!(
            machine.current_step(),
            StepIdentifier::WaitingSignaturesForProposeTransfer
        );

        // quorum never arrives here, but another relayer already
        // executed the action
        executor.transfer_executed.store(true, Ordering::SeqCst);
        machine.execute_step().await.unwrap();
        assert_eq!(machine.current_step(), StepIdentifier::ProposingSetStatus);

        let calls = executor.recorded();
        assert!(calls.contains(&"clean_topology"));
        let batch = executor.batch.lock().unwrap().clone().unwrap();
        assert_eq!(batch.statuses, vec![STATUS_EXECUTED, STATUS_EXECUTED]);
    }

    #[tokio::test]
    async fn the_machine_waits_in_get_pending_until_a_batch_appears() {
        let executor = Arc::new(ScriptedExecutor::default());
        let mut machine = machine_over(executor.clone());

        machine.execute_step().await.unwrap();
        machine.execute_step().await.unwrap();
        assert_eq!(
            machine.current_step(),
            StepIdentifier::GettingPendingBatchFromSource
        );
    }

    #[tokio::test]
    async fn an_invalid_setup_is_recorded_and_takes_no_onchain_action() {
        let executor = Arc::new(ScriptedExecutor::with_batch(1));
        *executor.fail_validate.lock().unwrap() =
            Some(mvx_bridge_relayer_utils::Error::InvalidSetup(
                "native on both chains".to_string(),
            ));

        let mut machine = machine_over(executor.clone());
        machine.execute_step().await.unwrap();
        assert_eq!(
            machine.current_step(),
            StepIdentifier::GettingPendingBatchFromSource
        );
        let calls = executor.recorded();
        assert!(!calls.contains(&"propose_transfer_on_destination"));
        assert!(!calls.contains(&"propose_set_status_on_source"));
    }
}
