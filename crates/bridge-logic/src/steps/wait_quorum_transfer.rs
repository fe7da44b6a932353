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

use std::sync::Arc;

use async_trait::async_trait;

use crate::executor::StepExecutor;
use crate::state_machine::{Step, StepIdentifier};

/// Waits until the destination gathers the signature quorum for the
/// proposed transfer, or until someone else already executed it. The
/// wait is bounded; an exhausted budget rejects the batch.
pub struct WaitQuorumTransferStep {
    bridge: Arc<dyn StepExecutor>,
}

impl WaitQuorumTransferStep {
    /// Creates the step over the shared executor.
    pub fn new(bridge: Arc<dyn StepExecutor>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Step for WaitQuorumTransferStep {
    fn identifier(&self) -> StepIdentifier {
        StepIdentifier::WaitingSignaturesForProposeTransfer
    }

    async fn execute(&self) -> StepIdentifier {
        if self.bridge.stored_batch().await.is_none() {
            tracing::debug!("no batch found");
            return StepIdentifier::GettingPendingBatchFromSource;
        }

        if !self.bridge.wait_step_to_finish().await {
            return self.identifier();
        }

        match self.bridge.process_quorum_reached_on_destination().await {
            Err(error) => {
                self.bridge
                    .report_error("error while checking the quorum", &error);
                return self.identifier();
            }
            Ok(true) => {
                self.bridge.reset_quorum_retries_on_destination().await;
                return StepIdentifier::ExecutingTransfer;
            }
            Ok(false) => {}
        }

        match self.bridge.was_transfer_executed_on_destination().await {
            Err(error) => {
                self.bridge.report_error(
                    "error while checking the transfer execution",
                    &error,
                );
                return self.identifier();
            }
            Ok(true) => {
                // another relayer won the race; nothing left to submit
                self.bridge.clean_topology();
                self.bridge.mark_all_deposits_executed().await;
                self.bridge.reset_quorum_retries_on_destination().await;
                return StepIdentifier::ProposingSetStatus;
            }
            Ok(false) => {}
        }

        if self.bridge.process_max_quorum_retries_on_destination().await {
            self.bridge.report_error(
                "max quorum retries reached on the destination",
                &mvx_bridge_relayer_utils::Error::Generic(
                    "quorum was not reached within the retry budget",
                ),
            );
            self.bridge.set_status_rejected_on_all_deposits().await;
            self.bridge.reset_quorum_retries_on_destination().await;
            return StepIdentifier::ProposingSetStatus;
        }

        self.identifier()
    }
}
