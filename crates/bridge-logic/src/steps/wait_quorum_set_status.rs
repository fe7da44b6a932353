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

/// Waits until the source gathers the signature quorum for the status
/// report, mirroring the transfer-side wait.
pub struct WaitQuorumSetStatusStep {
    bridge: Arc<dyn StepExecutor>,
}

impl WaitQuorumSetStatusStep {
    /// Creates the step over the shared executor.
    pub fn new(bridge: Arc<dyn StepExecutor>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Step for WaitQuorumSetStatusStep {
    fn identifier(&self) -> StepIdentifier {
        StepIdentifier::WaitingSignaturesForProposeSetStatus
    }

    async fn execute(&self) -> StepIdentifier {
        if self.bridge.stored_batch().await.is_none() {
            tracing::debug!("no batch found");
            return StepIdentifier::GettingPendingBatchFromSource;
        }

        if !self.bridge.wait_step_to_finish().await {
            return self.identifier();
        }

        match self.bridge.process_quorum_reached_on_source().await {
            Err(error) => {
                self.bridge
                    .report_error("error while checking the quorum", &error);
                return self.identifier();
            }
            Ok(true) => {
                self.bridge.reset_quorum_retries_on_source().await;
                return StepIdentifier::ExecutingSetStatus;
            }
            Ok(false) => {}
        }

        match self.bridge.was_set_status_executed_on_source().await {
            Err(error) => {
                self.bridge.report_error(
                    "error while checking the set status execution",
                    &error,
                );
                return self.identifier();
            }
            Ok(true) => {
                // the report already landed; the cycle is complete
                self.bridge.clean_topology();
                self.bridge.reset_quorum_retries_on_source().await;
                self.bridge.clear_stored_batch().await;
                return StepIdentifier::GettingPendingBatchFromSource;
            }
            Ok(false) => {}
        }

        if self.bridge.process_max_quorum_retries_on_source().await {
            // the statuses stay unreported this cycle; the next
            // discovery of the same nonce retries from scratch
            self.bridge.report_error(
                "max quorum retries reached on the source",
                &mvx_bridge_relayer_utils::Error::Generic(
                    "quorum was not reached within the retry budget",
                ),
            );
            self.bridge.reset_quorum_retries_on_source().await;
            self.bridge.clean_topology();
            self.bridge.clear_stored_batch().await;
            return StepIdentifier::GettingPendingBatchFromSource;
        }

        self.identifier()
    }
}
