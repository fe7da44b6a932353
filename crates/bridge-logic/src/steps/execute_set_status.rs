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
use mvx_bridge_relayer_utils::Error;

use crate::executor::StepExecutor;
use crate::state_machine::{Step, StepIdentifier};

/// The leader submits the source-side set-status; on success the
/// machine drops the batch from its working set and re-enters the
/// initial state.
pub struct ExecuteSetStatusStep {
    bridge: Arc<dyn StepExecutor>,
}

impl ExecuteSetStatusStep {
    /// Creates the step over the shared executor.
    pub fn new(bridge: Arc<dyn StepExecutor>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Step for ExecuteSetStatusStep {
    fn identifier(&self) -> StepIdentifier {
        StepIdentifier::ExecutingSetStatus
    }

    async fn execute(&self) -> StepIdentifier {
        if self.bridge.stored_batch().await.is_none() {
            tracing::debug!("no batch found");
            return StepIdentifier::GettingPendingBatchFromSource;
        }

        let mut was_executed =
            match self.bridge.was_set_status_executed_on_source().await {
                Err(error) => {
                    self.bridge.report_error(
                        "error while checking the set status execution",
                        &error,
                    );
                    return self.identifier();
                }
                Ok(was_executed) => was_executed,
            };

        if !was_executed {
            if self.bridge.my_turn_as_leader().await {
                if let Err(error) =
                    self.bridge.execute_set_status_on_source().await
                {
                    if matches!(error, Error::QuorumNotReached { .. }) {
                        self.bridge
                            .report_error("error executing set status", &error);
                        return StepIdentifier::WaitingSignaturesForProposeSetStatus;
                    }
                    self.bridge
                        .report_error("error executing set status", &error);
                    return self.identifier();
                }
            } else {
                tracing::debug!("not my turn as leader in this round");
            }

            if !self.bridge.wait_step_to_finish().await {
                return self.identifier();
            }

            was_executed =
                match self.bridge.was_set_status_executed_on_source().await {
                    Err(error) => {
                        self.bridge.report_error(
                            "error while checking the set status execution",
                            &error,
                        );
                        return self.identifier();
                    }
                    Ok(was_executed) => was_executed,
                };
        }

        if was_executed {
            tracing::info!("set status was executed on the source");
            self.bridge.clean_topology();
            self.bridge.clear_stored_batch().await;
            return StepIdentifier::GettingPendingBatchFromSource;
        }

        self.identifier()
    }
}
