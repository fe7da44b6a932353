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

/// Gets the transfer proposal on the destination chain — submitted by
/// the leader, observed by everyone else — then signs it locally.
pub struct ProposeTransferStep {
    bridge: Arc<dyn StepExecutor>,
}

impl ProposeTransferStep {
    /// Creates the step over the shared executor.
    pub fn new(bridge: Arc<dyn StepExecutor>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Step for ProposeTransferStep {
    fn identifier(&self) -> StepIdentifier {
        StepIdentifier::ProposingTransfer
    }

    async fn execute(&self) -> StepIdentifier {
        if self.bridge.stored_batch().await.is_none() {
            tracing::debug!("no batch found");
            return StepIdentifier::GettingPendingBatchFromSource;
        }

        let mut was_proposed =
            match self.bridge.was_transfer_proposed_on_destination().await {
                Err(error) => {
                    self.bridge.report_error(
                        "error determining if the batch was proposed or not",
                        &error,
                    );
                    return self.identifier();
                }
                Ok(was_proposed) => was_proposed,
            };

        if !was_proposed {
            if self.bridge.my_turn_as_leader().await {
                if let Err(error) =
                    self.bridge.propose_transfer_on_destination().await
                {
                    self.bridge
                        .report_error("error proposing transfer", &error);
                    self.bridge.set_status_rejected_on_all_deposits().await;
                    return StepIdentifier::ProposingSetStatus;
                }
            } else {
                tracing::debug!("not my turn as leader in this round");
            }

            if !self.bridge.wait_step_to_finish().await {
                return self.identifier();
            }

            was_proposed =
                match self.bridge.was_transfer_proposed_on_destination().await {
                    Err(error) => {
                        self.bridge.report_error(
                            "error determining if the batch was proposed or not",
                            &error,
                        );
                        return self.identifier();
                    }
                    Ok(was_proposed) => was_proposed,
                };
            if !was_proposed {
                if self.bridge.process_max_retries_on_was_proposed().await {
                    self.bridge.report_error(
                        "max retries reached waiting for the transfer proposal",
                        &mvx_bridge_relayer_utils::Error::Generic(
                            "proposal never landed on chain",
                        ),
                    );
                    self.bridge.set_status_rejected_on_all_deposits().await;
                    self.bridge.reset_retries_on_was_proposed().await;
                    return StepIdentifier::ProposingSetStatus;
                }
                return self.identifier();
            }
        }

        self.bridge.reset_retries_on_was_proposed().await;
        if let Err(error) =
            self.bridge.sign_proposed_transfer_on_destination().await
        {
            self.bridge
                .report_error("error signing the proposed transfer", &error);
            return self.identifier();
        }

        StepIdentifier::WaitingSignaturesForProposeTransfer
    }
}
