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

/// Polls the source chain until a pending batch exists, then validates
/// it before handing it to the transfer flow.
pub struct GetPendingStep {
    bridge: Arc<dyn StepExecutor>,
}

impl GetPendingStep {
    /// Creates the step over the shared executor.
    pub fn new(bridge: Arc<dyn StepExecutor>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Step for GetPendingStep {
    fn identifier(&self) -> StepIdentifier {
        StepIdentifier::GettingPendingBatchFromSource
    }

    async fn execute(&self) -> StepIdentifier {
        self.bridge.check_clients_availability().await;

        match self.bridge.get_and_store_batch_from_source().await {
            Err(error) => {
                self.bridge
                    .report_error("error fetching pending batch", &error);
                return self.identifier();
            }
            Ok(false) => {
                tracing::debug!("no new batch found on source");
                return self.identifier();
            }
            Ok(true) => {}
        }

        if let Err(error) = self.bridge.validate_batch().await {
            match error {
                Error::InvalidSetup(_) => {
                    // the batch can not be bridged at all; record the
                    // reason and take no on-chain action
                    self.bridge
                        .report_error("batch has an invalid setup", &error);
                }
                other => {
                    self.bridge.report_error("error validating batch", &other);
                }
            }
            return self.identifier();
        }

        StepIdentifier::ProposingTransfer
    }
}
