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

//! The step-table driver of a half bridge. One transition per tick,
//! chosen by the current step itself; the table is validated at
//! construction and the machine has no terminal state.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mvx_bridge_core::status::{StatusHandler, METRIC_CURRENT_STATE_MACHINE_STEP};
use mvx_bridge_relayer_context::Shutdown;
use mvx_bridge_relayer_utils::{probe, Error, Result};

const STOPPED: &str = "stopped";

/// The closed set of states a half bridge cycles through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepIdentifier {
    /// Poll until a pending batch exists on the source chain.
    GettingPendingBatchFromSource,
    /// Propose the transfer on the destination and sign locally.
    ProposingTransfer,
    /// Wait until quorum is reached or someone else executed.
    WaitingSignaturesForProposeTransfer,
    /// The leader submits the destination-side execution.
    ExecutingTransfer,
    /// Propose the status report on the source chain.
    ProposingSetStatus,
    /// Wait for quorum on the status report.
    WaitingSignaturesForProposeSetStatus,
    /// The leader submits the source-side set-status.
    ExecutingSetStatus,
}

impl fmt::Display for StepIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GettingPendingBatchFromSource => {
                "GettingPendingBatchFromSource"
            }
            Self::ProposingTransfer => "ProposingTransfer",
            Self::WaitingSignaturesForProposeTransfer => {
                "WaitingSignaturesForProposeTransfer"
            }
            Self::ExecutingTransfer => "ExecutingTransfer",
            Self::ProposingSetStatus => "ProposingSetStatus",
            Self::WaitingSignaturesForProposeSetStatus => {
                "WaitingSignaturesForProposeSetStatus"
            }
            Self::ExecutingSetStatus => "ExecutingSetStatus",
        };
        f.write_str(name)
    }
}

/// One transition of the machine. `execute` consults the executor and
/// answers with the identifier of the next step.
#[async_trait]
pub trait Step: Send + Sync {
    /// The step's own identifier in the table.
    fn identifier(&self) -> StepIdentifier;
    /// Executes the step, returning the next step to run.
    async fn execute(&self) -> StepIdentifier;
}

/// The arguments DTO for [`StateMachine::new`].
pub struct ArgsStateMachine {
    /// A name for the logs, e.g. `EthereumToMultiversX`.
    pub name: String,
    /// The steps; identifiers must be unique.
    pub steps: Vec<Box<dyn Step>>,
    /// Where the machine starts (and restarts after a full cycle).
    pub start_identifier: StepIdentifier,
    /// The pause between two ticks.
    pub duration_between_steps: Duration,
    /// The half bridge's status metrics.
    pub status_handler: Arc<StatusHandler>,
}

/// A step-by-step driver with an identifier, a step table and the
/// executor behind its steps.
pub struct StateMachine {
    name: String,
    steps: HashMap<StepIdentifier, Box<dyn Step>>,
    current_step: StepIdentifier,
    duration_between_steps: Duration,
    status_handler: Arc<StatusHandler>,
}

impl StateMachine {
    /// Creates a machine, validating the step table: duplicated
    /// identifiers are rejected and the start identifier must be
    /// present.
    pub fn new(args: ArgsStateMachine) -> Result<Self> {
        let mut steps = HashMap::with_capacity(args.steps.len());
        for step in args.steps {
            let identifier = step.identifier();
            if steps.insert(identifier, step).is_some() {
                return Err(Error::DuplicatedStepIdentifier(
                    identifier.to_string(),
                ));
            }
        }
        if !steps.contains_key(&args.start_identifier) {
            return Err(Error::StepNotFound(args.start_identifier.to_string()));
        }

        Ok(Self {
            name: args.name,
            steps,
            current_step: args.start_identifier,
            duration_between_steps: args.duration_between_steps,
            status_handler: args.status_handler,
        })
    }

    /// The identifier of the step the machine would run next.
    pub fn current_step(&self) -> StepIdentifier {
        self.current_step
    }

    /// Executes exactly one step and moves the cursor.
    pub async fn execute_step(&mut self) -> Result<()> {
        tracing::trace!(
            machine = self.name,
            step = %self.current_step,
            "executing step"
        );
        self.status_handler.set_string_metric(
            METRIC_CURRENT_STATE_MACHINE_STEP,
            &self.current_step.to_string(),
        );

        let step = self
            .steps
            .get(&self.current_step)
            .ok_or_else(|| Error::StepNotFound(self.current_step.to_string()))?;
        let next = step.execute().await;
        if !self.steps.contains_key(&next) {
            return Err(Error::StepNotFound(next.to_string()));
        }

        tracing::event!(
            target: probe::TARGET,
            tracing::Level::TRACE,
            kind = %probe::Kind::StateMachine,
            machine = %self.name,
            from = %self.current_step,
            to = %next,
        );
        self.current_step = next;
        Ok(())
    }

    /// The main execute loop: one step per tick, until shutdown or a
    /// broken table.
    pub async fn run(mut self, mut shutdown: Shutdown) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!(
                        machine = self.name,
                        "state machine main execute loop is closing..."
                    );
                    self.status_handler.set_string_metric(
                        METRIC_CURRENT_STATE_MACHINE_STEP,
                        STOPPED,
                    );
                    return;
                }
                _ = tokio::time::sleep(self.duration_between_steps) => {
                    if let Err(error) = self.execute_step().await {
                        tracing::error!(
                            machine = self.name,
                            %error,
                            "state machine stopped"
                        );
                        self.status_handler.set_string_metric(
                            METRIC_CURRENT_STATE_MACHINE_STEP,
                            STOPPED,
                        );
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedStep {
        identifier: StepIdentifier,
        next: StepIdentifier,
        executions: Arc<Mutex<Vec<StepIdentifier>>>,
    }

    #[async_trait]
    impl Step for ScriptedStep {
        fn identifier(&self) -> StepIdentifier {
            self.identifier
        }

        async fn execute(&self) -> StepIdentifier {
            self.executions.lock().unwrap().push(self.identifier);
            self.next
        }
    }

    fn scripted(
        identifier: StepIdentifier,
        next: StepIdentifier,
        executions: &Arc<Mutex<Vec<StepIdentifier>>>,
    ) -> Box<dyn Step> {
        Box::new(ScriptedStep {
            identifier,
            next,
            executions: executions.clone(),
        })
    }

    fn machine_args(steps: Vec<Box<dyn Step>>) -> ArgsStateMachine {
        ArgsStateMachine {
            name: "test-machine".to_string(),
            steps,
            start_identifier: StepIdentifier::GettingPendingBatchFromSource,
            duration_between_steps: Duration::from_millis(1),
            status_handler: Arc::new(StatusHandler::new("test")),
        }
    }

    #[test]
    fn duplicated_identifiers_are_rejected_at_construction() {
        let executions = Arc::new(Mutex::new(Vec::new()));
        let steps = vec![
            scripted(
                StepIdentifier::GettingPendingBatchFromSource,
                StepIdentifier::ProposingTransfer,
                &executions,
            ),
            scripted(
                StepIdentifier::GettingPendingBatchFromSource,
                StepIdentifier::ProposingTransfer,
                &executions,
            ),
        ];
        assert!(matches!(
            StateMachine::new(machine_args(steps)),
            Err(Error::DuplicatedStepIdentifier(_))
        ));
    }

    #[test]
    fn a_missing_start_step_is_rejected_at_construction() {
        let executions = Arc::new(Mutex::new(Vec::new()));
        let steps = vec![scripted(
            StepIdentifier::ProposingTransfer,
            StepIdentifier::ProposingTransfer,
            &executions,
        )];
        assert!(matches!(
            StateMachine::new(machine_args(steps)),
            Err(Error::StepNotFound(_))
        ));
    }

    #[tokio::test]
    async fn each_tick_runs_exactly_one_transition() {
        let executions = Arc::new(Mutex::new(Vec::new()));
        let steps = vec![
            scripted(
                StepIdentifier::GettingPendingBatchFromSource,
                StepIdentifier::ProposingTransfer,
                &executions,
            ),
            scripted(
                StepIdentifier::ProposingTransfer,
                StepIdentifier::GettingPendingBatchFromSource,
                &executions,
            ),
        ];
        let mut machine = StateMachine::new(machine_args(steps)).unwrap();

        machine.execute_step().await.unwrap();
        machine.execute_step().await.unwrap();
        machine.execute_step().await.unwrap();

        assert_eq!(
            *executions.lock().unwrap(),
            vec![
                StepIdentifier::GettingPendingBatchFromSource,
                StepIdentifier::ProposingTransfer,
                StepIdentifier::GettingPendingBatchFromSource,
            ]
        );
    }

    #[tokio::test]
    async fn a_step_answering_an_unknown_identifier_stops_the_machine() {
        let executions = Arc::new(Mutex::new(Vec::new()));
        let steps = vec![scripted(
            StepIdentifier::GettingPendingBatchFromSource,
            StepIdentifier::ExecutingSetStatus,
            &executions,
        )];
        let mut machine = StateMachine::new(machine_args(steps)).unwrap();

        assert!(matches!(
            machine.execute_step().await,
            Err(Error::StepNotFound(_))
        ));
    }
}
