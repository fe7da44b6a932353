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

use derive_more::Display;
/// Target for logger
pub const TARGET: &str = "bridge_probe";

/// The Kind of the Probe.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// When the Lifecycle of the Relayer changes, like starting or shutting down.
    #[display(fmt = "lifecycle")]
    Lifecycle,
    /// A half-bridge state machine executed or changed a step.
    #[display(fmt = "state_machine")]
    StateMachine,
    /// Leader election decisions for the current interval.
    #[display(fmt = "leader_election")]
    LeaderElection,
    /// Peer broadcast traffic (join/sign topics).
    #[display(fmt = "broadcast")]
    Broadcast,
    /// Chain client availability transitions.
    #[display(fmt = "availability")]
    Availability,
    /// Gas price oracle fetches.
    #[display(fmt = "gas_oracle")]
    GasOracle,
    /// When the relayer will retry to do something.
    #[display(fmt = "retry")]
    Retry,
}
