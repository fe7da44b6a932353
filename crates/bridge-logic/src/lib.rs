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

#![warn(missing_docs)]
//! # Bridge Logic Module 🕸️
//!
//! The replicated per-direction state machine that drives a batch from
//! "pending on source" to "finalized on destination" and back to
//! "status reported on source", plus the collaborators it leans on:
//! the bridge executor, the signatures holder and the leader topology.

/// The stateless operations layer between steps and chains.
pub mod executor;
/// The content-addressed signature sink.
pub mod signatures;
/// The step-table driver.
pub mod state_machine;
/// The seven per-direction transitions.
pub mod steps;
/// Deterministic leader rotation.
pub mod topology;

pub use executor::{ArgsBridgeExecutor, BridgeExecutor, StepExecutor};
pub use signatures::SignaturesHolder;
pub use state_machine::{StateMachine, Step, StepIdentifier};
pub use topology::{ArgsTopologyHandler, TopologyHandler, TopologyProvider};
