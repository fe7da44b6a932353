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
//! # Relayer Store Module 🕸️
//!
//! Persistent storage for the relayer's durable metric subset. Only the
//! metrics enumerated in [`mvx_bridge_core::status::PERSISTED_METRICS`]
//! survive restarts; batch state is deliberately never persisted — the
//! state machine re-discovers pending batches by querying both chains.

/// A module for managing in-memory storage of the relayer.
pub mod mem;
/// A module for setting up and managing a [Sled](https://sled.rs)-based database.
pub mod sled;

pub use self::sled::SledStore;
pub use mem::InMemoryStore;
