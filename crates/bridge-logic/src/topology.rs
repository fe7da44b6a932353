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

//! Deterministic leader rotation. Given synchronised clocks and
//! identical role-provider snapshots, every relayer computes the same
//! leader index for the current interval.

use std::sync::Arc;
use std::time::Duration;

use mvx_bridge_chain_clients::roles::SortedPublicKeysProvider;
use mvx_bridge_core::Timer;
use mvx_bridge_relayer_utils::{Error, Result};

/// Answers "is this relayer the leader right now".
pub trait TopologyProvider: Send + Sync {
    /// True when this relayer is authorised to submit transactions in
    /// the current interval.
    fn my_turn_as_leader(&self) -> bool;
}

/// The arguments DTO for [`TopologyHandler::new`].
pub struct ArgsTopologyHandler {
    /// The sorted relayer key set.
    pub sorted_public_keys_provider: Arc<dyn SortedPublicKeysProvider>,
    /// The synchronised wall clock.
    pub timer: Arc<dyn Timer>,
    /// Length of one leader window.
    pub interval_for_leader: Duration,
    /// This relayer's own public key bytes.
    pub address_bytes: Vec<u8>,
}

/// The modular-time leader selector.
pub struct TopologyHandler {
    sorted_public_keys_provider: Arc<dyn SortedPublicKeysProvider>,
    timer: Arc<dyn Timer>,
    interval_seconds: i64,
    address_bytes: Vec<u8>,
}

impl TopologyHandler {
    /// Creates a handler; the interval must span at least one second
    /// and the own address must be known.
    pub fn new(args: ArgsTopologyHandler) -> Result<Self> {
        let interval_seconds = args.interval_for_leader.as_secs() as i64;
        if interval_seconds <= 0 {
            return Err(Error::InvalidValue(
                "for IntervalForLeader, got less than one second".to_string(),
            ));
        }
        if args.address_bytes.is_empty() {
            return Err(Error::InvalidValue(
                "for topology address, got empty bytes".to_string(),
            ));
        }

        Ok(Self {
            sorted_public_keys_provider: args.sorted_public_keys_provider,
            timer: args.timer,
            interval_seconds,
            address_bytes: args.address_bytes,
        })
    }

    /// The index of the current leader in the sorted key set, or `None`
    /// while the set is empty.
    pub fn leader_index(&self, num_relayers: usize) -> Option<usize> {
        if num_relayers == 0 {
            return None;
        }
        let index =
            (self.timer.now_unix() / self.interval_seconds) % num_relayers as i64;
        Some(index as usize)
    }
}

impl TopologyProvider for TopologyHandler {
    fn my_turn_as_leader(&self) -> bool {
        let sorted_public_keys =
            self.sorted_public_keys_provider.sorted_public_keys();
        match self.leader_index(sorted_public_keys.len()) {
            None => false,
            Some(index) => sorted_public_keys[index] == self.address_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mvx_bridge_core::timer::ManualTimer;

    struct FixedKeys(Vec<Vec<u8>>);

    impl SortedPublicKeysProvider for FixedKeys {
        fn sorted_public_keys(&self) -> Vec<Vec<u8>> {
            self.0.clone()
        }
    }

    fn handler(
        keys: Vec<Vec<u8>>,
        address: Vec<u8>,
        interval_secs: u64,
        now: i64,
    ) -> (TopologyHandler, Arc<ManualTimer>) {
        let timer = Arc::new(ManualTimer::new(now));
        let handler = TopologyHandler::new(ArgsTopologyHandler {
            sorted_public_keys_provider: Arc::new(FixedKeys(keys)),
            timer: timer.clone(),
            interval_for_leader: Duration::from_secs(interval_secs),
            address_bytes: address,
        })
        .unwrap();
        (handler, timer)
    }

    fn key(fill: u8) -> Vec<u8> {
        vec![fill; 32]
    }

    #[test]
    fn with_two_relayers_at_second_sixty_the_second_key_leads() {
        // (60 / 60) mod 2 = 1: relayer B leads, relayer A only signs
        let keys = vec![key(0xa), key(0xb)];
        let (handler_a, _) = handler(keys.clone(), key(0xa), 60, 60);
        let (handler_b, _) = handler(keys, key(0xb), 60, 60);

        assert!(!handler_a.my_turn_as_leader());
        assert!(handler_b.my_turn_as_leader());
    }

    #[test]
    fn the_index_is_stable_within_an_interval_and_advances_at_its_edge() {
        let keys = vec![key(1), key(2), key(3)];
        let (handler, timer) = handler(keys, key(2), 120, 239);

        // 239 / 120 mod 3 = 1
        assert_eq!(handler.leader_index(3), Some(1));
        assert!(handler.my_turn_as_leader());

        // every second of the same interval answers identically
        for now in 120..240 {
            timer.set_now(now);
            assert_eq!(handler.leader_index(3), Some(1), "at second {now}");
        }

        // 240 / 120 mod 3 = 2
        timer.set_now(240);
        assert_eq!(handler.leader_index(3), Some(2));
        assert!(!handler.my_turn_as_leader());
    }

    #[test]
    fn an_empty_relayer_set_has_no_leader() {
        let (handler, _) = handler(Vec::new(), key(1), 60, 60);
        assert!(!handler.my_turn_as_leader());
        assert_eq!(handler.leader_index(0), None);
    }

    #[test]
    fn construction_validates_interval_and_address() {
        let provider = Arc::new(FixedKeys(Vec::new()));
        let timer = Arc::new(ManualTimer::new(0));

        let zero_interval = TopologyHandler::new(ArgsTopologyHandler {
            sorted_public_keys_provider: provider.clone(),
            timer: timer.clone(),
            interval_for_leader: Duration::from_millis(500),
            address_bytes: key(1),
        });
        assert!(zero_interval.is_err());

        let empty_address = TopologyHandler::new(ArgsTopologyHandler {
            sorted_public_keys_provider: provider,
            timer,
            interval_for_leader: Duration::from_secs(60),
            address_bytes: Vec::new(),
        });
        assert!(empty_address.is_err());
    }
}
