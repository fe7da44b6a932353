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

//! Inbound admission quotas. Peers get a per-interval message and size
//! budget plus a per-topic message budget; repeated violations land the
//! peer on a timed blacklist which then denies its topic traffic.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use mvx_bridge_relayer_config::AntifloodConfig;
use mvx_bridge_relayer_context::Shutdown;
use mvx_bridge_relayer_utils::{Error, Result};

use crate::{PeerDenialEvaluator, PeerId};

#[derive(Default)]
struct PeerCounters {
    messages: u32,
    total_size: u64,
}

#[derive(Default)]
struct TopicCounters {
    // per topic, per peer
    messages: HashMap<String, HashMap<PeerId, u32>>,
    // per-topic overrides of the default quota
    max_messages: HashMap<String, u32>,
}

/// The antiflood admission handler.
pub struct AntifloodHandler {
    enabled: bool,
    interval: Duration,
    peer_max_messages: u32,
    peer_max_total_size: u64,
    topic_max_messages: u32,
    black_list_threshold: u32,
    black_list_duration: Duration,

    peer_counters: Mutex<HashMap<PeerId, PeerCounters>>,
    topic_counters: Mutex<TopicCounters>,
    violations: Mutex<HashMap<PeerId, u32>>,
    black_list: Mutex<HashMap<PeerId, Instant>>,
}

impl AntifloodHandler {
    /// Creates a handler from its config section.
    pub fn new(config: &AntifloodConfig) -> Result<Self> {
        if config.enabled && config.interval_in_seconds == 0 {
            return Err(Error::InvalidValue(
                "for AntifloodConfig.IntervalInSeconds, got: 0".to_string(),
            ));
        }
        Ok(Self {
            enabled: config.enabled,
            interval: Duration::from_secs(config.interval_in_seconds.max(1)),
            peer_max_messages: config.peer_max_messages_per_interval,
            peer_max_total_size: config.peer_max_total_size_per_interval,
            topic_max_messages: config.topic_max_messages_per_interval,
            black_list_threshold: config.black_list_threshold,
            black_list_duration: Duration::from_secs(
                config.black_list_duration_in_seconds,
            ),
            peer_counters: Mutex::new(HashMap::new()),
            topic_counters: Mutex::new(TopicCounters::default()),
            violations: Mutex::new(HashMap::new()),
            black_list: Mutex::new(HashMap::new()),
        })
    }

    /// Overrides the message quota of one topic.
    pub fn set_max_messages_for_topic(&self, topic: &str, max: u32) {
        self.topic_counters
            .lock()
            .expect("topic counters lock poisoned")
            .max_messages
            .insert(topic.to_string(), max);
    }

    /// Charges one inbound message of `size` bytes against the peer's
    /// interval budget.
    pub fn can_process_message(&self, peer: &PeerId, size: u64) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let mut counters = self
            .peer_counters
            .lock()
            .expect("peer counters lock poisoned");
        let entry = counters.entry(peer.clone()).or_default();
        entry.messages += 1;
        entry.total_size += size;
        if entry.messages > self.peer_max_messages
            || entry.total_size > self.peer_max_total_size
        {
            drop(counters);
            self.register_violation(peer);
            return Err(Error::SystemBusy(peer.clone()));
        }
        Ok(())
    }

    /// Charges one inbound message against the peer's per-topic budget
    /// and consults the denial verdict.
    pub fn can_process_message_on_topic(
        &self,
        peer: &PeerId,
        topic: &str,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.is_denied(peer) {
            return Err(Error::SystemBusy(peer.clone()));
        }

        let mut counters = self
            .topic_counters
            .lock()
            .expect("topic counters lock poisoned");
        let max = counters
            .max_messages
            .get(topic)
            .copied()
            .unwrap_or(self.topic_max_messages);
        let entry = counters
            .messages
            .entry(topic.to_string())
            .or_default()
            .entry(peer.clone())
            .or_default();
        *entry += 1;
        if *entry > max {
            drop(counters);
            self.register_violation(peer);
            return Err(Error::SystemBusy(peer.clone()));
        }
        Ok(())
    }

    fn register_violation(&self, peer: &PeerId) {
        let mut violations =
            self.violations.lock().expect("violations lock poisoned");
        let count = violations.entry(peer.clone()).or_default();
        *count += 1;
        if *count >= self.black_list_threshold {
            self.black_list
                .lock()
                .expect("black list lock poisoned")
                .insert(peer.clone(), Instant::now() + self.black_list_duration);
            tracing::warn!(peer, "peer black-listed by antiflood");
        }
    }

    fn reset_interval_counters(&self) {
        self.peer_counters
            .lock()
            .expect("peer counters lock poisoned")
            .clear();
        self.topic_counters
            .lock()
            .expect("topic counters lock poisoned")
            .messages
            .clear();
        // expired blacklist entries drop out here as well
        self.black_list
            .lock()
            .expect("black list lock poisoned")
            .retain(|_, until| *until > Instant::now());
    }

    /// The per-interval reset loop; runs until shutdown.
    pub async fn run(&self, mut shutdown: Shutdown) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!("antiflood reset loop is closing...");
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {
                    self.reset_interval_counters();
                }
            }
        }
    }
}

impl PeerDenialEvaluator for AntifloodHandler {
    fn is_denied(&self, peer: &PeerId) -> bool {
        let black_list = self.black_list.lock().expect("black list lock poisoned");
        match black_list.get(peer) {
            Some(until) => *until > Instant::now(),
            None => false,
        }
    }
}
