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

//! Tracks whether a chain client still makes progress. A client that
//! keeps answering with the same block number for more than the allowed
//! delta is flagged unavailable, as is a client that errors.

use std::fmt;
use std::sync::Arc;

use mvx_bridge_core::status::{StatusHandler, METRIC_LAST_BLOCK_NONCE};

/// The availability verdict of a chain client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    /// The client answers and its chain advances.
    Available,
    /// The client errors or its chain is stuck.
    Unavailable,
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientStatus::Available => write!(f, "available"),
            ClientStatus::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// The per-client availability state machine. Owned behind the client's
/// mutex; one `update` per availability tick.
pub struct AvailabilityTracker {
    status_handler: Arc<StatusHandler>,
    status_metric: &'static str,
    error_metric: &'static str,
    allow_delta: u64,
    last_block_number: u64,
    retries: u64,
}

impl AvailabilityTracker {
    /// Creates a tracker publishing into the given metrics.
    pub fn new(
        status_handler: Arc<StatusHandler>,
        status_metric: &'static str,
        error_metric: &'static str,
        allow_delta: u64,
    ) -> Self {
        Self {
            status_handler,
            status_metric,
            error_metric,
            allow_delta,
            last_block_number: 0,
            retries: 0,
        }
    }

    /// Feeds one block-number observation (or fetch error) into the
    /// tracker and publishes the resulting status.
    pub fn update(&mut self, fetch_result: Result<u64, String>) -> ClientStatus {
        let current_block = match fetch_result {
            Err(message) => {
                self.set_status(
                    ClientStatus::Unavailable,
                    &message,
                    self.last_block_number,
                );
                return ClientStatus::Unavailable;
            }
            Ok(block) => block,
        };

        if current_block != self.last_block_number {
            self.retries = 0;
            self.last_block_number = current_block;
        } else {
            self.retries += 1;
        }

        if self.retries > self.allow_delta {
            let message = format!(
                "block {} fetched for {} times in a row",
                current_block, self.retries
            );
            self.set_status(ClientStatus::Unavailable, &message, current_block);
            return ClientStatus::Unavailable;
        }

        self.set_status(ClientStatus::Available, "", current_block);
        ClientStatus::Available
    }

    fn set_status(&self, status: ClientStatus, message: &str, block: u64) {
        self.status_handler
            .set_string_metric(self.status_metric, &status.to_string());
        self.status_handler
            .set_string_metric(self.error_metric, message);
        self.status_handler
            .set_int_metric(METRIC_LAST_BLOCK_NONCE, block as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mvx_bridge_core::status::{
        METRIC_ETH_CLIENT_STATUS, METRIC_LAST_ETH_CLIENT_ERROR,
    };

    fn tracker(allow_delta: u64) -> (AvailabilityTracker, Arc<StatusHandler>) {
        let handler = Arc::new(StatusHandler::new("eth-client"));
        let tracker = AvailabilityTracker::new(
            handler.clone(),
            METRIC_ETH_CLIENT_STATUS,
            METRIC_LAST_ETH_CLIENT_ERROR,
            allow_delta,
        );
        (tracker, handler)
    }

    #[test]
    fn advancing_blocks_keep_the_client_available() {
        let (mut tracker, handler) = tracker(2);
        for block in [100u64, 101, 102] {
            assert_eq!(tracker.update(Ok(block)), ClientStatus::Available);
        }
        assert_eq!(
            handler.string_metrics()[METRIC_ETH_CLIENT_STATUS],
            "available"
        );
        assert_eq!(
            handler.int_metrics()[METRIC_LAST_BLOCK_NONCE],
            102
        );
    }

    #[test]
    fn a_stuck_block_flips_to_unavailable_after_the_allowed_delta() {
        let (mut tracker, handler) = tracker(2);
        assert_eq!(tracker.update(Ok(100)), ClientStatus::Available);
        // identical block: retries 1, 2 are tolerated, 3 exceeds delta
        assert_eq!(tracker.update(Ok(100)), ClientStatus::Available);
        assert_eq!(tracker.update(Ok(100)), ClientStatus::Available);
        assert_eq!(tracker.update(Ok(100)), ClientStatus::Unavailable);
        assert_eq!(
            handler.string_metrics()[METRIC_LAST_ETH_CLIENT_ERROR],
            "block 100 fetched for 3 times in a row"
        );

        // progress resets the counter
        assert_eq!(tracker.update(Ok(101)), ClientStatus::Available);
        assert_eq!(
            handler.string_metrics()[METRIC_LAST_ETH_CLIENT_ERROR],
            ""
        );
    }

    #[test]
    fn any_error_marks_the_client_unavailable_immediately() {
        let (mut tracker, handler) = tracker(5);
        assert_eq!(
            tracker.update(Err("connection refused".to_string())),
            ClientStatus::Unavailable
        );
        assert_eq!(
            handler.string_metrics()[METRIC_ETH_CLIENT_STATUS],
            "unavailable"
        );
        assert_eq!(
            handler.string_metrics()[METRIC_LAST_ETH_CLIENT_ERROR],
            "connection refused"
        );
    }
}
