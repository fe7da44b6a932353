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

//! Named in-memory metric holders. A small subset of the metric keys is
//! written through to persistent storage and survives restarts; batch
//! state is never persisted.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use mvx_bridge_relayer_utils::Result;

/// Counts the number of executed batches.
pub const METRIC_NUM_BATCHES: &str = "num batches";
/// Counts the requests issued by the Ethereum client.
pub const METRIC_NUM_ETH_CLIENT_REQUESTS: &str = "num ethereum client requests";
/// Counts the transactions sent by the Ethereum client.
pub const METRIC_NUM_ETH_CLIENT_TRANSACTIONS: &str =
    "num ethereum client transactions";
/// The last Ethereum block number the relayer queried.
pub const METRIC_LAST_QUERIED_ETH_BLOCK: &str =
    "ethereum last queried block number";
/// The last MultiversX block number the relayer queried.
pub const METRIC_LAST_QUERIED_MVX_BLOCK: &str =
    "multiversx last queried block number";
/// The availability status of the Ethereum client.
pub const METRIC_ETH_CLIENT_STATUS: &str = "ethereum client status";
/// The availability status of the MultiversX client.
pub const METRIC_MVX_CLIENT_STATUS: &str = "multiversx client status";
/// The last error the Ethereum client encountered.
pub const METRIC_LAST_ETH_CLIENT_ERROR: &str =
    "ethereum client last encountered error";
/// The last error the MultiversX client encountered.
pub const METRIC_LAST_MVX_CLIENT_ERROR: &str =
    "multiversx client last encountered error";
/// The last block nonce seen by an availability check.
pub const METRIC_LAST_BLOCK_NONCE: &str = "last block nonce";
/// The last error any component reported through a status handler.
pub const METRIC_LAST_ERROR: &str = "last encountered error";
/// The step a state machine is currently executing.
pub const METRIC_CURRENT_STATE_MACHINE_STEP: &str =
    "current state machine step";

/// The metric keys written through to persistent storage.
pub const PERSISTED_METRICS: [&str; 10] = [
    METRIC_NUM_BATCHES,
    METRIC_NUM_ETH_CLIENT_REQUESTS,
    METRIC_NUM_ETH_CLIENT_TRANSACTIONS,
    METRIC_LAST_QUERIED_ETH_BLOCK,
    METRIC_LAST_QUERIED_MVX_BLOCK,
    METRIC_ETH_CLIENT_STATUS,
    METRIC_MVX_CLIENT_STATUS,
    METRIC_LAST_ETH_CLIENT_ERROR,
    METRIC_LAST_MVX_CLIENT_ERROR,
    METRIC_LAST_BLOCK_NONCE,
];

/// The status-handler name of the Ethereum client.
pub const ETH_CLIENT_STATUS_HANDLER_NAME: &str = "eth-client";
/// The status-handler name of the MultiversX client.
pub const MVX_CLIENT_STATUS_HANDLER_NAME: &str = "mvx-client";
/// The status-handler name of the Ethereum -> MultiversX half bridge.
pub const ETH_TO_MVX_STATUS_HANDLER_NAME: &str = "eth-to-mvx";
/// The status-handler name of the MultiversX -> Ethereum half bridge.
pub const MVX_TO_ETH_STATUS_HANDLER_NAME: &str = "mvx-to-eth";

/// Durable storage for the persisted metric subset, keyed by handler name
/// and metric name.
pub trait MetricsStorer: Send + Sync {
    /// Persists an integer metric.
    fn store_int_metric(&self, handler: &str, metric: &str, value: i64)
        -> Result<()>;
    /// Persists a string metric.
    fn store_string_metric(
        &self,
        handler: &str,
        metric: &str,
        value: &str,
    ) -> Result<()>;
    /// Loads the persisted integer metrics of a handler.
    fn load_int_metrics(&self, handler: &str) -> Result<HashMap<String, i64>>;
    /// Loads the persisted string metrics of a handler.
    fn load_string_metrics(
        &self,
        handler: &str,
    ) -> Result<HashMap<String, String>>;
}

#[derive(Default)]
struct Metrics {
    ints: HashMap<String, i64>,
    strings: HashMap<String, String>,
}

/// A named holder of int and string metrics. Every component owns one;
/// the persisted metric keys are written through the attached storer.
pub struct StatusHandler {
    name: String,
    metrics: RwLock<Metrics>,
    storer: Option<Arc<dyn MetricsStorer>>,
}

impl StatusHandler {
    /// Creates a purely in-memory status handler.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metrics: RwLock::new(Metrics::default()),
            storer: None,
        }
    }

    /// Creates a status handler backed by persistent storage; previously
    /// persisted metrics are loaded back.
    pub fn new_with_storer(
        name: impl Into<String>,
        storer: Arc<dyn MetricsStorer>,
    ) -> Result<Self> {
        let name = name.into();
        let ints = storer.load_int_metrics(&name)?;
        let strings = storer.load_string_metrics(&name)?;
        Ok(Self {
            name,
            metrics: RwLock::new(Metrics { ints, strings }),
            storer: Some(storer),
        })
    }

    /// The handler's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets an integer metric.
    pub fn set_int_metric(&self, metric: &str, value: i64) {
        {
            let mut metrics = self.metrics.write().expect("metrics lock poisoned");
            metrics.ints.insert(metric.to_string(), value);
        }
        self.persist_int(metric, value);
    }

    /// Updates an integer metric by a delta.
    pub fn add_int_metric(&self, metric: &str, delta: i64) {
        let value = {
            let mut metrics = self.metrics.write().expect("metrics lock poisoned");
            let entry = metrics.ints.entry(metric.to_string()).or_insert(0);
            *entry += delta;
            *entry
        };
        self.persist_int(metric, value);
    }

    /// Sets a string metric.
    pub fn set_string_metric(&self, metric: &str, value: &str) {
        {
            let mut metrics = self.metrics.write().expect("metrics lock poisoned");
            metrics
                .strings
                .insert(metric.to_string(), value.to_string());
        }
        if let Some(storer) = &self.storer {
            if PERSISTED_METRICS.contains(&metric) {
                if let Err(error) =
                    storer.store_string_metric(&self.name, metric, value)
                {
                    tracing::warn!(%error, metric, "failed to persist metric");
                }
            }
        }
    }

    /// A snapshot of the integer metrics.
    pub fn int_metrics(&self) -> HashMap<String, i64> {
        self.metrics
            .read()
            .expect("metrics lock poisoned")
            .ints
            .clone()
    }

    /// A snapshot of the string metrics.
    pub fn string_metrics(&self) -> HashMap<String, String> {
        self.metrics
            .read()
            .expect("metrics lock poisoned")
            .strings
            .clone()
    }

    fn persist_int(&self, metric: &str, value: i64) {
        if let Some(storer) = &self.storer {
            if PERSISTED_METRICS.contains(&metric) {
                if let Err(error) =
                    storer.store_int_metric(&self.name, metric, value)
                {
                    tracing::warn!(%error, metric, "failed to persist metric");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStorer {
        ints: Mutex<HashMap<String, i64>>,
        strings: Mutex<HashMap<String, String>>,
    }

    impl MetricsStorer for RecordingStorer {
        fn store_int_metric(
            &self,
            handler: &str,
            metric: &str,
            value: i64,
        ) -> Result<()> {
            self.ints
                .lock()
                .unwrap()
                .insert(format!("{handler}/{metric}"), value);
            Ok(())
        }

        fn store_string_metric(
            &self,
            handler: &str,
            metric: &str,
            value: &str,
        ) -> Result<()> {
            self.strings
                .lock()
                .unwrap()
                .insert(format!("{handler}/{metric}"), value.to_string());
            Ok(())
        }

        fn load_int_metrics(&self, _: &str) -> Result<HashMap<String, i64>> {
            Ok(HashMap::new())
        }

        fn load_string_metrics(
            &self,
            _: &str,
        ) -> Result<HashMap<String, String>> {
            Ok(HashMap::new())
        }
    }

    #[test]
    fn add_int_metric_accumulates() {
        let handler = StatusHandler::new("test");
        handler.add_int_metric(METRIC_NUM_BATCHES, 2);
        handler.add_int_metric(METRIC_NUM_BATCHES, 3);
        assert_eq!(handler.int_metrics()[METRIC_NUM_BATCHES], 5);
    }

    #[test]
    fn only_the_persisted_subset_is_written_through() {
        let storer = Arc::new(RecordingStorer::default());
        let handler =
            StatusHandler::new_with_storer("eth-client", storer.clone())
                .unwrap();

        handler.set_int_metric(METRIC_NUM_BATCHES, 7);
        handler.set_string_metric(METRIC_CURRENT_STATE_MACHINE_STEP, "x");
        handler.set_string_metric(METRIC_ETH_CLIENT_STATUS, "available");

        let ints = storer.ints.lock().unwrap();
        let strings = storer.strings.lock().unwrap();
        assert_eq!(ints.get("eth-client/num batches"), Some(&7));
        assert!(strings
            .get("eth-client/current state machine step")
            .is_none());
        assert_eq!(
            strings.get("eth-client/ethereum client status"),
            Some(&"available".to_string())
        );
    }
}
