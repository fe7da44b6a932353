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

use std::collections::HashMap;
use std::path::Path;

use mvx_bridge_core::status::MetricsStorer;
use mvx_bridge_relayer_utils::Result;

/// A store that persists the relayer metrics in a
/// [Sled](https://sled.rs)-based database under the working directory.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore").finish()
    }
}

impl SledStore {
    /// Create a new SledStore.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::Config::new()
            .path(path)
            .temporary(cfg!(test))
            .mode(sled::Mode::HighThroughput)
            .open()?;
        Ok(Self { db })
    }

    /// Creates a temporary SledStore.
    pub fn temporary() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        Self::open(dir.path())
    }

    /// Gets the total amount of data stored on disk
    pub fn get_data_stored_size(&self) -> u64 {
        self.db.size_on_disk().unwrap_or_default()
    }

    fn metrics_tree(&self, handler: &str, kind: &str) -> Result<sled::Tree> {
        Ok(self.db.open_tree(format!("status_metrics/{kind}/{handler}"))?)
    }
}

impl MetricsStorer for SledStore {
    fn store_int_metric(
        &self,
        handler: &str,
        metric: &str,
        value: i64,
    ) -> Result<()> {
        let tree = self.metrics_tree(handler, "int")?;
        tree.insert(metric.as_bytes(), &value.to_be_bytes())?;
        Ok(())
    }

    fn store_string_metric(
        &self,
        handler: &str,
        metric: &str,
        value: &str,
    ) -> Result<()> {
        let tree = self.metrics_tree(handler, "string")?;
        tree.insert(metric.as_bytes(), value.as_bytes())?;
        Ok(())
    }

    fn load_int_metrics(&self, handler: &str) -> Result<HashMap<String, i64>> {
        let tree = self.metrics_tree(handler, "int")?;
        let mut metrics = HashMap::new();
        for entry in tree.iter() {
            let (key, value) = entry?;
            let mut bytes = [0u8; 8];
            if value.len() != 8 {
                tracing::warn!(
                    handler,
                    "skipping malformed persisted int metric"
                );
                continue;
            }
            bytes.copy_from_slice(&value);
            metrics.insert(
                String::from_utf8_lossy(&key).into_owned(),
                i64::from_be_bytes(bytes),
            );
        }
        Ok(metrics)
    }

    fn load_string_metrics(
        &self,
        handler: &str,
    ) -> Result<HashMap<String, String>> {
        let tree = self.metrics_tree(handler, "string")?;
        let mut metrics = HashMap::new();
        for entry in tree.iter() {
            let (key, value) = entry?;
            metrics.insert(
                String::from_utf8_lossy(&key).into_owned(),
                String::from_utf8_lossy(&value).into_owned(),
            );
        }
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mvx_bridge_core::status::{
        StatusHandler, METRIC_NUM_BATCHES, METRIC_NUM_ETH_CLIENT_REQUESTS,
    };
    use std::sync::Arc;

    #[test]
    fn metrics_survive_a_reload() {
        let store = Arc::new(SledStore::temporary().unwrap());

        store
            .store_int_metric("eth-client", METRIC_NUM_BATCHES, 41)
            .unwrap();
        store
            .store_string_metric("eth-client", "ethereum client status", "available")
            .unwrap();

        let ints = store.load_int_metrics("eth-client").unwrap();
        let strings = store.load_string_metrics("eth-client").unwrap();
        assert_eq!(ints[METRIC_NUM_BATCHES], 41);
        assert_eq!(strings["ethereum client status"], "available");

        // a status handler reattached to the same store sees the values
        let handler =
            StatusHandler::new_with_storer("eth-client", store.clone()).unwrap();
        assert_eq!(handler.int_metrics()[METRIC_NUM_BATCHES], 41);
    }

    #[test]
    fn handlers_do_not_share_metric_namespaces() {
        let store = Arc::new(SledStore::temporary().unwrap());
        store
            .store_int_metric("eth-client", METRIC_NUM_ETH_CLIENT_REQUESTS, 9)
            .unwrap();

        let other = store.load_int_metrics("mvx-client").unwrap();
        assert!(other.is_empty());
    }
}
