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
use std::sync::{Arc, RwLock};

use mvx_bridge_core::status::MetricsStorer;
use mvx_bridge_relayer_utils::Result;

type Metrics<V> = HashMap<String, HashMap<String, V>>;

/// An in-memory metric store, mostly useful for testing.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    ints: Arc<RwLock<Metrics<i64>>>,
    strings: Arc<RwLock<Metrics<String>>>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish()
    }
}

impl MetricsStorer for InMemoryStore {
    fn store_int_metric(
        &self,
        handler: &str,
        metric: &str,
        value: i64,
    ) -> Result<()> {
        self.ints
            .write()
            .expect("ints lock poisoned")
            .entry(handler.to_string())
            .or_default()
            .insert(metric.to_string(), value);
        Ok(())
    }

    fn store_string_metric(
        &self,
        handler: &str,
        metric: &str,
        value: &str,
    ) -> Result<()> {
        self.strings
            .write()
            .expect("strings lock poisoned")
            .entry(handler.to_string())
            .or_default()
            .insert(metric.to_string(), value.to_string());
        Ok(())
    }

    fn load_int_metrics(&self, handler: &str) -> Result<HashMap<String, i64>> {
        Ok(self
            .ints
            .read()
            .expect("ints lock poisoned")
            .get(handler)
            .cloned()
            .unwrap_or_default())
    }

    fn load_string_metrics(
        &self,
        handler: &str,
    ) -> Result<HashMap<String, String>> {
        Ok(self
            .strings
            .read()
            .expect("strings lock poisoned")
            .get(handler)
            .cloned()
            .unwrap_or_default())
    }
}
