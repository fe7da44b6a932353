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

//! Default values for optional config keys, referenced from the serde
//! attributes.

pub(crate) fn enabled() -> bool {
    true
}

pub(crate) fn default_gas_price() -> u64 {
    // 20 gwei, only served by the disabled gas station variant
    20_000_000_000
}

pub(crate) fn events_block_range_to() -> u64 {
    u64::MAX
}

pub(crate) fn time_before_repeat_join() -> u64 {
    5 * 60
}

pub(crate) fn marshalizer() -> String {
    "json".to_string()
}

pub(crate) fn status_metrics_storage() -> String {
    "statusMetricsStorage".to_string()
}
