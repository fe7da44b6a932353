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

use std::path::Path;

use crate::BridgeRelayerConfig;

/// Try to parse the [`BridgeRelayerConfig`] from the given TOML config
/// file. The historical key set is PascalCase, so the file feeds the
/// deserializer directly (generic layered-config loaders fold key case
/// and would mangle it).
pub fn parse_from_file<P: AsRef<Path>>(
    path: P,
) -> mvx_bridge_relayer_utils::Result<BridgeRelayerConfig> {
    tracing::trace!("Loading config file: {}", path.as_ref().display());
    let contents = std::fs::read_to_string(path)?;

    let deserializer = toml::Deserializer::new(&contents);
    let config: Result<
        BridgeRelayerConfig,
        serde_path_to_error::Error<toml::de::Error>,
    > = serde_path_to_error::deserialize(deserializer);
    match config {
        Ok(c) => {
            c.validate()?;
            tracing::trace!("Config loaded..");
            Ok(c)
        }
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}
