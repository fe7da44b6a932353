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

use std::fmt;
use std::path::Path;

use mvx_bridge_relayer_utils::{Error, Result};

/// A raw private key loaded from a key file. The debug representation is
/// redacted so keys never leak into logs.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey(Vec<u8>);

impl PrivateKey {
    /// Wraps raw key bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Loads a hex-encoded key from a file. Whitespace and an optional
    /// `0x` prefix are tolerated.
    pub fn from_hex_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_hex_str(&contents)
    }

    /// Parses a hex-encoded key string.
    pub fn from_hex_str(value: &str) -> Result<Self> {
        let trimmed = value.trim().trim_start_matches("0x");
        if trimmed.is_empty() {
            return Err(Error::MissingConfig("private key".to_string()));
        }
        let bytes = hex::decode(trimmed)?;
        Ok(Self(bytes))
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}
