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
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An RPC endpoint url, validated at deserialization time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RpcUrl(url::Url);

impl RpcUrl {
    /// The wrapped url.
    pub fn as_url(&self) -> &url::Url {
        &self.0
    }

    /// The url as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl FromStr for RpcUrl {
    type Err = url::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(url::Url::parse(s)?))
    }
}

impl fmt::Display for RpcUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<url::Url> for RpcUrl {
    fn from(url: url::Url) -> Self {
        Self(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_http_and_ws_endpoints() {
        for endpoint in ["http://127.0.0.1:8545", "wss://gateway.example.com"] {
            let parsed: RpcUrl = endpoint.parse().unwrap();
            assert!(parsed.as_str().starts_with(&endpoint[..4]));
        }
    }

    #[test]
    fn deserializes_from_a_toml_string() {
        let parsed: RpcUrl =
            serde_json::from_str("\"https://rpc.example.com/\"").unwrap();
        assert_eq!(parsed.as_str(), "https://rpc.example.com/");
    }
}
