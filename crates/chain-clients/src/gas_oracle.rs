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

//! The Ethereum-side gas price oracle. A background loop polls an HTTP
//! gas station feed; readers get the last successfully fetched value,
//! scaled by the configured multiplier and capped by the configured
//! maximum.

use std::str::FromStr;
use std::sync::RwLock;
use std::time::Duration;

use ethers::types::U256;
use mvx_bridge_relayer_config::GasStationConfig;
use mvx_bridge_relayer_context::Shutdown;
use mvx_bridge_relayer_utils::{probe, Error, Result};
use serde::Deserialize;

use crate::GasHandler;

const MIN_POLLING_INTERVAL: Duration = Duration::from_secs(1);
const MIN_RETRY_DELAY: Duration = Duration::from_secs(1);
const MIN_REQUEST_TIME: Duration = Duration::from_millis(1);
const MIN_FETCH_RETRIES: u64 = 2;
const MIN_GAS_PRICE_MULTIPLIER: u64 = 1;

/// Which field of the gas station response feeds the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasPriceSelector {
    /// The fast tier.
    Fast,
    /// The proposed (standard) tier.
    Propose,
    /// The safe (slow) tier.
    Safe,
}

impl FromStr for GasPriceSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Fast" => Ok(Self::Fast),
            "Propose" => Ok(Self::Propose),
            "Safe" => Ok(Self::Safe),
            other => Err(Error::InvalidGasPriceSelector(other.to_string())),
        }
    }
}

impl std::fmt::Display for GasPriceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "Fast"),
            Self::Propose => write!(f, "Propose"),
            Self::Safe => write!(f, "Safe"),
        }
    }
}

/// One response of the gas station feed.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GasStationResponse {
    /// The fast-tier price.
    pub fast: u64,
    /// The propose-tier price.
    pub propose: u64,
    /// The safe-tier price.
    pub safe: u64,
}

/// The polling gas price oracle.
pub struct GasStation {
    request_url: String,
    request_time: Duration,
    polling_interval: Duration,
    retry_delay: Duration,
    maximum_fetch_retries: u64,
    maximum_gas_price: u64,
    selector: GasPriceSelector,
    multiplier: u64,
    http_client: reqwest::Client,
    latest_response: RwLock<Option<GasStationResponse>>,
}

impl GasStation {
    /// Creates a gas station from its config section, re-validating the
    /// bounds the loop relies on.
    pub fn new(config: &GasStationConfig) -> Result<Self> {
        let polling_interval =
            Duration::from_secs(config.request_polling_interval_in_seconds);
        let retry_delay =
            Duration::from_secs(config.request_retry_delay_in_seconds);
        let request_time = Duration::from_millis(config.request_time_in_millis);
        if polling_interval < MIN_POLLING_INTERVAL {
            return Err(Error::InvalidValue(
                "in GasStation::new for value RequestPollingInterval".to_string(),
            ));
        }
        if retry_delay < MIN_RETRY_DELAY {
            return Err(Error::InvalidValue(
                "in GasStation::new for value RequestRetryDelay".to_string(),
            ));
        }
        if request_time < MIN_REQUEST_TIME {
            return Err(Error::InvalidValue(
                "in GasStation::new for value RequestTime".to_string(),
            ));
        }
        if config.maximum_fetch_retries < MIN_FETCH_RETRIES {
            return Err(Error::InvalidValue(
                "in GasStation::new for value MaximumFetchRetries".to_string(),
            ));
        }
        if config.gas_price_multiplier < MIN_GAS_PRICE_MULTIPLIER {
            return Err(Error::InvalidValue(
                "in GasStation::new for value GasPriceMultiplier".to_string(),
            ));
        }
        let selector = config.gas_price_selector.parse()?;

        Ok(Self {
            request_url: config.request_url.clone(),
            request_time,
            polling_interval,
            retry_delay,
            maximum_fetch_retries: config.maximum_fetch_retries,
            maximum_gas_price: config.maximum_gas_price,
            selector,
            multiplier: config.gas_price_multiplier,
            http_client: reqwest::Client::new(),
            latest_response: RwLock::new(None),
        })
    }

    /// The polling loop. Runs until shutdown; failed fetches are retried
    /// after the retry delay up to the configured budget, then the
    /// failure is escalated and the loop falls back to the normal
    /// cadence.
    pub async fn run(&self, mut shutdown: Shutdown) {
        let mut fetch_retries: u64 = 0;
        loop {
            let delay = match self.fetch_once().await {
                Ok(response) => {
                    tracing::debug!(?response, "gas station: fetched new response");
                    tracing::event!(
                        target: probe::TARGET,
                        tracing::Level::TRACE,
                        kind = %probe::Kind::GasOracle,
                        fast = response.fast,
                        propose = response.propose,
                        safe = response.safe,
                    );
                    self.store_response(response);
                    fetch_retries = 0;
                    self.polling_interval
                }
                Err(error) => {
                    fetch_retries += 1;
                    if fetch_retries <= self.maximum_fetch_retries {
                        tracing::debug!(
                            %error,
                            fetch_retries,
                            "gas station fetch failed, retrying"
                        );
                        self.retry_delay
                    } else {
                        tracing::error!(
                            %error,
                            fetch_retries,
                            "gas station fetch retries exhausted"
                        );
                        fetch_retries = 0;
                        self.polling_interval
                    }
                }
            };

            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!("gas station fetcher main execute loop is closing...");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn fetch_once(&self) -> Result<GasStationResponse> {
        let request = self.http_client.get(&self.request_url).send();
        let response = tokio::time::timeout(self.request_time, request)
            .await
            .map_err(|_| Error::RequestTimeout)??;
        let parsed = tokio::time::timeout(
            self.request_time,
            response.json::<GasStationResponse>(),
        )
        .await
        .map_err(|_| Error::RequestTimeout)??;
        Ok(parsed)
    }

    fn store_response(&self, response: GasStationResponse) {
        *self
            .latest_response
            .write()
            .expect("latest response lock poisoned") = Some(response);
    }
}

impl GasHandler for GasStation {
    fn get_current_gas_price(&self) -> Result<U256> {
        let latest = self
            .latest_response
            .read()
            .expect("latest response lock poisoned");
        let response = match *latest {
            None => return Err(Error::LatestGasPricesWereNotFetched),
            Some(response) => response,
        };

        let gas_price = match self.selector {
            GasPriceSelector::Fast => response.fast,
            GasPriceSelector::Propose => response.propose,
            GasPriceSelector::Safe => response.safe,
        };

        if gas_price > self.maximum_gas_price {
            return Err(Error::GasPriceIsHigherThanTheMaximumSet {
                maximum: self.maximum_gas_price,
                fetched: gas_price,
                selector: self.selector.to_string(),
            });
        }

        Ok(U256::from(gas_price) * U256::from(self.multiplier))
    }
}

/// The disabled oracle variant: serves a fixed default price without
/// ever touching the network.
pub struct DisabledGasStation {
    default_gas_price: U256,
}

impl DisabledGasStation {
    /// Creates the disabled variant from the config section.
    pub fn new(config: &GasStationConfig) -> Self {
        Self {
            default_gas_price: U256::from(config.default_gas_price),
        }
    }
}

impl GasHandler for DisabledGasStation {
    fn get_current_gas_price(&self) -> Result<U256> {
        Ok(self.default_gas_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> GasStationConfig {
        GasStationConfig {
            enabled: true,
            request_url: "https://gasstation.example.com/api".to_string(),
            request_polling_interval_in_seconds: 60,
            request_retry_delay_in_seconds: 30,
            maximum_fetch_retries: 3,
            request_time_in_millis: 2000,
            maximum_gas_price: 1000,
            gas_price_selector: "Fast".to_string(),
            gas_price_multiplier: 1,
            default_gas_price: 20_000_000_000,
        }
    }

    #[test]
    fn price_is_unavailable_before_the_first_fetch() {
        let station = GasStation::new(&sample_config()).unwrap();
        assert!(matches!(
            station.get_current_gas_price(),
            Err(Error::LatestGasPricesWereNotFetched)
        ));
    }

    #[test]
    fn selector_picks_the_configured_field_and_applies_the_multiplier() {
        let mut config = sample_config();
        config.gas_price_selector = "Propose".to_string();
        config.gas_price_multiplier = 3;
        let station = GasStation::new(&config).unwrap();
        station.store_response(GasStationResponse {
            fast: 100,
            propose: 80,
            safe: 60,
        });

        assert_eq!(
            station.get_current_gas_price().unwrap(),
            U256::from(240u64)
        );
    }

    #[test]
    fn a_fetched_value_above_the_maximum_is_rejected() {
        let station = GasStation::new(&sample_config()).unwrap();
        station.store_response(GasStationResponse {
            fast: 1001,
            propose: 900,
            safe: 800,
        });

        assert!(matches!(
            station.get_current_gas_price(),
            Err(Error::GasPriceIsHigherThanTheMaximumSet {
                maximum: 1000,
                fetched: 1001,
                ..
            })
        ));

        // the boundary itself is accepted
        station.store_response(GasStationResponse {
            fast: 1000,
            propose: 900,
            safe: 800,
        });
        assert_eq!(
            station.get_current_gas_price().unwrap(),
            U256::from(1000u64)
        );
    }

    #[test]
    fn invalid_selectors_are_rejected_at_construction() {
        let mut config = sample_config();
        config.gas_price_selector = "fastest".to_string();
        assert!(matches!(
            GasStation::new(&config),
            Err(Error::InvalidGasPriceSelector(_))
        ));
    }

    #[test]
    fn too_small_bounds_are_rejected_at_construction() {
        let mut config = sample_config();
        config.maximum_fetch_retries = 1;
        assert!(GasStation::new(&config).is_err());

        let mut config = sample_config();
        config.request_polling_interval_in_seconds = 0;
        assert!(GasStation::new(&config).is_err());
    }

    #[test]
    fn the_disabled_variant_serves_the_fixed_default() {
        let station = DisabledGasStation::new(&sample_config());
        assert_eq!(
            station.get_current_gas_price().unwrap(),
            U256::from(20_000_000_000u64)
        );
    }
}
