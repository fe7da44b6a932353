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

//! Role providers: periodic pollers that mirror the on-chain set of
//! authorised relayers into an in-memory whitelist. Updates replace the
//! whitelist atomically; a failed or invalid update leaves the previous
//! whitelist untouched.

use std::time::Duration;

use async_trait::async_trait;
use mvx_bridge_relayer_context::Shutdown;
use mvx_bridge_relayer_utils::Result;

/// The Ethereum role provider.
pub mod evm;
/// The MultiversX role provider.
pub mod mvx;

pub use evm::EthereumRoleProvider;
pub use mvx::MultiversXRoleProvider;

/// The lexicographically sorted relayer key set used for leader
/// election; all relayers with identical snapshots elect the same
/// leader.
pub trait SortedPublicKeysProvider: Send + Sync {
    /// The sorted public keys of the authorised relayers.
    fn sorted_public_keys(&self) -> Vec<Vec<u8>>;
}

/// A unit of work driven by [`run_polling_loop`].
#[async_trait]
pub trait PollingExecutor: Send + Sync {
    /// A name for the logs.
    fn name(&self) -> &str;
    /// One poll.
    async fn execute(&self) -> Result<()>;
}

/// Drives a [`PollingExecutor`] every `poll_interval` until shutdown;
/// a failed poll is logged and retried after `retry_interval`.
pub async fn run_polling_loop(
    executor: std::sync::Arc<dyn PollingExecutor>,
    poll_interval: Duration,
    retry_interval: Duration,
    mut shutdown: Shutdown,
) {
    loop {
        let delay = match executor.execute().await {
            Ok(()) => poll_interval,
            Err(error) => {
                tracing::warn!(
                    executor = executor.name(),
                    %error,
                    "polling executor failed, will retry"
                );
                retry_interval
            }
        };

        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!(
                    executor = executor.name(),
                    "polling loop is closing..."
                );
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
