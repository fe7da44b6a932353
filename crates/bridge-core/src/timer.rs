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

//! The wall-clock abstraction all leader-rotation decisions read from.
//! Relayers must agree on the current second within one leader interval,
//! so the production implementation keeps its offset disciplined against
//! a small rotating pool of NTP hosts.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of unix wall time. Injected everywhere a clock is needed so
/// tests can drive logical time.
pub trait Timer: Send + Sync {
    /// The current unix timestamp, in seconds, corrected by the latest
    /// synchronisation offset.
    fn now_unix(&self) -> i64;
    /// Starts any background synchronisation the implementation needs.
    fn start(&self);
    /// Stops the background synchronisation.
    fn close(&self);
}

/// Default NTP hosts polled by [`NtpTimer`].
pub const DEFAULT_NTP_HOSTS: [&str; 4] = [
    "time.google.com",
    "time.cloudflare.com",
    "time.apple.com",
    "pool.ntp.org",
];

/// How often the offset is refreshed when no cadence is configured.
pub const DEFAULT_SYNC_CADENCE: Duration = Duration::from_secs(3600);

/// An NTP-disciplined timer. The clock offset is refreshed from a
/// rotating pool of hosts on a background task; readers only ever see the
/// corrected value through one atomic load.
pub struct NtpTimer {
    hosts: Vec<String>,
    cadence: Duration,
    offset_millis: Arc<AtomicI64>,
    running: Arc<AtomicBool>,
}

impl NtpTimer {
    /// Creates a timer syncing against the default host pool.
    pub fn new() -> Self {
        Self::with_hosts(
            DEFAULT_NTP_HOSTS.iter().map(|h| h.to_string()).collect(),
            DEFAULT_SYNC_CADENCE,
        )
    }

    /// Creates a timer syncing against the provided hosts at the provided
    /// cadence.
    pub fn with_hosts(hosts: Vec<String>, cadence: Duration) -> Self {
        Self {
            hosts,
            cadence,
            offset_millis: Arc::new(AtomicI64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    fn system_now_millis() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default()
    }

    fn query_offset_millis(host: &str) -> Option<i64> {
        let client = rsntp::SntpClient::new();
        let result = client.synchronize(host).ok()?;
        let offset_secs = result.clock_offset().as_secs_f64();
        Some((offset_secs * 1000.0) as i64)
    }
}

impl Default for NtpTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer for NtpTimer {
    fn now_unix(&self) -> i64 {
        let corrected =
            Self::system_now_millis() + self.offset_millis.load(Ordering::Relaxed);
        corrected / 1000
    }

    fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let hosts = self.hosts.clone();
        let cadence = self.cadence;
        let offset = Arc::clone(&self.offset_millis);
        let running = Arc::clone(&self.running);
        tokio::spawn(async move {
            let mut host_index = 0usize;
            loop {
                if !running.load(Ordering::SeqCst) {
                    return;
                }
                if !hosts.is_empty() {
                    let host = hosts[host_index % hosts.len()].clone();
                    host_index = host_index.wrapping_add(1);
                    let result = tokio::task::spawn_blocking(move || {
                        NtpTimer::query_offset_millis(&host)
                    })
                    .await;
                    match result {
                        Ok(Some(new_offset)) => {
                            offset.store(new_offset, Ordering::Relaxed);
                            tracing::debug!(offset_millis = new_offset, "ntp offset updated");
                        }
                        _ => {
                            tracing::debug!("ntp synchronisation failed, will rotate host");
                        }
                    }
                }
                tokio::time::sleep(cadence).await;
            }
        });
    }

    fn close(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// A hand-driven timer for tests: `now_unix` returns whatever was last
/// set.
#[derive(Default)]
pub struct ManualTimer {
    now: AtomicI64,
}

impl ManualTimer {
    /// Creates a manual timer starting at the provided unix second.
    pub fn new(now_unix: i64) -> Self {
        Self {
            now: AtomicI64::new(now_unix),
        }
    }

    /// Moves the logical clock to the provided unix second.
    pub fn set_now(&self, now_unix: i64) {
        self.now.store(now_unix, Ordering::SeqCst);
    }

    /// Advances the logical clock by the provided number of seconds.
    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Timer for ManualTimer {
    fn now_unix(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    fn start(&self) {}

    fn close(&self) {}
}
