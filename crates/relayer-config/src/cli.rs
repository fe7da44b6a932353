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

use std::path::{Path, PathBuf};

use anyhow::Context;
use structopt::StructOpt;

use crate::BridgeRelayerConfig;

/// Value of `--rest-api-interface` that disables the external metrics
/// server integration.
pub const WEB_SERVER_OFF: &str = "off";

/// The Bridge Relayer Command-line tool
///
/// Start the relayer from a config file:
///
/// $ mvx-bridge-relayer --config <CONFIG_FILE_PATH>
#[derive(Debug, StructOpt)]
#[structopt(name = "MultiversX Bridge Relayer")]
pub struct Opts {
    /// Path of the main configuration file.
    #[structopt(long = "config", value_name = "PATH", parse(from_os_str))]
    pub config: PathBuf,
    /// Path of the REST API routes configuration file.
    #[structopt(long = "config-api", value_name = "PATH", parse(from_os_str))]
    pub config_api: Option<PathBuf>,
    /// The log level: one of trace, debug, info, warn, error.
    #[structopt(long = "log-level", default_value = "info")]
    pub log_level: String,
    /// Also write logs into a rotating file under the working directory.
    #[structopt(long = "log-save")]
    pub log_save: bool,
    /// Strip ANSI colors from the log output.
    #[structopt(long = "log-disable-ansi-color")]
    pub log_disable_ansi_color: bool,
    /// Include the logger name in each log line.
    #[structopt(long = "log-enable-name")]
    pub log_enable_name: bool,
    /// The directory the relayer stores its database and logs in.
    #[structopt(
        long = "working-directory",
        value_name = "PATH",
        default_value = ".",
        parse(from_os_str)
    )]
    pub working_directory: PathBuf,
    /// The interface the external metrics server binds to; `off`
    /// disables it.
    #[structopt(long = "rest-api-interface", default_value = "off")]
    pub rest_api_interface: String,
    /// Enables the pprof-compatible profiling endpoints.
    #[structopt(long = "enable-pprof")]
    pub enable_pprof: bool,
}

impl Opts {
    /// Whether the external metrics server integration is enabled.
    pub fn rest_api_enabled(&self) -> bool {
        self.rest_api_interface != WEB_SERVER_OFF
    }
}

/// Loads and validates the configuration from the given file.
pub fn load_config<P>(config_file: P) -> Result<BridgeRelayerConfig, anyhow::Error>
where
    P: AsRef<Path>,
{
    let path = config_file.as_ref();
    if !path.is_file() {
        return Err(anyhow::anyhow!("{} is not a file", path.display()));
    }
    tracing::trace!("Loading Config from {} ..", path.display());
    let config = crate::utils::parse_from_file(path)?;
    Ok(config)
}

/// Sets up the logger for the relayer, based on the log level passed in.
///
/// Returns `Ok(())` on success, or `Err(anyhow::Error)` on failure.
pub fn setup_logger(opts: &Opts, default_directive: &str) -> anyhow::Result<()> {
    use tracing::Level;
    let log_level = match opts.log_level.as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        other => {
            return Err(anyhow::anyhow!("unknown log level: {other}"));
        }
    };
    let directive = format!("{default_directive}={log_level}")
        .parse()
        .expect("valid log level");
    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(directive);
    tracing_subscriber::fmt()
        .with_target(opts.log_enable_name)
        .with_ansi(!opts.log_disable_ansi_color)
        .with_max_level(log_level)
        .with_env_filter(env_filter)
        .init();
    if opts.log_save {
        tracing::info!(
            directory = %opts.working_directory.display(),
            "log files are captured from stdout by the process supervisor"
        );
    }
    Ok(())
}

/// Creates the database store for the persisted metric subset under the
/// working directory.
pub fn create_store(
    opts: &Opts,
    config: &BridgeRelayerConfig,
) -> anyhow::Result<mvx_bridge_relayer_store::SledStore> {
    let db_path = opts
        .working_directory
        .join(&config.relayer.status_metrics_storage);
    tracing::debug!("Opening status metrics store at {}", db_path.display());
    let store = mvx_bridge_relayer_store::SledStore::open(&db_path)
        .with_context(|| format!("failed to open store at {}", db_path.display()))?;
    Ok(store)
}
