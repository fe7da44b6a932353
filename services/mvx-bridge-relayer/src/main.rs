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

//! Bridge Relayer Binary.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use mvx_bridge_relayer::service;
use mvx_bridge_relayer_config::cli::{
    create_store, load_config, setup_logger, Opts,
};
use mvx_bridge_relayer_context::RelayerContext;
use mvx_bridge_relayer_utils::probe;
use tokio::signal::unix;

/// The main entry point for the relayer.
///
/// # Arguments
///
/// * `args` - The command line arguments.
#[paw::main]
#[tokio::main]
async fn main(args: Opts) -> anyhow::Result<()> {
    setup_logger(&args, "mvx_bridge_relayer")?;
    match dotenv::dotenv() {
        Ok(_) => {
            tracing::trace!("Loaded .env file");
        }
        Err(e) => {
            tracing::warn!("Failed to load .env file: {}", e);
        }
    }

    // the configuration is validated and loaded from the given file
    let config = load_config(&args.config)?;
    if args.rest_api_enabled() {
        tracing::info!(
            interface = args.rest_api_interface,
            "external metrics server integration requested"
        );
    }

    // persistent storage for the metric subset
    let store = create_store(&args, &config)?;

    // The RelayerContext takes a configuration, and populates objects
    // that are needed throughout the lifetime of the relayer.
    let ctx = RelayerContext::new(config, store);

    // start all background services. this does not block, will fire
    // the services on background tasks.
    let services = service::ignite(&ctx).await?;
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        started = true
    );

    // watch for signals
    let mut ctrlc_signal = unix::signal(unix::SignalKind::interrupt())?;
    let mut termination_signal = unix::signal(unix::SignalKind::terminate())?;
    tokio::select! {
        _ = ctrlc_signal.recv() => {
            tracing::warn!("Interrupted (Ctrl+C) ...");
        },
        _ = termination_signal.recv() => {
            tracing::warn!("Got Terminate signal ...");
        },
    }

    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        shutdown = true
    );
    tracing::warn!("Shutting down...");
    // cancel every task, then close the long-lived components in
    // reverse order of construction; the last close error is the one
    // reported
    ctx.shutdown();
    let mut close_error: Option<anyhow::Error> = None;
    if let Err(error) = services.broadcaster.close().await {
        close_error = Some(error.into());
    }
    services.timer.close();
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    match close_error {
        Some(error) => Err(error),
        None => {
            tracing::info!("Clean Exit ..");
            Ok(())
        }
    }
}
