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

//! Wires the relayer together and fires every background task. The
//! construction order matters: collaborators first, the broadcaster's
//! reverse edges after, the state machines last. Shutdown travels the
//! other way through the context's broadcast channel.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;

use mvx_bridge_chain_clients::evm::contracts::{
    Erc20Contracts, EthereumContractsWrapper,
};
use mvx_bridge_chain_clients::evm::{ArgsEthereumClient, EthereumClient};
use mvx_bridge_chain_clients::gas_oracle::{DisabledGasStation, GasStation};
use mvx_bridge_chain_clients::mvx::gateway::{
    ArgsGatewayMvxProxy, GatewayMvxProxy,
};
use mvx_bridge_chain_clients::mvx::mappers::{
    Erc20ToMvxTokenMapper, MvxToErc20TokenMapper,
};
use mvx_bridge_chain_clients::mvx::{ArgsMultiversXClient, MultiversXClient};
use mvx_bridge_chain_clients::roles::{
    run_polling_loop, EthereumRoleProvider, MultiversXRoleProvider,
};
use mvx_bridge_chain_clients::{BridgeChain, GasHandler};
use mvx_bridge_core::status::{
    StatusHandler, ETH_CLIENT_STATUS_HANDLER_NAME,
    ETH_TO_MVX_STATUS_HANDLER_NAME, MVX_CLIENT_STATUS_HANDLER_NAME,
    MVX_TO_ETH_STATUS_HANDLER_NAME,
};
use mvx_bridge_core::timer::NtpTimer;
use mvx_bridge_core::Timer;
use mvx_bridge_logic::state_machine::ArgsStateMachine;
use mvx_bridge_logic::steps::create_steps;
use mvx_bridge_logic::{
    ArgsBridgeExecutor, ArgsTopologyHandler, BridgeExecutor, SignaturesHolder,
    StateMachine, StepIdentifier, TopologyHandler,
};
use mvx_bridge_relayer_config::HalfBridgeConfig;
use mvx_bridge_relayer_context::RelayerContext;
use mvx_bridge_relayer_p2p::antiflood::AntifloodHandler;
use mvx_bridge_relayer_p2p::crypto::Ed25519Signer;
use mvx_bridge_relayer_p2p::messenger::InProcessNetwork;
use mvx_bridge_relayer_p2p::{ArgsBroadcaster, Broadcaster, SingleSigner};
use mvx_bridge_relayer_types::PrivateKey;

const AVAILABILITY_CHECK_INTERVAL: Duration = Duration::from_secs(6);
// the per-step wait towards Ethereum splits the configured
// confirmation interval so the machine re-checks several times before
// the interval elapses
const WAIT_SPLITS: u64 = 10;

/// Handles kept alive for the ordered close at process exit.
pub struct IgnitedServices {
    /// The NTP-disciplined timer; closed last.
    pub timer: Arc<dyn Timer>,
    /// The broadcaster; closed before the timer.
    pub broadcaster: Arc<Broadcaster>,
    /// The in-process mesh the messenger is joined to; nodes hold it
    /// weakly, so the owner keeps it alive.
    pub network: Arc<InProcessNetwork>,
}

fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

/// Builds every component from the context's configuration and spawns
/// the background tasks: two half bridges, the gas oracle loop, two
/// role pollers, two availability tickers, the antiflood reset loop and
/// the join-topic rebroadcast.
pub async fn ignite(ctx: &RelayerContext) -> anyhow::Result<IgnitedServices> {
    let config = ctx.config.clone();
    let store = Arc::new(ctx.store().clone());

    // the timer every leader-election decision reads from
    let timer: Arc<dyn Timer> = Arc::new(NtpTimer::new());
    timer.start();

    // status handlers, rehydrated from the persisted metric subset
    let eth_status = Arc::new(StatusHandler::new_with_storer(
        ETH_CLIENT_STATUS_HANDLER_NAME,
        store.clone(),
    )?);
    let mvx_status = Arc::new(StatusHandler::new_with_storer(
        MVX_CLIENT_STATUS_HANDLER_NAME,
        store.clone(),
    )?);
    let eth_to_mvx_status = Arc::new(StatusHandler::new_with_storer(
        ETH_TO_MVX_STATUS_HANDLER_NAME,
        store.clone(),
    )?);
    let mvx_to_eth_status = Arc::new(StatusHandler::new_with_storer(
        MVX_TO_ETH_STATUS_HANDLER_NAME,
        store.clone(),
    )?);
    for handler in [
        &eth_status,
        &mvx_status,
        &eth_to_mvx_status,
        &mvx_to_eth_status,
    ] {
        ctx.register_status_handler(handler.clone());
    }

    // Ethereum chain access
    let eth_key = PrivateKey::from_hex_file(&config.eth.private_key_file)?;
    let provider = Provider::<Http>::try_from(config.eth.network_address.as_str())?
        .interval(Duration::from_millis(500));
    let chain_id = provider.get_chainid().await?;
    let wallet = LocalWallet::from_bytes(eth_key.as_bytes())?
        .with_chain_id(chain_id.as_u64());
    let eth_rpc_client =
        Arc::new(SignerMiddleware::new(provider, wallet.clone()));
    let multisig_address: Address =
        config.eth.multisig_contract_address.parse()?;
    let safe_address: Address = config.eth.safe_contract_address.parse()?;
    let eth_wrapper = Arc::new(EthereumContractsWrapper::new(
        eth_rpc_client.clone(),
        multisig_address,
        safe_address,
    )?);
    let erc20_contracts_holder =
        Arc::new(Erc20Contracts::new(eth_rpc_client)?);

    // gas price oracle
    let gas_handler: Arc<dyn GasHandler> = if config.eth.gas_station.enabled {
        let gas_station = Arc::new(GasStation::new(&config.eth.gas_station)?);
        let loop_station = gas_station.clone();
        let shutdown = ctx.shutdown_signal();
        tokio::spawn(async move { loop_station.run(shutdown).await });
        gas_station
    } else {
        Arc::new(DisabledGasStation::new(&config.eth.gas_station))
    };

    // MultiversX chain access
    let mvx_key = PrivateKey::from_hex_file(&config.multiversx.private_key_file)?;
    let mvx_proxy = Arc::new(GatewayMvxProxy::new(ArgsGatewayMvxProxy {
        base_url: config.multiversx.network_address.as_str().to_string(),
        multisig_address: config.multiversx.multisig_contract_address.clone(),
        safe_address: config.multiversx.safe_contract_address.clone(),
        secret_key: mvx_key.as_bytes().to_vec(),
        request_time: Duration::from_secs(
            config.multiversx.proxy.request_time_in_seconds,
        ),
        finality_check: config.multiversx.proxy.finality_check,
    })?);

    // role providers and their pollers
    let eth_role_provider =
        Arc::new(EthereumRoleProvider::new(eth_wrapper.clone()));
    let mvx_role_provider =
        Arc::new(MultiversXRoleProvider::new(mvx_proxy.clone()));
    let role_poll_interval = Duration::from_millis(
        config.relayer.role_provider.polling_interval_in_millis,
    );
    let pollers: [Arc<dyn mvx_bridge_chain_clients::roles::PollingExecutor>; 2] = [
        eth_role_provider.clone(),
        mvx_role_provider.clone(),
    ];
    for poller in pollers {
        let shutdown = ctx.shutdown_signal();
        tokio::spawn(async move {
            run_polling_loop(poller, role_poll_interval, role_poll_interval, shutdown)
                .await
        });
    }

    // p2p layer
    let signer = Arc::new(Ed25519Signer::from_secret_key(mvx_key.as_bytes())?);
    let own_public_key = signer.public_key();
    let antiflood =
        Arc::new(AntifloodHandler::new(&config.p2p.antiflood_config)?);
    let antiflood_loop = antiflood.clone();
    let shutdown = ctx.shutdown_signal();
    tokio::spawn(async move { antiflood_loop.run(shutdown).await });

    let network = InProcessNetwork::new();
    let messenger = network.join(hex::encode(&own_public_key));
    let broadcaster = Arc::new(Broadcaster::new(ArgsBroadcaster {
        name: config.bridge_topic_name(),
        messenger,
        whitelist: mvx_role_provider.clone(),
        signature_verifier: eth_role_provider.clone(),
        signer,
        antiflood: antiflood.clone(),
        counter_seed: unix_nanos(),
    })?);
    broadcaster.register_on_topics().await?;

    let signatures_holder = Arc::new(SignaturesHolder::new());
    broadcaster.add_broadcast_client(signatures_holder.clone());

    let join_broadcaster = broadcaster.clone();
    let join_interval =
        Duration::from_secs(config.p2p.time_before_repeat_join_in_seconds);
    let shutdown = ctx.shutdown_signal();
    tokio::spawn(async move {
        join_broadcaster.join_loop(join_interval, shutdown).await
    });

    // chain clients
    let eth_client: Arc<dyn BridgeChain> =
        Arc::new(EthereumClient::new(ArgsEthereumClient {
            wrapper: eth_wrapper,
            erc20_contracts_holder,
            tokens_mapper: Arc::new(Erc20ToMvxTokenMapper::new(
                mvx_proxy.clone(),
            )),
            signature_holder: signatures_holder.clone(),
            broadcaster: broadcaster.clone(),
            wallet,
            safe_contract_address: safe_address,
            gas_handler,
            transfer_gas_limit_base: config.eth.gas_limit_base,
            transfer_gas_limit_for_each: config.eth.gas_limit_for_each,
            allow_delta: config.eth.client_availability_allow_delta,
            status_handler: eth_status,
        })?);
    let mvx_client: Arc<dyn BridgeChain> =
        Arc::new(MultiversXClient::new(ArgsMultiversXClient {
            proxy: mvx_proxy.clone(),
            tokens_mapper: Arc::new(MvxToErc20TokenMapper::new(mvx_proxy)),
            gas_map: config.multiversx.gas_map.clone(),
            allow_delta: config.multiversx.client_availability_allow_delta,
            status_handler: mvx_status,
        })?);

    // availability tickers
    for client in [eth_client.clone(), mvx_client.clone()] {
        let mut shutdown = ctx.shutdown_signal();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.recv() => return,
                    _ = tokio::time::sleep(AVAILABILITY_CHECK_INTERVAL) => {
                        let _ = client.check_client_availability().await;
                    }
                }
            }
        });
    }

    // the two half bridges
    let eth_to_mvx_wait = Duration::from_millis(
        config.state_machine.eth_to_mvx.step_duration_in_millis,
    );
    // executions towards Ethereum confirm slowly; the wait splits the
    // configured confirmation interval
    let mvx_to_eth_wait = Duration::from_secs(
        (config.eth.interval_to_wait_for_transfer_in_seconds / WAIT_SPLITS).max(1),
    );
    spawn_half_bridge(
        ctx,
        "EthereumToMultiversX",
        &config.state_machine.eth_to_mvx,
        eth_client.clone(),
        mvx_client.clone(),
        eth_to_mvx_wait,
        timer.clone(),
        mvx_role_provider.clone(),
        own_public_key.clone(),
        signatures_holder.clone(),
        eth_to_mvx_status,
        config.multiversx.max_retries_on_quorum_reached,
        config.eth.max_retries_on_quorum_reached,
        config.multiversx.max_retries_on_was_transfer_proposed,
    )?;
    spawn_half_bridge(
        ctx,
        "MultiversXToEthereum",
        &config.state_machine.mvx_to_eth,
        mvx_client,
        eth_client,
        mvx_to_eth_wait,
        timer.clone(),
        mvx_role_provider,
        own_public_key,
        signatures_holder,
        mvx_to_eth_status,
        config.eth.max_retries_on_quorum_reached,
        config.multiversx.max_retries_on_quorum_reached,
        config.multiversx.max_retries_on_was_transfer_proposed,
    )?;

    Ok(IgnitedServices {
        timer,
        broadcaster,
        network,
    })
}

#[allow(clippy::too_many_arguments)]
fn spawn_half_bridge(
    ctx: &RelayerContext,
    name: &str,
    half_config: &HalfBridgeConfig,
    source: Arc<dyn BridgeChain>,
    destination: Arc<dyn BridgeChain>,
    time_to_wait_per_step: Duration,
    timer: Arc<dyn Timer>,
    sorted_keys: Arc<MultiversXRoleProvider>,
    own_public_key: Vec<u8>,
    signatures_holder: Arc<SignaturesHolder>,
    status_handler: Arc<StatusHandler>,
    max_quorum_retries_on_destination: u64,
    max_quorum_retries_on_source: u64,
    max_retries_on_was_proposed: u64,
) -> anyhow::Result<()> {
    let topology = Arc::new(TopologyHandler::new(ArgsTopologyHandler {
        sorted_public_keys_provider: sorted_keys,
        timer,
        interval_for_leader: Duration::from_secs(
            half_config.interval_for_leader_in_seconds,
        ),
        address_bytes: own_public_key,
    })?);

    let step_duration =
        Duration::from_millis(half_config.step_duration_in_millis);
    let executor = Arc::new(BridgeExecutor::new(ArgsBridgeExecutor {
        name: name.to_string(),
        source,
        destination,
        topology_provider: topology,
        signatures_holder,
        status_handler: status_handler.clone(),
        time_to_wait_per_step,
        shutdown: ctx.shutdown_signal(),
        max_quorum_retries_on_destination,
        max_quorum_retries_on_source,
        max_retries_on_was_proposed,
    })?);

    let machine = StateMachine::new(ArgsStateMachine {
        name: name.to_string(),
        steps: create_steps(executor),
        start_identifier: StepIdentifier::GettingPendingBatchFromSource,
        duration_between_steps: step_duration,
        status_handler,
    })?;

    let shutdown = ctx.shutdown_signal();
    tokio::spawn(async move { machine.run(shutdown).await });
    tracing::info!(bridge = name, "half bridge ignited");
    Ok(())
}
