//! Bridge warden daemon
//!
//! Wires two relay directions over one warden key: source-chain deposits
//! become destination-chain wraps, destination-chain unwraps become
//! source-chain withdrawals. The directions run concurrently and share
//! nothing except the relay store and each chain's nonce sequencer.

use std::sync::Arc;

use eyre::WrapErr;
use tracing::{error, info, warn};

use bridge_warden::client::LedgerClient;
use bridge_warden::config::{ChainConfig, Config};
use bridge_warden::evm::EvmLedger;
use bridge_warden::nonce::NonceSequencer;
use bridge_warden::orchestrator::RelayOrchestrator;
use bridge_warden::store::{MemoryStore, PgStore, RelayStore};
use bridge_warden::submitter::TransactionSubmitter;
use bridge_warden::types::EventKind;
use bridge_warden::watcher::ChainWatcher;
use bridge_warden::{api, metrics};

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    info!("Starting bridge warden");

    let config = Config::load()?;
    info!(
        source = %config.source.name,
        source_chain_id = config.source.chain_id,
        destination = %config.destination.name,
        destination_chain_id = config.destination.chain_id,
        "Configuration loaded"
    );

    // Durable state first: a failover instance must see the same records.
    let store: Arc<dyn RelayStore> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url).await?;
            store.migrate().await?;
            info!("Relay state database connected");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set; relay state will not survive restarts");
            Arc::new(MemoryStore::new())
        }
    };

    let source = build_ledger(&config.source, &config.warden_private_key)?;
    let destination = build_ledger(&config.destination, &config.warden_private_key)?;
    info!(warden = %source.signer_address(), "Running as warden");

    // Both chains must answer before the loops start: unreachable chains
    // are fatal here, never once running.
    let source_head = source
        .head_height()
        .await
        .wrap_err_with(|| format!("Cannot reach {} at startup", config.source.name))?;
    let destination_head = destination
        .head_height()
        .await
        .wrap_err_with(|| format!("Cannot reach {} at startup", config.destination.name))?;
    info!(source_head, destination_head, "Connected to both chains");

    // One sequencer per (chain, warden); recovery syncs each with the
    // chain-reported transaction count.
    let source_sequencer = NonceSequencer::new(0);
    let destination_sequencer = NonceSequencer::new(0);

    let retry = config.relay.retry_policy();

    let deposits = RelayOrchestrator::new(
        format!("{}->{}", config.source.name, config.destination.name),
        ChainWatcher::new(
            source.clone(),
            store.clone(),
            EventKind::Deposit,
            config.source.name.clone(),
            config.relay.reorg_margin,
            config.relay.max_blocks_per_query,
            retry.clone(),
        ),
        TransactionSubmitter::new(
            destination.clone(),
            config.destination.name.clone(),
            config.relay.default_gas_limit,
            config.relay.confirm_timeout(),
        ),
        destination_sequencer,
        store.clone(),
        retry.clone(),
        config.relay.poll_interval(),
    );

    let unwraps = RelayOrchestrator::new(
        format!("{}->{}", config.destination.name, config.source.name),
        ChainWatcher::new(
            destination.clone(),
            store.clone(),
            EventKind::Unwrap,
            config.destination.name.clone(),
            config.relay.reorg_margin,
            config.relay.max_blocks_per_query,
            retry.clone(),
        ),
        TransactionSubmitter::new(
            source.clone(),
            config.source.name.clone(),
            config.relay.default_gas_limit,
            config.relay.confirm_timeout(),
        ),
        source_sequencer,
        store.clone(),
        retry,
        config.relay.poll_interval(),
    );

    // Shutdown plumbing: one channel per direction, fed by the signal task.
    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    let (shutdown_tx2, shutdown_rx2) = tokio::sync::mpsc::channel::<()>(1);

    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
        let _ = shutdown_tx2.send(()).await;
    });

    let api_addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.relay.api_port));
    tokio::spawn(async move {
        if let Err(e) = api::start_api_server(api_addr).await {
            error!(error = %e, "API server error");
        }
    });

    let mut join_set = tokio::task::JoinSet::new();
    join_set.spawn(async move { deposits.run(shutdown_rx).await });
    join_set.spawn(async move { unwraps.run(shutdown_rx2).await });

    // Both directions drain on shutdown; an error in one direction stops
    // the process (per-event failures never surface here).
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(error = %e, "Relay direction stopped with error");
                join_set.abort_all();
                metrics::UP.set(0.0);
                return Err(eyre::eyre!("relay direction failed: {}", e));
            }
            Err(e) => {
                error!(error = %e, "Relay direction task panicked");
                join_set.abort_all();
                metrics::UP.set(0.0);
                return Err(eyre::eyre!("relay direction panicked: {}", e));
            }
        }
    }

    metrics::UP.set(0.0);
    info!("Bridge warden stopped");
    Ok(())
}

fn build_ledger(chain: &ChainConfig, warden_key: &str) -> eyre::Result<Arc<dyn LedgerClient>> {
    let ledger = EvmLedger::new(&chain.rpc_url, chain.chain_id, &chain.bridge_address, warden_key)
        .wrap_err_with(|| format!("Failed to build ledger client for {}", chain.name))?;
    Ok(Arc::new(ledger))
}

/// Initialize tracing/logging with structured output.
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bridge_warden=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

/// Wait for shutdown signals (SIGINT/SIGTERM).
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
