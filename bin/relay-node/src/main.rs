mod cli;
mod keystore;
mod status;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use relay_chain::{ChainAdapter, EvmChainAdapter, LogWatcher};
use relay_gateway::{ChainHeartbeat, GatewayClient, TokenBalanceInfo};
use relay_ingest::EventIngestor;
use relay_reconcile::Reconciler;
use relay_store::{PgStore, TransferStore};
use relay_types::RelayConfig;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(&cli.log_filter)).init();

    if let Err(err) = run(cli).await {
        error!(%err, "fatal error during startup, exiting");
        std::process::exit(1);
    }
}

/// Startup and steady-state loop. Any `Err` that escapes this function is
/// unrecoverable (bad config, no DB, no chain RPC, gateway unreachable at
/// boot) — `main` logs it and exits non-zero rather than trying to limp on.
async fn run(cli: cli::Cli) -> eyre::Result<()> {
    let config = RelayConfig::from_file(&cli.config)?;
    let signer = keystore::load_signer(cli.keyfile.as_deref())?;

    info!(relay_node_name = %config.relay_node_name, chains = config.chains.len(), "starting relay node");

    let store: Arc<dyn TransferStore> = {
        let pg = PgStore::connect(&config.db).await?;
        pg.migrate().await?;
        Arc::new(pg)
    };

    let relay_address = alloy_signer::Signer::address(&signer);

    let mut adapters: HashMap<u64, Arc<dyn ChainAdapter>> = HashMap::new();
    let mut watchers = Vec::new();
    for chain in &config.chains {
        let endpoint: url::Url = chain.endpoint.parse()?;
        let contract_address: alloy_primitives::Address = chain.contract_address.parse()?;

        let adapter = Arc::new(EvmChainAdapter::new(chain.chain_id, endpoint.clone(), signer.clone(), contract_address, store.clone()));

        for token in &chain.token_config {
            let token_address: alloy_primitives::Address = token.token_address.parse()?;
            adapter.ensure_approved(token_address, relay_address).await?;
        }

        adapters.insert(chain.chain_id, adapter.clone() as Arc<dyn ChainAdapter>);

        watchers.push(LogWatcher::new(endpoint, contract_address, chain.watch_config.block_delay, chain.watch_config.max_block_delta));
    }

    let ingestor = Arc::new(EventIngestor::new(store.clone(), config.clone()));
    let mut monitor_handles = Vec::new();
    let mut watch_handles = Vec::new();
    for (chain, watcher) in config.chains.iter().zip(watchers.into_iter()) {
        let chain_id = chain.chain_id;
        let poll_interval = Duration::from_secs(chain.watch_config.polling_interval_secs);
        let store = store.clone();
        let ingestor = ingestor.clone();

        let (tx, mut rx) = tokio::sync::mpsc::channel(256);
        let cursor = store.get_monitor_block(chain_id, "bridge").await.unwrap_or(None).map(|(b, _)| b).unwrap_or(0);

        watch_handles.push(tokio::spawn(async move {
            if let Err(err) = watcher.run(cursor, poll_interval, tx).await {
                error!(chain_id, %err, "log watcher exited");
            }
        }));

        monitor_handles.push(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let (block_num, log_index) = event.cursor();
                let outcome = ingestor.handle(chain_id, &event).await;
                if !outcome.retry {
                    let _ = store.upsert_monitor_block(chain_id, "bridge", block_num, log_index).await;
                }
            }
        }));
    }

    let reconciler = Arc::new(Reconciler::new(store.clone(), adapters.clone()));
    let reconcile_handles = reconciler.spawn_all();

    let mut gateway = GatewayClient::connect(config.gateway.clone(), signer.clone(), config.relay_node_name.clone()).await?;
    let heartbeat_chains = config.chains.clone();
    let heartbeat_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            ticker.tick().await;

            let mut chains = Vec::with_capacity(heartbeat_chains.len());
            for chain in &heartbeat_chains {
                let Some(adapter) = adapters.get(&chain.chain_id) else { continue };
                let mut balances = Vec::with_capacity(chain.token_config.len());
                for token in &chain.token_config {
                    let Ok(token_address) = token.token_address.parse() else { continue };
                    match adapter.balance_of(token_address, relay_address).await {
                        Ok(balance) => balances.push(TokenBalanceInfo { token_name: token.token_name.clone(), token_address, balance }),
                        Err(err) => warn!(chain_id = chain.chain_id, token = %token.token_name, %err, "failed to read balance for heartbeat"),
                    }
                }
                chains.push(ChainHeartbeat { chain_id: chain.chain_id, fee_rate: chain.fee_rate, balances });
            }

            if let Err(err) = gateway.ping(&chains).await {
                warn!(%err, "gateway ping failed");
            }
        }
    });

    let status_state = status::StatusState { store: store.clone() };
    let status_addr: std::net::SocketAddr = config.status_addr.parse()?;
    let status_handle = tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(status_addr).await.expect("bind status http addr");
        info!(%status_addr, "status http surface listening");
        axum::serve(listener, status::router(status_state)).await.expect("status http server crashed");
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, draining in stages");

    // Stop the monitors first, then the watch service they read from — abort
    // both sets of handles together rather than relying on a monitor task's
    // own cleanup line to abort its watcher, which a direct `.abort()` on the
    // monitor task can pre-empt before that line ever runs.
    for h in &monitor_handles {
        h.abort();
    }
    for h in &watch_handles {
        h.abort();
    }
    tokio::time::sleep(Duration::from_secs(2)).await;

    for h in &reconcile_handles {
        h.abort();
    }
    heartbeat_handle.abort();
    status_handle.abort();

    info!("relay node shut down");
    Ok(())
}
