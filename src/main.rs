//! Federator - cross-chain transfer relay agent
//!
//! Watches a mainchain bridge for finalized `Cross` events and votes each
//! transfer onto the sidechain bridge through a multisig shared with the
//! other federators. Progress is checkpointed so restarts neither skip nor
//! double-submit transfers.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

mod api;
mod chain;
mod checkpoint;
mod config;
mod error;
mod events;
mod metrics;
mod relay;
#[cfg(test)]
mod test_utils;
mod tx;

use chain::{ChainProvider, DestinationChain, EthDestinationChain, EthSourceChain, SourceChain};
use config::Settings;
use metrics::MetricsServer;
use relay::{EventScanner, Federator, IdempotencyGuard, MultisigReconciler, TransferVoter};
use tx::{EthTransactionSender, SendConfig, TransactionSender};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Federator v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Relaying {} -> {} with {} confirmations",
        settings.mainchain.name, settings.sidechain.name, settings.federator.confirmations
    );

    // Chain connections
    let main_provider = Arc::new(ChainProvider::new(settings.mainchain.clone())?);
    let side_provider = Arc::new(ChainProvider::new(settings.sidechain.clone())?);
    for provider in [&main_provider, &side_provider] {
        if !provider.health_check().await {
            warn!("{} is not reachable at startup", provider.name());
        }
    }

    let source: Arc<dyn SourceChain> = Arc::new(EthSourceChain::new(
        main_provider.clone(),
        settings.mainchain.bridge_address()?,
    ));
    let destination: Arc<dyn DestinationChain> = Arc::new(EthDestinationChain::new(
        side_provider.clone(),
        settings.sidechain.bridge_address()?,
        settings.sidechain.multisig_address()?,
    ));

    // Signing identity
    let sender: Arc<dyn TransactionSender> = Arc::new(
        EthTransactionSender::new(
            side_provider.clone(),
            &settings.wallet,
            SendConfig::from(&settings.federator),
        )
        .await
        .context("Failed to initialize the transaction sender")?,
    );
    let agent = sender.address();
    info!("Federator address: {:?}", agent);

    // Checkpoints
    let checkpoints = checkpoint::open(&settings.storage).await?;
    info!("Checkpoint store ready ({:?})", settings.storage.backend);

    let federator = Arc::new(Federator::new(
        MultisigReconciler::new(destination.clone(), sender.clone(), checkpoints.clone()),
        EventScanner::new(
            source.clone(),
            checkpoints.clone(),
            settings.federator.confirmations,
            settings.federator.from_block,
            settings.mainchain.token_address()?,
        ),
        IdempotencyGuard::new(destination.clone()),
        TransferVoter::new(
            source,
            destination,
            sender,
            settings.sidechain.token_address()?,
        ),
        checkpoints,
        settings.federator.checkpoint_policy,
    ));

    // Start API server
    let api_handle = if settings.api.enabled {
        let config = settings.api.clone();
        let federator = federator.clone();
        info!("API server: http://{}:{}", config.host, config.port);
        Some(tokio::spawn(async move {
            if let Err(e) = api::run_server(config, federator, agent).await {
                error!("API server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    info!("Federator is running");

    let poll_interval = Duration::from_millis(settings.federator.poll_interval_ms);
    let outcome = tokio::select! {
        result = federator.run(poll_interval, settings.federator.run_once) => Some(result),
        _ = shutdown_signal() => None,
    };

    if let Some(h) = api_handle {
        h.abort();
    }
    if let Some(h) = metrics_handle {
        h.abort();
    }

    match outcome {
        Some(Ok(())) => {
            if let Some(report) = federator.last_report().await {
                info!("Last cycle: {}", serde_json::to_string(&report)?);
            }
        }
        Some(Err(e)) => {
            error!("Federator stopped after a failed cycle: {}", e);
            std::process::exit(1);
        }
        None => info!("Shutdown signal received, stopping..."),
    }

    info!("Federator stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,federator=debug,sqlx=warn,hyper=warn"));

    let json = std::env::var("FEDERATOR_LOG_JSON").map(|v| v == "1").unwrap_or(false);
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
