//! Payment monitor (v1)
//!
//! Verifies claimed on-chain payments and watches campaign and platform
//! wallets for inbound token transfers.
//!
//! # Architecture Overview
//!
//! ```text
//!   settings store ──▶ NetworkConfigProvider ──▶ ChainClient (HTTP + WS)
//!                                                     │
//!              ┌──────────────────────────────────────┤
//!              ▼                                      ▼
//!      TransferVerifier                     SubscriptionSupervisor
//!   (admin /verify, API layer)          (one WalletSubscription per wallet)
//!                                                     │
//!                                                     ▼
//!                                          mpsc<TransferObserved>
//!                                                     │
//!                                                     ▼
//!                                        run_recorder ──▶ DonationLedger
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use payment_monitor::admin::{self, AdminState};
use payment_monitor::config::{load_config, EngineConfig};
use payment_monitor::lifecycle::{bootstrap, resume_listeners, wait_for_signal, Services, Shutdown};
use payment_monitor::observability::{logging, metrics};
use payment_monitor::payments::run_recorder;

#[derive(Parser)]
#[command(name = "payment-monitor")]
#[command(about = "Blockchain payment verification and wallet monitoring", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!("payment-monitor v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        network = %config.monitor.network,
        campaigns = config.campaigns.len(),
        poll_interval_ms = config.monitor.poll_interval_ms,
        admin = config.admin.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let Services { engine, ledger, events } = bootstrap(&config).await?;
    let shutdown = Shutdown::new();

    let recorder = tokio::spawn(run_recorder(events, ledger.clone(), shutdown.subscribe()));

    let watchdog = tokio::spawn(
        engine
            .supervisor()
            .run_watchdog(Duration::from_secs(config.monitor.watchdog_secs), shutdown.subscribe()),
    );

    let admin_server = if config.admin.enabled {
        let state = AdminState {
            engine: engine.clone(),
            ledger: ledger.clone(),
            api_key: Arc::from(config.admin.api_key.as_str()),
        };
        let admin_config = config.admin.clone();
        let rx = shutdown.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = admin::serve(&admin_config, state, rx).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        }))
    } else {
        None
    };

    resume_listeners(&engine, &config).await;

    wait_for_signal().await;
    tracing::info!("Shutting down");

    // Listeners first, so nothing new enters the channel while the recorder drains it.
    engine.shutdown().await;
    shutdown.trigger();

    if let Err(e) = recorder.await {
        tracing::error!(error = %e, "Recorder task failed");
    }
    let _ = watchdog.await;
    if let Some(server) = admin_server {
        let _ = server.await;
    }

    if let Err(e) = ledger.save_to_file() {
        tracing::error!(error = %e, "Failed to save donation ledger");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
