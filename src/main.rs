use std::error::Error;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::*;
use env_logger::Builder;
use log::{debug, info, warn, LevelFilter};

use wg2bgp::cli::Args;
use wg2bgp::lifecycle::{register_shutdown_signals, shutdown_requested};
use wg2bgp::{
    config, CaptureError, CommandBackend, FreshnessCache, Ingester, Lifecycle, LiveCapture,
    Reconciler, RouteBackend,
};

const SHUTDOWN_POLL_MS: u64 = 200;

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = config::load(args.config.as_deref(), args.overrides())?;
    debug!("Loaded {}", config);

    let shutdown = Arc::new(AtomicBool::new(false));
    register_shutdown_signals(&shutdown)?;

    let cache = Arc::new(FreshnessCache::new());
    let backend = CommandBackend::new(config.route.clone());
    info!("Managing routes with {}", backend);
    let backend: Arc<dyn RouteBackend> = Arc::new(backend);
    let reconciler = Arc::new(Reconciler::new(Arc::clone(&cache), backend, config.ttl()));
    let lifecycle = Arc::new(Lifecycle::new(reconciler));

    let source = lifecycle
        .open_source(config.open_attempts, config.retry_delay(), || {
            LiveCapture::open(&config.capture)
        })
        .await
        .map_err(|err| {
            if let CaptureError::Pcap(_) = err {
                eprintln!(
                    "Unable to open {}, make sure libpcap is installed:",
                    config.capture.interface
                );
                eprintln!("  sudo apt-get update && sudo apt-get install -y libpcap-dev");
            }
            err
        })?;
    debug!("Opened {}", source);

    let ingester = Ingester::new(
        Arc::clone(&cache),
        config.address_range,
        Arc::clone(&shutdown),
    );
    let mut serving = {
        let lifecycle = Arc::clone(&lifecycle);
        let period = config.reconcile_period();
        tokio::spawn(async move { lifecycle.serve(source, ingester, period).await })
    };

    // The capture read timeout bounds how long ingestion takes to notice a
    // signal, give it that long before cleaning up from here
    let grace = Duration::from_millis(config.capture.read_timeout_ms.max(0) as u64)
        + Duration::from_secs(1);
    let stalled = tokio::select! {
        served = &mut serving => {
            if let Ok((stats, drained)) = served {
                debug!("Served {} {}", stats, drained);
            }
            false
        }
        _ = async {
            let poll = Duration::from_millis(SHUTDOWN_POLL_MS);
            shutdown_requested(Arc::clone(&shutdown), poll).await;
            info!("Stopping wg2bgp...");
            tokio::time::sleep(grace).await;
        } => {
            warn!("Capture did not stop within {:?}", grace);
            true
        }
    };

    // No-op if serving already drained, otherwise waits for it to finish
    lifecycle.drain().await;
    if stalled {
        // A capture thread stuck in a read would hold up runtime shutdown
        process::exit(0);
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let (crate_level, other_level) = match args.verbose {
        0 => (LevelFilter::Info, LevelFilter::Warn),
        1 => (LevelFilter::Debug, LevelFilter::Warn),
        2 => (LevelFilter::Trace, LevelFilter::Warn),
        _ => (LevelFilter::Trace, LevelFilter::Trace),
    };
    Builder::new()
        .filter(Some("wg2bgp"), crate_level)
        .filter(None, other_level)
        .init();
    info!("Logging at levels {}/{}", crate_level, other_level);

    if let Err(err) = run(args).await {
        eprintln!("{}", err.to_string().red());
        process::exit(1);
    }
}
