use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use log::{debug, error, info, warn};
use signal_hook::consts::TERM_SIGNALS;
use signal_hook::flag;
use tokio::sync::{watch, OnceCell};
use tokio::task;

use crate::capture::{self, CaptureError, PacketSource};
use crate::ingest::{IngestStats, Ingester};
use crate::reconcile::Reconciler;
use crate::utils::{format_time_as_elapsed, lock};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Phase {
    Starting,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let word = match self {
            Phase::Starting => "Starting",
            Phase::Running => "Running",
            Phase::Draining => "Draining",
            Phase::Stopped => "Stopped",
        };
        write!(f, "{}", word)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DrainSummary {
    /// Addresses present in the cache when draining began
    pub attempted: usize,
    pub failed: usize,
}

impl fmt::Display for DrainSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<Drain attempted={} failed={}>",
            self.attempted, self.failed
        )
    }
}

/// Owns startup and the final cleanup of every installed route
pub struct Lifecycle {
    reconciler: Arc<Reconciler>,
    phase: Mutex<Phase>,
    drained: OnceCell<DrainSummary>,
}

impl Lifecycle {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self {
            reconciler,
            phase: Mutex::new(Phase::Starting),
            drained: OnceCell::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        *lock(&self.phase)
    }

    fn transition(&self, next: Phase) {
        let mut phase = lock(&self.phase);
        if *phase != next {
            info!("{} -> {}", *phase, next);
            *phase = next;
        }
    }

    /// Open the packet source, retrying `attempts` times
    pub async fn open_source<S, F>(
        &self,
        attempts: u8,
        delay: Duration,
        open: F,
    ) -> Result<S, CaptureError>
    where
        F: FnMut() -> Result<S, CaptureError>,
    {
        let source = capture::open_with_retries(attempts, delay, open).await?;
        self.transition(Phase::Running);
        Ok(source)
    }

    /// Run ingestion and reconciliation until the source stops delivering,
    /// then drain
    ///
    /// Ingestion ends when the source closes or the ingester's shutdown
    /// flag is raised.
    pub async fn serve<S>(
        &self,
        source: S,
        ingester: Ingester,
        period: Duration,
    ) -> (IngestStats, DrainSummary)
    where
        S: PacketSource + 'static,
    {
        self.transition(Phase::Running);
        let (stop_tx, stop_rx) = watch::channel(false);
        let reconciler = tokio::spawn(Arc::clone(&self.reconciler).run(period, stop_rx));

        let stats = match task::spawn_blocking(move || ingester.run(source)).await {
            Ok(stats) => stats,
            Err(err) => {
                error!("Ingestion ended unexpectedly: {}", err);
                IngestStats::default()
            }
        };

        if stop_tx.send(true).is_err() {
            debug!("Reconciler already stopped");
        }
        if let Err(err) = reconciler.await {
            error!("Reconciler ended unexpectedly: {}", err);
        }
        (stats, self.drain().await)
    }

    /// Withdraw every route still represented in the cache
    ///
    /// Runs at most once; later callers wait for and share the first result.
    pub async fn drain(&self) -> DrainSummary {
        *self.drained.get_or_init(|| self.drain_once()).await
    }

    async fn drain_once(&self) -> DrainSummary {
        self.transition(Phase::Draining);
        // Held until every withdrawal is done so no pass can interleave
        let _closed = self.reconciler.close().await;

        let entries = self.reconciler.cache().drain_all();
        let mut summary = DrainSummary {
            attempted: entries.len(),
            ..DrainSummary::default()
        };
        for entry in entries {
            match self.reconciler.backend().withdraw_route(entry.address).await {
                Ok(_) => debug!(
                    "Withdrew {}, last seen {} ago",
                    entry.address,
                    format_time_as_elapsed(entry.last_seen)
                ),
                Err(err) => {
                    warn!("Error withdrawing route for {}: {}", entry.address, err);
                    summary.failed += 1;
                }
            }
        }
        info!("Routes cleaned up {}", summary);
        self.transition(Phase::Stopped);
        summary
    }
}

/// Raise `shutdown` on SIGINT/SIGTERM/SIGQUIT
///
/// A second signal while `shutdown` is already raised exits immediately.
pub fn register_shutdown_signals(shutdown: &Arc<AtomicBool>) -> io::Result<()> {
    for sig in TERM_SIGNALS {
        flag::register_conditional_shutdown(*sig, 1, Arc::clone(shutdown))?;
        flag::register(*sig, Arc::clone(shutdown))?;
    }
    Ok(())
}

/// Resolves once `shutdown` has been raised
pub async fn shutdown_requested(shutdown: Arc<AtomicBool>, poll: Duration) {
    while !shutdown.load(Ordering::SeqCst) {
        tokio::time::sleep(poll).await;
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<Lifecycle {} {}>", self.phase(), self.reconciler)
    }
}
