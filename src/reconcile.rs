use std::fmt;
use std::sync::Arc;
use std::time;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, trace, warn};
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::backend::RouteBackend;
use crate::cache::{CacheEntry, FreshnessCache};
use crate::utils::format_elapsed_time;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PassSummary {
    /// Entries younger than the TTL
    pub active: usize,
    pub installed: usize,
    pub install_failed: usize,
    /// Entries removed from the cache
    pub expired: usize,
    pub withdraw_failed: usize,
}

impl fmt::Display for PassSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<Pass active={} installed={} install_failed={} expired={} withdraw_failed={}>",
            self.active, self.installed, self.install_failed, self.expired, self.withdraw_failed
        )
    }
}

/// Keeps the route backend in line with the set of recently seen addresses
///
/// Each pass installs a route for every entry younger than the TTL and
/// withdraws + forgets every entry that has reached it. Installs are
/// re-issued on every pass, which is also how a failed install is retried.
pub struct Reconciler {
    cache: Arc<FreshnessCache>,
    backend: Arc<dyn RouteBackend>,
    ttl: Duration,
    // Serializes passes and the final drain, true once closed
    closed: Mutex<bool>,
}

impl Reconciler {
    pub fn new(cache: Arc<FreshnessCache>, backend: Arc<dyn RouteBackend>, ttl: Duration) -> Self {
        Self {
            cache,
            backend,
            ttl,
            closed: Mutex::new(false),
        }
    }

    pub fn cache(&self) -> &Arc<FreshnessCache> {
        &self.cache
    }

    pub fn backend(&self) -> &Arc<dyn RouteBackend> {
        &self.backend
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Wait for any running pass, then stop all future passes
    ///
    /// The returned guard keeps passes excluded while it is held.
    pub async fn close(&self) -> MutexGuard<'_, bool> {
        let mut closed = self.closed.lock().await;
        *closed = true;
        closed
    }

    pub async fn run_pass(&self) -> PassSummary {
        self.run_pass_at(Utc::now()).await
    }

    /// Reconcile the cache as of `now`
    pub async fn run_pass_at(&self, now: DateTime<Utc>) -> PassSummary {
        let closed = self.closed.lock().await;
        if *closed {
            trace!("Reconciler closed, skipping pass");
            return PassSummary::default();
        }

        let (expired, active): (Vec<CacheEntry>, Vec<CacheEntry>) = self
            .cache
            .snapshot_at(now)
            .into_iter()
            .partition(|entry| entry.is_expired(self.ttl));
        let mut summary = PassSummary {
            active: active.len(),
            expired: expired.len(),
            ..PassSummary::default()
        };

        for entry in &active {
            trace!("{}", entry);
            match self.backend.install_route(entry.address).await {
                Ok(_) => summary.installed += 1,
                Err(err) => {
                    warn!("Error installing route for {}: {}", entry.address, err);
                    summary.install_failed += 1;
                }
            }
        }

        for entry in &expired {
            // Forget the entry even if the withdrawal fails, a stuck backend
            // must not grow the cache forever
            if let Err(err) = self.backend.withdraw_route(entry.address).await {
                warn!("Error withdrawing route for {}: {}", entry.address, err);
                summary.withdraw_failed += 1;
            }
            self.cache.remove(&entry.address);
            info!(
                "Withdrew {}, idle for {}",
                entry.address,
                format_elapsed_time(entry.age)
            );
        }

        drop(closed);
        summary
    }

    /// Run a pass every `period` until `stop` changes or its sender is dropped
    ///
    /// The first pass runs one period after starting. A slow pass delays
    /// the following ones rather than bunching them up.
    pub async fn run(self: Arc<Self>, period: time::Duration, mut stop: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!("Reconciling every {:?} (ttl {}s)", period, self.ttl.num_seconds());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let summary = self.run_pass().await;
                    debug!("{}", summary);
                }
                _ = stop.changed() => break,
            }
        }
        debug!("Reconciler stopped");
    }
}

impl fmt::Display for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<Reconciler ttl={} {}>",
            format_elapsed_time(self.ttl),
            self.cache
        )
    }
}
