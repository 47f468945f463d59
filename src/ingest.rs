use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ipnetwork::IpNetwork;
use log::{debug, error, info, trace};

use crate::cache::FreshnessCache;
use crate::capture::{CaptureError, PacketSource};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct IngestStats {
    /// Addresses written to the cache
    pub observed: u64,
    /// Addresses outside the configured range
    pub filtered: u64,
    /// Reads that produced no address (timeouts, non-IP frames)
    pub ignored: u64,
}

impl fmt::Display for IngestStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<IngestStats observed={} filtered={} ignored={}>",
            self.observed, self.filtered, self.ignored
        )
    }
}

/// Feeds observed source addresses into the freshness cache
///
/// Only ever touches the cache, never the route backend.
pub struct Ingester {
    cache: Arc<FreshnessCache>,
    range: Option<IpNetwork>,
    shutdown: Arc<AtomicBool>,
}

impl Ingester {
    pub fn new(
        cache: Arc<FreshnessCache>,
        range: Option<IpNetwork>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            cache,
            range,
            shutdown,
        }
    }

    /// Read from `source` until it closes, fails or shutdown is requested
    ///
    /// Blocks the calling thread, run it off the async runtime.
    pub fn run<S: PacketSource>(&self, mut source: S) -> IngestStats {
        let mut stats = IngestStats::default();
        while !self.shutdown.load(Ordering::SeqCst) {
            match source.next_address() {
                Ok(Some(address)) => {
                    if self.range.map_or(true, |range| range.contains(address)) {
                        if self.cache.observe(address) {
                            debug!("New active address {}", address);
                        }
                        stats.observed += 1;
                    } else {
                        trace!("Ignoring {}, outside of range", address);
                        stats.filtered += 1;
                    }
                }
                Ok(None) => stats.ignored += 1,
                Err(CaptureError::Closed) => {
                    info!("Capture source closed");
                    break;
                }
                Err(err) => {
                    error!("{}", err);
                    break;
                }
            }
        }
        info!("Ingestion stopped {}", stats);
        stats
    }
}
