pub mod backend;
pub mod cache;
pub mod capture;
pub mod cli;
pub mod config;
pub mod ingest;
pub mod lifecycle;
pub mod reconcile;
mod utils;

pub use backend::{CommandBackend, RouteBackend, RouteError};
pub use cache::{CacheEntry, FreshnessCache};
pub use capture::{CaptureError, LiveCapture, PacketSource};
pub use config::ServerConfig;
pub use ingest::{IngestStats, Ingester};
pub use lifecycle::{DrainSummary, Lifecycle, Phase};
pub use reconcile::{PassSummary, Reconciler};
