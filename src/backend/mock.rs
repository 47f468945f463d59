use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{RouteBackend, RouteError};
use crate::utils::lock;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Call {
    Install(IpAddr),
    Withdraw(IpAddr),
}

/// Records every call and tracks which routes would be installed
#[derive(Debug, Default)]
pub struct MockBackend {
    calls: Mutex<Vec<Call>>,
    installed: Mutex<HashSet<IpAddr>>,
    failing: Mutex<HashSet<IpAddr>>,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call for `address` fail until `recover` is called
    pub fn fail_for(&self, address: IpAddr) {
        lock(&self.failing).insert(address);
    }

    pub fn recover(&self, address: IpAddr) {
        lock(&self.failing).remove(&address);
    }

    /// Make every call take `delay` before it completes
    pub fn slow_down(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    /// Most calls that were ever running at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    pub fn installs_of(&self, address: IpAddr) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == Call::Install(address))
            .count()
    }

    pub fn withdrawals_of(&self, address: IpAddr) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == Call::Withdraw(address))
            .count()
    }

    pub fn is_installed(&self, address: IpAddr) -> bool {
        lock(&self.installed).contains(&address)
    }

    async fn record(&self, call: Call) {
        lock(&self.calls).push(call);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn check(&self, address: IpAddr) -> Result<(), RouteError> {
        if lock(&self.failing).contains(&address) {
            return Err(RouteError::Other(format!("mock failure for {}", address)));
        }
        Ok(())
    }
}

#[async_trait]
impl RouteBackend for MockBackend {
    async fn install_route(&self, address: IpAddr) -> Result<(), RouteError> {
        self.record(Call::Install(address)).await;
        self.check(address)?;
        lock(&self.installed).insert(address);
        Ok(())
    }

    async fn withdraw_route(&self, address: IpAddr) -> Result<(), RouteError> {
        self.record(Call::Withdraw(address)).await;
        self.check(address)?;
        lock(&self.installed).remove(&address);
        Ok(())
    }
}
