use std::collections::VecDeque;
use std::net::IpAddr;

use super::{CaptureError, PacketSource};

/// Replays a fixed sequence of reads, then reports the source closed
#[derive(Debug, Default)]
pub struct ScriptedSource {
    reads: VecDeque<Option<IpAddr>>,
}

impl ScriptedSource {
    pub fn new<I>(reads: I) -> Self
    where
        I: IntoIterator<Item = Option<IpAddr>>,
    {
        Self {
            reads: reads.into_iter().collect(),
        }
    }

    pub fn addresses<I>(addresses: I) -> Self
    where
        I: IntoIterator<Item = IpAddr>,
    {
        Self::new(addresses.into_iter().map(Some))
    }
}

impl PacketSource for ScriptedSource {
    fn next_address(&mut self) -> Result<Option<IpAddr>, CaptureError> {
        self.reads.pop_front().ok_or(CaptureError::Closed)
    }
}
