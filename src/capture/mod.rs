mod live;
pub mod parse;
#[cfg(test)]
pub(crate) mod scripted;

pub use live::LiveCapture;

use std::error;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use log::{debug, warn};

/// Delivers the source address of each captured packet
///
/// `next_address` blocks until a packet arrives or the source's read
/// timeout expires. `Ok(None)` means nothing usable was seen this time
/// (timeout, non-IP frame), so the caller can check for shutdown.
pub trait PacketSource: Send {
    fn next_address(&mut self) -> Result<Option<IpAddr>, CaptureError>;
}

#[derive(Debug)]
pub enum CaptureError {
    /// Error from libpcap while opening or reading
    Pcap(pcap::Error),
    /// Capture filter was rejected. [expression, reason]
    Filter(String, pcap::Error),
    /// Device uses a link layer we can't decode. [DLT]
    UnsupportedLink(i32),
    /// No more packets will be delivered
    Closed,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Capture Error: ")?;
        use CaptureError::*;
        match self {
            Pcap(err) => write!(f, "{}", err),
            Filter(expr, err) => write!(f, "Invalid filter '{}': {}", expr, err),
            UnsupportedLink(dlt) => write!(f, "Unsupported link type [{}]", dlt),
            Closed => write!(f, "Capture source closed"),
        }
    }
}

impl error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            CaptureError::Pcap(err) | CaptureError::Filter(_, err) => Some(err),
            _ => None,
        }
    }
}

impl From<pcap::Error> for CaptureError {
    fn from(error: pcap::Error) -> Self {
        CaptureError::Pcap(error)
    }
}

/// Call `open` up to `attempts` times, pausing `delay` between failures
///
/// Returns the last error once every attempt has failed.
pub async fn open_with_retries<S, F>(
    attempts: u8,
    delay: Duration,
    mut open: F,
) -> Result<S, CaptureError>
where
    F: FnMut() -> Result<S, CaptureError>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match open() {
            Ok(source) => {
                debug!("Capture opened on attempt {}", attempt);
                return Ok(source);
            }
            Err(err) if attempt < attempts => {
                warn!("Capture open attempt {}/{} failed: {}", attempt, attempts, err);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
