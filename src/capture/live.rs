use std::fmt;
use std::net::IpAddr;

use log::{debug, info};
use pcap::{Active, Capture};

use super::parse::{source_address, LinkLayer};
use super::{CaptureError, PacketSource};
use crate::config::CaptureConfig;

/// Live libpcap capture on a network device
pub struct LiveCapture {
    capture: Capture<Active>,
    link: LinkLayer,
    interface: String,
}

impl LiveCapture {
    pub fn open(config: &CaptureConfig) -> Result<Self, CaptureError> {
        let mut capture = Capture::from_device(config.interface.as_str())?
            .promisc(config.promisc)
            .snaplen(config.snaplen)
            .timeout(config.read_timeout_ms)
            .open()?;
        if let Some(filter) = &config.filter {
            capture
                .filter(filter, true)
                .map_err(|err| CaptureError::Filter(filter.clone(), err))?;
            debug!("Applied capture filter '{}'", filter);
        }
        let dlt = capture.get_datalink().0;
        let link = LinkLayer::from_dlt(dlt).ok_or(CaptureError::UnsupportedLink(dlt))?;
        info!(
            "Capturing on {} [{:?}, snaplen={}, promisc={}]",
            config.interface, link, config.snaplen, config.promisc
        );
        Ok(Self {
            capture,
            link,
            interface: config.interface.clone(),
        })
    }
}

impl PacketSource for LiveCapture {
    fn next_address(&mut self) -> Result<Option<IpAddr>, CaptureError> {
        match self.capture.next_packet() {
            Ok(packet) => Ok(source_address(self.link, packet.data)),
            Err(pcap::Error::TimeoutExpired) => Ok(None),
            Err(pcap::Error::NoMorePackets) => Err(CaptureError::Closed),
            Err(err) => Err(err.into()),
        }
    }
}

impl fmt::Display for LiveCapture {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<LiveCapture {} {:?}>", self.interface, self.link)
    }
}
