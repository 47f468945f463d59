//! Pull the source address out of a captured frame
//!
//! Only enough of each header is read to find the network layer; no
//! checksums or lengths are validated.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use byteorder::{BigEndian, ByteOrder};

const DLT_NULL: i32 = 0;
const DLT_EN10MB: i32 = 1;
const DLT_RAW_BSD: i32 = 12;
const DLT_RAW_OPENBSD: i32 = 14;
const DLT_RAW: i32 = 101;
const DLT_LOOP: i32 = 108;
const DLT_LINUX_SLL: i32 = 113;
const DLT_IPV4: i32 = 228;
const DLT_IPV6: i32 = 229;
const DLT_LINUX_SLL2: i32 = 276;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86dd;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_QINQ: u16 = 0x88a8;

const ETHERNET_HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;
const MAX_VLAN_TAGS: usize = 2;
const SLL_HEADER_LEN: usize = 16;
const SLL2_HEADER_LEN: usize = 20;
const LOOPBACK_HEADER_LEN: usize = 4;

/// Link layer framing of a capture device
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LinkLayer {
    Ethernet,
    /// Bare IP packets, e.g. WireGuard or other tun devices
    Raw,
    LinuxSll,
    LinuxSll2,
    /// BSD loopback, 4 byte address family header
    Loopback,
}

impl LinkLayer {
    pub fn from_dlt(dlt: i32) -> Option<Self> {
        match dlt {
            DLT_EN10MB => Some(LinkLayer::Ethernet),
            DLT_RAW | DLT_RAW_BSD | DLT_RAW_OPENBSD | DLT_IPV4 | DLT_IPV6 => Some(LinkLayer::Raw),
            DLT_LINUX_SLL => Some(LinkLayer::LinuxSll),
            DLT_LINUX_SLL2 => Some(LinkLayer::LinuxSll2),
            DLT_NULL | DLT_LOOP => Some(LinkLayer::Loopback),
            _ => None,
        }
    }
}

/// Source address of the IP packet carried in `frame`
///
/// Returns None for non-IP or truncated frames.
pub fn source_address(link: LinkLayer, frame: &[u8]) -> Option<IpAddr> {
    match link {
        LinkLayer::Ethernet => ethernet_payload(frame).and_then(ip_source),
        LinkLayer::Raw => ip_source(frame),
        LinkLayer::LinuxSll => {
            if frame.len() < SLL_HEADER_LEN {
                return None;
            }
            let protocol = BigEndian::read_u16(&frame[14..16]);
            ip_payload(protocol, &frame[SLL_HEADER_LEN..])
        }
        LinkLayer::LinuxSll2 => {
            if frame.len() < SLL2_HEADER_LEN {
                return None;
            }
            let protocol = BigEndian::read_u16(&frame[0..2]);
            ip_payload(protocol, &frame[SLL2_HEADER_LEN..])
        }
        // The family field is in host byte order for DLT_NULL, so go by the IP version instead
        LinkLayer::Loopback => frame.get(LOOPBACK_HEADER_LEN..).and_then(ip_source),
    }
}

fn ethernet_payload(frame: &[u8]) -> Option<&[u8]> {
    let mut offset = ETHERNET_HEADER_LEN;
    let mut ethertype = read_u16(frame, 12)?;
    for _ in 0..MAX_VLAN_TAGS {
        if ethertype != ETHERTYPE_VLAN && ethertype != ETHERTYPE_QINQ {
            break;
        }
        // The inner ethertype follows the 2 byte tag control field
        ethertype = read_u16(frame, offset + 2)?;
        offset += VLAN_TAG_LEN;
    }
    match ethertype {
        ETHERTYPE_IPV4 | ETHERTYPE_IPV6 => frame.get(offset..),
        _ => None,
    }
}

fn ip_payload(protocol: u16, payload: &[u8]) -> Option<IpAddr> {
    match protocol {
        ETHERTYPE_IPV4 | ETHERTYPE_IPV6 => ip_source(payload),
        _ => None,
    }
}

fn ip_source(packet: &[u8]) -> Option<IpAddr> {
    match packet.first()? >> 4 {
        4 if packet.len() >= 20 => {
            let mut octets = [0u8; 4];
            octets.copy_from_slice(&packet[12..16]);
            Some(IpAddr::from(Ipv4Addr::from(octets)))
        }
        6 if packet.len() >= 40 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&packet[8..24]);
            Some(IpAddr::from(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

fn read_u16(frame: &[u8], offset: usize) -> Option<u16> {
    frame.get(offset..offset + 2).map(BigEndian::read_u16)
}
