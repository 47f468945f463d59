//! # wg2bgp
//!
//! Watches traffic on an interface and keeps a host route (and a BGP
//! `network` statement in FRR) for every source address that has sent
//! something in the last 30 seconds.
//!
//! ```sh
//! $ wg2bgp -i wg0 -r 10.0.0.0/8 -a 65001 -u eth0
//! ```
//!
//! Settings can also come from a TOML file (`-c wg2bgp.toml`); flags given
//! on the command line take precedence over the file.

use clap::Parser;

use crate::config::Overrides;

#[derive(Parser, Debug)]
#[clap(name = "wg2bgp", rename_all = "kebab-case")]
/// Announce routes for hosts with live traffic
pub struct Args {
    /// Path to a config.toml
    #[clap(short, long)]
    pub config: Option<String>,
    /// Network interface to capture packets from [default: eth0]
    #[clap(short, long)]
    pub interface: Option<String>,
    /// Only track sources in this range, empty tracks everything [default: 10.0.0.0/8]
    #[clap(short = 'r', long = "range")]
    pub address_range: Option<String>,
    /// Capture snapshot length [default: 64]
    #[clap(short, long)]
    pub snaplen: Option<i32>,
    /// Capture in promiscuous mode
    #[clap(short, long)]
    pub promisc: bool,
    /// BPF capture filter, empty disables [default: inbound]
    #[clap(short, long)]
    pub filter: Option<String>,
    /// Local BGP ASN [default: 64514]
    #[clap(short, long)]
    pub asn: Option<u32>,
    /// Device for installed routes [default: capture interface]
    #[clap(short, long)]
    pub upstream: Option<String>,
    /// Show debug logs (additive for trace logs)
    #[clap(short, parse(from_occurrences))]
    pub verbose: u8,
}

impl Args {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            interface: self.interface.clone(),
            address_range: self.address_range.clone(),
            snaplen: self.snaplen,
            promisc: self.promisc,
            capture_filter: self.filter.clone(),
            asn: self.asn,
            upstream_interface: self.upstream.clone(),
        }
    }
}
