use std::fs::File;
use std::io::{self, Read};

use serde::Deserialize;

struct Defaults {}

impl Defaults {
    fn interface() -> String {
        "eth0".to_string()
    }

    fn address_range() -> String {
        "10.0.0.0/8".to_string()
    }

    fn snaplen() -> i32 {
        64
    }

    fn promisc() -> bool {
        false
    }

    fn capture_filter() -> String {
        "inbound".to_string()
    }

    fn read_timeout_ms() -> i32 {
        1000
    }

    fn asn() -> u32 {
        64514
    }

    fn freshness_ttl() -> u16 {
        30
    }

    fn reconcile_interval() -> u16 {
        5
    }

    fn open_attempts() -> u8 {
        3
    }

    fn open_retry_delay() -> u16 {
        1
    }

    fn announce_bgp() -> bool {
        true
    }

    fn ip_command() -> String {
        "ip".to_string()
    }

    fn vtysh_command() -> String {
        "vtysh".to_string()
    }
}

/// Config (toml) representation of the daemon config
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct ServerConfigSpec {
    // Device to capture traffic on
    #[serde(default = "Defaults::interface")]
    pub(super) interface: String,
    // Only track source addresses inside this CIDR (empty string tracks everything)
    #[serde(default = "Defaults::address_range")]
    pub(super) address_range: String,

    // Bytes captured per packet, only the IP header is needed
    #[serde(default = "Defaults::snaplen")]
    pub(super) snaplen: i32,
    #[serde(default = "Defaults::promisc")]
    pub(super) promisc: bool,
    // BPF filter expression (empty string disables filtering)
    #[serde(default = "Defaults::capture_filter")]
    pub(super) capture_filter: String,
    // How long a capture read may block before checking for shutdown
    #[serde(default = "Defaults::read_timeout_ms")]
    pub(super) read_timeout_ms: i32,

    // Local ASN used for `router bgp <asn>`
    #[serde(default = "Defaults::asn")]
    pub(super) asn: u32,
    // Device for installed host routes, defaults to `interface`
    pub(super) upstream_interface: Option<String>,
    // Add `network` statements to the BGP daemon as well as local routes
    #[serde(default = "Defaults::announce_bgp")]
    pub(super) announce_bgp: bool,
    #[serde(default = "Defaults::ip_command")]
    pub(super) ip_command: String,
    #[serde(default = "Defaults::vtysh_command")]
    pub(super) vtysh_command: String,

    // Seconds without traffic before an address is withdrawn
    #[serde(default = "Defaults::freshness_ttl")]
    pub(super) freshness_ttl: u16,
    // Seconds between reconciliation passes
    #[serde(default = "Defaults::reconcile_interval")]
    pub(super) reconcile_interval: u16,

    // Capture open retries at startup
    #[serde(default = "Defaults::open_attempts")]
    pub(super) open_attempts: u8,
    #[serde(default = "Defaults::open_retry_delay")]
    pub(super) open_retry_delay: u16,
}

impl Default for ServerConfigSpec {
    fn default() -> Self {
        Self {
            interface: Defaults::interface(),
            address_range: Defaults::address_range(),
            snaplen: Defaults::snaplen(),
            promisc: Defaults::promisc(),
            capture_filter: Defaults::capture_filter(),
            read_timeout_ms: Defaults::read_timeout_ms(),
            asn: Defaults::asn(),
            upstream_interface: None,
            announce_bgp: Defaults::announce_bgp(),
            ip_command: Defaults::ip_command(),
            vtysh_command: Defaults::vtysh_command(),
            freshness_ttl: Defaults::freshness_ttl(),
            reconcile_interval: Defaults::reconcile_interval(),
            open_attempts: Defaults::open_attempts(),
            open_retry_delay: Defaults::open_retry_delay(),
        }
    }
}

impl ServerConfigSpec {
    pub(super) fn from_file(path: &str) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Self::from_toml(&contents)
            .map_err(|err| io::Error::new(err.kind(), format!("{}: {}", path, err)))
    }

    pub(super) fn from_toml(contents: &str) -> io::Result<Self> {
        toml::from_str(contents).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }
}
