mod file;

use std::fmt;
use std::io::{Error, ErrorKind, Result};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use ipnetwork::IpNetwork;
use log::warn;

/// Parse an optional TOML config file, apply CLI overrides and validate
pub fn load(path: Option<&str>, overrides: Overrides) -> Result<ServerConfig> {
    let mut spec = match path {
        Some(path) => file::ServerConfigSpec::from_file(path)?,
        None => file::ServerConfigSpec::default(),
    };
    overrides.apply(&mut spec);
    ServerConfig::from_spec(spec)
}

/// Values given on the command line, these win over the config file
#[derive(Debug, Default)]
pub struct Overrides {
    pub interface: Option<String>,
    pub address_range: Option<String>,
    pub snaplen: Option<i32>,
    pub promisc: bool,
    pub capture_filter: Option<String>,
    pub asn: Option<u32>,
    pub upstream_interface: Option<String>,
}

impl Overrides {
    fn apply(self, spec: &mut file::ServerConfigSpec) {
        if let Some(interface) = self.interface {
            spec.interface = interface;
        }
        if let Some(range) = self.address_range {
            spec.address_range = range;
        }
        if let Some(snaplen) = self.snaplen {
            spec.snaplen = snaplen;
        }
        if self.promisc {
            spec.promisc = true;
        }
        if let Some(filter) = self.capture_filter {
            spec.capture_filter = filter;
        }
        if let Some(asn) = self.asn {
            spec.asn = asn;
        }
        if let Some(upstream) = self.upstream_interface {
            spec.upstream_interface = Some(upstream);
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CaptureConfig {
    pub interface: String,
    pub snaplen: i32,
    pub promisc: bool,
    pub filter: Option<String>,
    pub read_timeout_ms: i32,
}

/// Parameters handed through to the route backend
#[derive(Clone, Debug, PartialEq)]
pub struct RouteConfig {
    pub upstream_interface: String,
    pub asn: u32,
    pub announce_bgp: bool,
    pub ip_command: String,
    pub vtysh_command: String,
}

#[derive(Debug)]
pub struct ServerConfig {
    pub capture: CaptureConfig,
    /// Only source addresses inside this network are tracked
    pub address_range: Option<IpNetwork>,
    pub route: Arc<RouteConfig>,
    pub freshness_ttl: u16,
    pub reconcile_interval: u16,
    pub open_attempts: u8,
    pub open_retry_delay: u16,
}

impl ServerConfig {
    fn from_spec(spec: file::ServerConfigSpec) -> Result<Self> {
        let address_range = parse_range(&spec.address_range)?;
        if address_range.is_none() {
            warn!("No address range given, tracking every source address");
        }
        if spec.freshness_ttl == 0 {
            return Err(invalid("freshness_ttl must be at least 1 second"));
        }
        if spec.reconcile_interval == 0 {
            return Err(invalid("reconcile_interval must be at least 1 second"));
        }
        if spec.open_attempts == 0 {
            return Err(invalid("open_attempts must be at least 1"));
        }
        if spec.snaplen <= 0 {
            return Err(invalid("snaplen must be positive"));
        }
        // libpcap treats 0 as "block forever" and negative as non-blocking
        if spec.read_timeout_ms <= 0 {
            return Err(invalid("read_timeout_ms must be positive"));
        }
        let filter = Some(spec.capture_filter.trim().to_string()).filter(|f| !f.is_empty());
        let upstream_interface = match spec.upstream_interface {
            Some(upstream) => upstream,
            None => spec.interface.clone(),
        };

        Ok(Self {
            capture: CaptureConfig {
                interface: spec.interface,
                snaplen: spec.snaplen,
                promisc: spec.promisc,
                filter,
                read_timeout_ms: spec.read_timeout_ms,
            },
            address_range,
            route: Arc::new(RouteConfig {
                upstream_interface,
                asn: spec.asn,
                announce_bgp: spec.announce_bgp,
                ip_command: spec.ip_command,
                vtysh_command: spec.vtysh_command,
            }),
            freshness_ttl: spec.freshness_ttl,
            reconcile_interval: spec.reconcile_interval,
            open_attempts: spec.open_attempts,
            open_retry_delay: spec.open_retry_delay,
        })
    }

    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.freshness_ttl.into())
    }

    pub fn reconcile_period(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval.into())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.open_retry_delay.into())
    }
}

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let range = match self.address_range {
            Some(range) => range.to_string(),
            None => "any".to_string(),
        };
        write!(
            f,
            "<ServerConfig iface={} range={} ttl={}s interval={}s asn={}>",
            self.capture.interface,
            range,
            self.freshness_ttl,
            self.reconcile_interval,
            self.route.asn,
        )
    }
}

/// An empty range disables filtering, anything else must be valid CIDR
fn parse_range(range: &str) -> Result<Option<IpNetwork>> {
    let range = range.trim();
    if range.is_empty() {
        return Ok(None);
    }
    IpNetwork::from_str(range)
        .map(Some)
        .map_err(|err| invalid(&format!("Invalid address range '{}': {}", range, err)))
}

fn invalid(reason: &str) -> Error {
    Error::new(ErrorKind::InvalidInput, reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_defaults() {
        let config = load(None, Overrides::default()).unwrap();
        assert_eq!(config.capture.interface, "eth0");
        assert_eq!(config.capture.filter, Some("inbound".to_string()));
        assert_eq!(config.route.upstream_interface, "eth0");
        assert_eq!(config.route.asn, 64514);
        assert_eq!(config.ttl(), chrono::Duration::seconds(30));
        assert_eq!(config.reconcile_period(), Duration::from_secs(5));
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
        let range = config.address_range.unwrap();
        assert!(range.contains(IpAddr::from(Ipv4Addr::new(10, 1, 2, 3))));
        assert!(!range.contains(IpAddr::from(Ipv4Addr::new(192, 168, 5, 1))));
    }

    #[test]
    fn test_overrides_win_over_file() {
        let overrides = Overrides {
            interface: Some("wg1".to_string()),
            address_range: Some("172.16.0.0/12".to_string()),
            asn: Some(65500),
            promisc: true,
            capture_filter: Some("".to_string()),
            ..Overrides::default()
        };
        let config = load(Some("./demos/wg2bgp.toml"), overrides).unwrap();
        assert_eq!(config.capture.interface, "wg1");
        assert!(config.capture.promisc);
        assert_eq!(config.capture.filter, None);
        assert_eq!(config.route.asn, 65500);
        // upstream_interface comes from the file
        assert_eq!(config.route.upstream_interface, "eth0");
        assert_eq!(
            config.address_range,
            Some("172.16.0.0/12".parse::<IpNetwork>().unwrap())
        );
    }

    #[test]
    fn test_upstream_defaults_to_capture_interface() {
        let overrides = Overrides {
            interface: Some("wg0".to_string()),
            ..Overrides::default()
        };
        let config = load(None, overrides).unwrap();
        assert_eq!(config.route.upstream_interface, "wg0");
    }

    #[test]
    fn test_empty_range_disables_filter() {
        let overrides = Overrides {
            address_range: Some("".to_string()),
            ..Overrides::default()
        };
        assert_eq!(load(None, overrides).unwrap().address_range, None);
    }

    #[test]
    fn test_malformed_range_is_fatal() {
        let overrides = Overrides {
            address_range: Some("10.0.0.0/33".to_string()),
            ..Overrides::default()
        };
        let err = load(None, overrides).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.to_string().contains("10.0.0.0/33"));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut spec = file::ServerConfigSpec::default();
        spec.freshness_ttl = 0;
        assert!(ServerConfig::from_spec(spec).is_err());
    }

    #[test]
    fn test_read_timeout_must_be_positive() {
        for timeout in &[0, -1] {
            let mut spec = file::ServerConfigSpec::default();
            spec.read_timeout_ms = *timeout;
            let err = ServerConfig::from_spec(spec).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
            assert!(err.to_string().contains("read_timeout_ms"));
        }
    }
}
