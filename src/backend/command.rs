use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, trace};
use tokio::process::Command;

use super::{RouteBackend, RouteError};
use crate::config::RouteConfig;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Action {
    Install,
    Withdraw,
}

// `ip route delete` of a route the kernel doesn't have (ESRCH)
const NO_SUCH_ROUTE: &str = "No such process";
// FRR's reply to `no network` for a prefix it isn't announcing
const NO_SUCH_NETWORK: &str = "Can't find static route specified";

/// An external command and its arguments
#[derive(Debug, PartialEq)]
struct Step {
    program: String,
    args: Vec<String>,
    /// Output that means there was nothing to undo, treated as success
    already_done: Option<&'static str>,
}

impl Step {
    async fn run(&self) -> Result<(), RouteError> {
        trace!("Running {}", self);
        let output = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| RouteError::Spawn(self.to_string(), err))?;
        if output.status.success() {
            return Ok(());
        }
        // vtysh reports errors on stdout, ip on stderr
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&output.stdout);
        match self.already_done {
            Some(marker) if stderr.contains(marker) || stdout.contains(marker) => {
                debug!("Nothing to undo for {}", self);
                Ok(())
            }
            _ => Err(RouteError::Command(self.to_string(), output.status, stderr)),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Route backend driving the kernel route table (`ip route`) and the
/// FRR BGP daemon (`vtysh`)
///
/// A host route `<addr> dev <upstream>` is installed locally and the
/// matching host prefix is added as a `network` statement under
/// `router bgp <asn>`, so FRR announces it to its peers.
pub struct CommandBackend {
    config: Arc<RouteConfig>,
}

impl CommandBackend {
    pub fn new(config: Arc<RouteConfig>) -> Self {
        Self { config }
    }

    fn local_route(&self, action: Action, address: IpAddr) -> Step {
        let (verb, already_done) = match action {
            // `replace` succeeds whether or not the route already exists
            Action::Install => ("replace", None),
            Action::Withdraw => ("delete", Some(NO_SUCH_ROUTE)),
        };
        Step {
            program: self.config.ip_command.clone(),
            args: vec![
                "route".to_string(),
                verb.to_string(),
                address.to_string(),
                "dev".to_string(),
                self.config.upstream_interface.clone(),
            ],
            already_done,
        }
    }

    fn bgp_network(&self, action: Action, address: IpAddr) -> Step {
        let (family, prefix_len) = match address {
            IpAddr::V4(_) => ("ipv4", 32),
            IpAddr::V6(_) => ("ipv6", 128),
        };
        let (network, already_done) = match action {
            Action::Install => (format!("network {}/{}", address, prefix_len), None),
            Action::Withdraw => (
                format!("no network {}/{}", address, prefix_len),
                Some(NO_SUCH_NETWORK),
            ),
        };
        let commands = vec![
            "configure terminal".to_string(),
            format!("router bgp {}", self.config.asn),
            format!("address-family {} unicast", family),
            network,
        ];
        Step {
            program: self.config.vtysh_command.clone(),
            args: commands
                .into_iter()
                .flat_map(|c| vec!["-c".to_string(), c])
                .collect(),
            already_done,
        }
    }

    fn steps(&self, action: Action, address: IpAddr) -> Vec<Step> {
        let mut steps = vec![self.local_route(action, address)];
        if self.config.announce_bgp {
            steps.push(self.bgp_network(action, address));
        }
        steps
    }

    /// Run every step, even when an earlier one fails
    async fn apply(&self, action: Action, address: IpAddr) -> Result<(), RouteError> {
        let mut errors = Vec::new();
        for step in self.steps(action, address) {
            if let Err(err) = step.run().await {
                errors.push(err);
            }
        }
        RouteError::from_steps(errors)
    }
}

#[async_trait]
impl RouteBackend for CommandBackend {
    async fn install_route(&self, address: IpAddr) -> Result<(), RouteError> {
        self.apply(Action::Install, address).await
    }

    async fn withdraw_route(&self, address: IpAddr) -> Result<(), RouteError> {
        self.apply(Action::Withdraw, address).await
    }
}

impl fmt::Display for CommandBackend {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<CommandBackend dev={} asn={} bgp={}>",
            self.config.upstream_interface, self.config.asn, self.config.announce_bgp
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    fn config(ip_command: &str, vtysh_command: &str, announce_bgp: bool) -> Arc<RouteConfig> {
        Arc::new(RouteConfig {
            upstream_interface: "wg0".to_string(),
            asn: 64514,
            announce_bgp,
            ip_command: ip_command.to_string(),
            vtysh_command: vtysh_command.to_string(),
        })
    }

    /// Write an executable shell script that prints `stdout`/`stderr`
    /// and exits with `status`
    fn stub(name: &str, stdout: &str, stderr: &str, status: i32) -> String {
        let path: PathBuf =
            std::env::temp_dir().join(format!("wg2bgp-{}-{}", std::process::id(), name));
        let script = format!(
            "#!/bin/sh\necho \"{}\"\necho \"{}\" >&2\nexit {}\n",
            stdout, stderr, status
        );
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().to_string()
    }

    fn v4() -> IpAddr {
        IpAddr::from(Ipv4Addr::new(10, 1, 2, 3))
    }

    #[test]
    fn test_local_route_commands() {
        let backend = CommandBackend::new(config("ip", "vtysh", true));
        assert_eq!(
            backend.local_route(Action::Install, v4()).to_string(),
            "ip route replace 10.1.2.3 dev wg0"
        );
        assert_eq!(
            backend.local_route(Action::Withdraw, v4()).to_string(),
            "ip route delete 10.1.2.3 dev wg0"
        );
    }

    #[test]
    fn test_bgp_network_commands() {
        let backend = CommandBackend::new(config("ip", "vtysh", true));
        assert_eq!(
            backend.bgp_network(Action::Install, v4()).to_string(),
            "vtysh -c \"configure terminal\" -c \"router bgp 64514\" \
             -c \"address-family ipv4 unicast\" -c \"network 10.1.2.3/32\""
        );

        let v6 = IpAddr::from("3001:db8::10".parse::<Ipv6Addr>().unwrap());
        let step = backend.bgp_network(Action::Withdraw, v6);
        assert_eq!(step.args[5], "address-family ipv6 unicast");
        assert_eq!(step.args[7], "no network 3001:db8::10/128");
    }

    #[test]
    fn test_bgp_step_skipped_when_disabled() {
        let backend = CommandBackend::new(config("ip", "vtysh", false));
        let steps = backend.steps(Action::Install, v4());
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].program, "ip");
    }

    #[tokio::test]
    async fn test_successful_commands() {
        let backend = CommandBackend::new(config("true", "true", true));
        assert!(backend.install_route(v4()).await.is_ok());
        assert!(backend.withdraw_route(v4()).await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_step_is_reported() {
        let backend = CommandBackend::new(config("true", "false", true));
        match backend.install_route(v4()).await {
            Err(RouteError::Command(cmd, status, _)) => {
                assert!(cmd.starts_with("false -c"));
                assert!(!status.success());
            }
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_all_steps_attempted() {
        let backend = CommandBackend::new(config("false", "/nonexistent/vtysh", true));
        match backend.withdraw_route(v4()).await {
            Err(RouteError::Multiple(errors)) => {
                assert_eq!(errors.len(), 2);
                assert!(matches!(errors[0], RouteError::Command(..)));
                assert!(matches!(errors[1], RouteError::Spawn(..)));
            }
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_withdraw_missing_route_is_ok() {
        let ip = stub("ip-esrch", "", "RTNETLINK answers: No such process", 2);
        let vtysh = stub(
            "vtysh-missing",
            "% Can't find static route specified",
            "",
            1,
        );
        let backend = CommandBackend::new(config(&ip, &vtysh, true));
        assert!(backend.withdraw_route(v4()).await.is_ok());

        // The same output from an install is still a failure
        match backend.install_route(v4()).await {
            Err(RouteError::Multiple(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("Unexpected result: {:?}", other),
        }
        fs::remove_file(ip).unwrap();
        fs::remove_file(vtysh).unwrap();
    }

    #[tokio::test]
    async fn test_withdraw_other_failure_is_reported() {
        let ip = stub("ip-eperm", "", "RTNETLINK answers: Operation not permitted", 2);
        let backend = CommandBackend::new(config(&ip, "true", false));
        match backend.withdraw_route(v4()).await {
            Err(RouteError::Command(_, _, stderr)) => {
                assert!(stderr.contains("Operation not permitted"));
            }
            other => panic!("Unexpected result: {:?}", other),
        }
        fs::remove_file(ip).unwrap();
    }
}
