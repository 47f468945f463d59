mod command;
#[cfg(test)]
pub(crate) mod mock;

pub use command::CommandBackend;

use std::error;
use std::fmt;
use std::io;
use std::net::IpAddr;
use std::process::ExitStatus;

use async_trait::async_trait;

/// Installs and withdraws the route for a single host address
///
/// Both operations must be idempotent: installing an installed route or
/// withdrawing a missing one must leave the external state unchanged.
#[async_trait]
pub trait RouteBackend: Send + Sync {
    async fn install_route(&self, address: IpAddr) -> Result<(), RouteError>;
    async fn withdraw_route(&self, address: IpAddr) -> Result<(), RouteError>;
}

#[derive(Debug)]
pub enum RouteError {
    /// Command could not be started. [command, reason]
    Spawn(String, io::Error),
    /// Command ran but exited unsuccessfully. [command, status, stderr]
    Command(String, ExitStatus, String),
    /// More than one step of an operation failed
    Multiple(Vec<RouteError>),
    /// Some other issue happened. [reason]
    Other(String),
}

impl RouteError {
    /// Fold the errors from each step of an operation into a single result
    pub fn from_steps(mut errors: Vec<RouteError>) -> Result<(), RouteError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(RouteError::Multiple(errors)),
        }
    }
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use RouteError::*;
        match self {
            Spawn(cmd, err) => write!(f, "Unable to run '{}': {}", cmd, err),
            Command(cmd, status, stderr) => {
                write!(f, "'{}' failed ({})", cmd, status)?;
                if !stderr.is_empty() {
                    write!(f, ": {}", stderr)?;
                }
                Ok(())
            }
            Multiple(errors) => {
                let messages: Vec<_> = errors.iter().map(|e| e.to_string()).collect();
                write!(f, "{}", messages.join("; "))
            }
            Other(r) => write!(f, "{}", r),
        }
    }
}

impl error::Error for RouteError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            RouteError::Spawn(_, err) => Some(err),
            _ => None,
        }
    }
}
