//! Errors raised while forwarding a request upstream.
//!
//! Every variant collapses into the same outcome for the caller (a
//! `502 Bad Gateway`); the distinction only matters for diagnostics.

use crate::http::parser::ParseError;
use crate::proxy::guard::GuardError;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForwardError {
    /// The request carried no Host and no upstream is configured.
    #[error("no upstream authority for request")]
    MissingAuthority,

    /// The upstream authority could not be resolved.
    #[error("failed to resolve '{authority}': {source}")]
    Resolve {
        authority: String,
        #[source]
        source: std::io::Error,
    },

    /// Resolution succeeded but returned no addresses.
    #[error("'{0}' resolved to no addresses")]
    NoAddresses(String),

    /// The egress guard refused the destination.
    #[error("dial refused: {0}")]
    Rejected(#[from] GuardError),

    /// The TCP connection could not be established.
    #[error("failed to connect to upstream {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out {0}")]
    Timeout(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The upstream sent something that is not an HTTP response.
    #[error("invalid upstream response: {0}")]
    Protocol(#[from] ParseError),

    #[error("upstream closed the connection before a response was received")]
    UpstreamClosed,
}

impl ForwardError {
    /// True when the egress guard, not the network, caused the failure.
    pub fn is_rejected(&self) -> bool {
        matches!(self, ForwardError::Rejected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_error_names_destination() {
        let err: ForwardError = GuardError::NotPermitted("192.168.1.1:80".to_string()).into();
        assert!(err.is_rejected());
        assert!(err.to_string().contains("192.168.1.1:80"));
    }
}
