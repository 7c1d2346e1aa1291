//! Outbound connection establishment.
//!
//! [`GuardedDialer`] is the only place the crate opens upstream TCP
//! connections. Each attempt is checked by the [`EgressGuard`] against the
//! address as resolved, then dialed according to the [`DialPolicy`] and
//! bounded by a connect timeout.

use crate::proxy::error::ForwardError;
use crate::proxy::guard::EgressGuard;
use std::net::{SocketAddr, SocketAddrV6};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::timeout;

/// Default bound on establishing an upstream connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Which IP family outbound sockets use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialPolicy {
    /// Always dial over an IPv6 socket. IPv4 destinations are reached
    /// through their IPv4-mapped form (`::ffff:a.b.c.d`).
    #[default]
    ForceIpv6,
    /// Dial with the family of the destination address.
    Native,
}

impl DialPolicy {
    /// The socket address actually passed to `connect`.
    pub fn dial_addr(&self, addr: SocketAddr) -> SocketAddr {
        match (self, addr) {
            (DialPolicy::ForceIpv6, SocketAddr::V4(v4)) => SocketAddr::V6(SocketAddrV6::new(
                v4.ip().to_ipv6_mapped(),
                v4.port(),
                0,
                0,
            )),
            _ => addr,
        }
    }
}

/// Opens guarded upstream connections.
#[derive(Debug, Clone)]
pub struct GuardedDialer {
    guard: Arc<EgressGuard>,
    policy: DialPolicy,
    connect_timeout: Duration,
}

impl GuardedDialer {
    pub fn new(guard: Arc<EgressGuard>, policy: DialPolicy, connect_timeout: Duration) -> Self {
        Self {
            guard,
            policy,
            connect_timeout,
        }
    }

    /// Connects to `addr` if the guard permits it.
    ///
    /// The guard sees the original address; the family translation of the
    /// dial policy is applied only afterwards.
    pub async fn dial(&self, addr: SocketAddr) -> Result<TcpStream, ForwardError> {
        if let Err(e) = self.guard.check(&guard_target(addr)) {
            tracing::warn!(%addr, error = %e, "refusing to dial upstream");
            return Err(e.into());
        }

        let dial_addr = self.policy.dial_addr(addr);
        let socket = match dial_addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(|source| ForwardError::Connect { addr, source })?;

        tracing::debug!(%addr, %dial_addr, "dialing upstream");

        let stream = timeout(self.connect_timeout, socket.connect(dial_addr))
            .await
            .map_err(|_| ForwardError::Timeout("connecting to upstream"))?
            .map_err(|source| ForwardError::Connect { addr, source })?;

        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// The `ip:port` string presented to the guard. IPv6 zone ids are left
/// out since the guard only judges the address itself.
fn guard_target(addr: SocketAddr) -> String {
    SocketAddr::new(addr.ip(), addr.port()).to_string()
}
