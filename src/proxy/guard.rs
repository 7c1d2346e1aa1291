//! Egress allow-list enforcement.
//!
//! Every outbound connection the forwarder opens is first presented to an
//! [`EgressGuard`] as an `ip:port` string. The guard parses it and accepts
//! the dial only if the IP lies inside one of the configured [`IpCidr`]
//! ranges. The guard never resolves names: by the time a dial is proposed
//! the address must already be numeric.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use thiserror::Error;

/// Why a CIDR string could not be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CidrError {
    #[error("missing '/<prefix>'")]
    MissingPrefix,
    #[error("invalid IP address '{0}'")]
    InvalidAddress(String),
    #[error("invalid prefix length '{0}'")]
    InvalidPrefix(String),
}

/// Why a dial attempt was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GuardError {
    #[error("address {0}: expected host:port")]
    InvalidAddress(String),
    #[error("{0} is not a valid IP address")]
    InvalidIp(String),
    #[error("{0} is not within an allowed backend cidr")]
    NotPermitted(String),
}

/// A network prefix such as `10.0.0.0/8` or `fd00::/8`.
///
/// The stored network address has its host bits cleared, so
/// `10.1.2.3/8` and `10.0.0.0/8` describe the same range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpCidr {
    network: IpAddr,
    prefix: u8,
}

impl IpCidr {
    pub fn new(addr: IpAddr, prefix: u8) -> Result<Self, CidrError> {
        let network = match addr {
            IpAddr::V4(v4) => {
                if prefix > 32 {
                    return Err(CidrError::InvalidPrefix(prefix.to_string()));
                }
                IpAddr::V4(Ipv4Addr::from(u32::from(v4) & v4_mask(prefix)))
            }
            IpAddr::V6(v6) => {
                if prefix > 128 {
                    return Err(CidrError::InvalidPrefix(prefix.to_string()));
                }
                IpAddr::V6(Ipv6Addr::from(u128::from(v6) & v6_mask(prefix)))
            }
        };
        Ok(Self { network, prefix })
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Tests whether `ip` falls inside this range.
    ///
    /// IPv4 addresses and their IPv4-mapped IPv6 form (`::ffff:a.b.c.d`)
    /// are treated as the same address, whichever family the range is
    /// written in.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => v4_in(net, self.prefix, ip),
            (IpAddr::V4(net), IpAddr::V6(ip)) => ip
                .to_ipv4_mapped()
                .is_some_and(|ip| v4_in(net, self.prefix, ip)),
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                u128::from(ip) & v6_mask(self.prefix) == u128::from(net)
            }
            (IpAddr::V6(net), IpAddr::V4(ip)) => {
                u128::from(ip.to_ipv6_mapped()) & v6_mask(self.prefix) == u128::from(net)
            }
        }
    }
}

fn v4_in(net: Ipv4Addr, prefix: u8, ip: Ipv4Addr) -> bool {
    u32::from(ip) & v4_mask(prefix) == u32::from(net)
}

fn v4_mask(prefix: u8) -> u32 {
    u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0)
}

fn v6_mask(prefix: u8) -> u128 {
    u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0)
}

impl FromStr for IpCidr {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s.trim().split_once('/').ok_or(CidrError::MissingPrefix)?;
        let addr: IpAddr = addr
            .parse()
            .map_err(|_| CidrError::InvalidAddress(addr.to_string()))?;
        if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CidrError::InvalidPrefix(prefix.to_string()));
        }
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| CidrError::InvalidPrefix(prefix.to_string()))?;
        IpCidr::new(addr, prefix)
    }
}

impl fmt::Display for IpCidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// The set of ranges outbound connections may reach.
///
/// Built once from configuration and never modified afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    ranges: Vec<IpCidr>,
}

impl AllowList {
    pub fn new(ranges: Vec<IpCidr>) -> Self {
        Self { ranges }
    }

    /// Returns the first range containing `ip`.
    pub fn find(&self, ip: IpAddr) -> Option<&IpCidr> {
        self.ranges.iter().find(|range| range.contains(ip))
    }

    pub fn ranges(&self) -> &[IpCidr] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl FromIterator<IpCidr> for AllowList {
    fn from_iter<I: IntoIterator<Item = IpCidr>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Gate consulted before every outbound dial.
#[derive(Debug, Clone)]
pub struct EgressGuard {
    allowed: AllowList,
}

impl EgressGuard {
    pub fn new(allowed: AllowList) -> Self {
        Self { allowed }
    }

    /// Decides whether a connection to `address` (`host:port`) may be made.
    ///
    /// Returns the parsed IP on success. The host must be an IP literal;
    /// IPv6 literals must be bracketed.
    pub fn check(&self, address: &str) -> Result<IpAddr, GuardError> {
        let (host, _port) = split_host_port(address)
            .ok_or_else(|| GuardError::InvalidAddress(address.to_string()))?;

        let ip: IpAddr = host
            .parse()
            .map_err(|_| GuardError::InvalidIp(host.to_string()))?;

        match self.allowed.find(ip) {
            Some(range) => {
                tracing::debug!(%ip, %range, "dial permitted");
                Ok(ip)
            }
            None => Err(GuardError::NotPermitted(address.to_string())),
        }
    }
}

/// Splits `host:port` or `[v6]:port`. The port must be numeric.
pub fn split_host_port(address: &str) -> Option<(&str, u16)> {
    let (host, port) = if let Some(rest) = address.strip_prefix('[') {
        let (host, rest) = rest.split_once(']')?;
        (host, rest.strip_prefix(':')?)
    } else {
        let (host, port) = address.rsplit_once(':')?;
        if host.contains(':') {
            // Unbracketed IPv6 literal.
            return None;
        }
        (host, port)
    };

    if host.is_empty() || port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((host, port.parse().ok()?))
}
