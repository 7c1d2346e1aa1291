//! Startup configuration.
//!
//! Settings come from built-in defaults, an optional YAML file and the
//! command line / environment, later layers winning. Everything is
//! validated here; a [`Config`] that exists is ready to serve with.

use crate::proxy::dialer::{DEFAULT_CONNECT_TIMEOUT, DialPolicy};
use crate::proxy::guard::{AllowList, CidrError, IpCidr};
use crate::proxy::upstream::DEFAULT_REQUEST_TIMEOUT;
use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:80";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid listen address '{value}': {source}")]
    InvalidListenAddr {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("invalid backend cidr '{value}': {source}")]
    InvalidCidr {
        value: String,
        #[source]
        source: CidrError,
    },

    #[error("invalid upstream '{0}': expected host or host:port")]
    InvalidUpstream(String),

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Command line flags. Each can also be set through the environment.
#[derive(Debug, Default, Parser)]
#[command(name = "tollgate", version, about = "Redirects HTTP to HTTPS, relaying ACME HTTP-01 challenges")]
pub struct Cli {
    /// Address to listen on
    #[arg(long, env = "LISTEN")]
    pub listen: Option<String>,

    /// Backend CIDR range upstream connections may reach (repeatable)
    #[arg(long = "backend-cidr", env = "BACKEND_CIDR", value_delimiter = ',')]
    pub backend_cidrs: Vec<String>,

    /// Send challenges to this host:port instead of the request's Host
    #[arg(long, env = "UPSTREAM")]
    pub upstream: Option<String>,

    /// Seconds allowed to establish an upstream connection
    #[arg(long)]
    pub connect_timeout_secs: Option<u64>,

    /// Seconds allowed for the upstream to start responding
    #[arg(long)]
    pub request_timeout_secs: Option<u64>,

    /// Dial upstreams with their own address family instead of IPv6
    #[arg(long)]
    pub no_force_ipv6: bool,

    /// YAML configuration file
    #[arg(long, env = "TOLLGATE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Contents of the optional YAML configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub listen_addr: Option<String>,
    pub backend_cidrs: Vec<String>,
    pub upstream: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub force_ipv6: Option<bool>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }
}

/// Validated runtime configuration, fixed for the life of the process.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub allow_list: AllowList,
    /// Normalized `host:port`, when challenges go to a fixed backend.
    pub upstream: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub dial_policy: DialPolicy,
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConfig::from_path(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(file, cli)
    }

    /// Merges the file and command line layers and validates the result.
    pub fn resolve(file: FileConfig, cli: Cli) -> Result<Self, ConfigError> {
        let listen = cli
            .listen
            .or(file.listen_addr)
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = listen
            .trim()
            .parse()
            .map_err(|source| ConfigError::InvalidListenAddr {
                value: listen.clone(),
                source,
            })?;

        let allow_list = parse_cidrs(file.backend_cidrs.iter().chain(cli.backend_cidrs.iter()))?;

        let upstream = cli
            .upstream
            .or(file.upstream)
            .map(|u| normalize_upstream(&u))
            .transpose()?;

        let connect_timeout = timeout_secs(
            cli.connect_timeout_secs.or(file.connect_timeout_secs),
            DEFAULT_CONNECT_TIMEOUT,
            "connect timeout",
        )?;
        let request_timeout = timeout_secs(
            cli.request_timeout_secs.or(file.request_timeout_secs),
            DEFAULT_REQUEST_TIMEOUT,
            "request timeout",
        )?;

        let force_ipv6 = !cli.no_force_ipv6 && file.force_ipv6.unwrap_or(true);
        let dial_policy = if force_ipv6 {
            DialPolicy::ForceIpv6
        } else {
            DialPolicy::Native
        };

        Ok(Self {
            listen_addr,
            allow_list,
            upstream,
            connect_timeout,
            request_timeout,
            dial_policy,
        })
    }
}

/// Parses every entry, failing on the first invalid one.
pub fn parse_cidrs<'a>(values: impl IntoIterator<Item = &'a String>) -> Result<AllowList, ConfigError> {
    values
        .into_iter()
        .map(|value| {
            value
                .parse::<IpCidr>()
                .map_err(|source| ConfigError::InvalidCidr {
                    value: value.clone(),
                    source,
                })
        })
        .collect()
}

/// Turns `host` or `host:port` into `host:port`, defaulting to port 80.
fn normalize_upstream(value: &str) -> Result<String, ConfigError> {
    let invalid = || ConfigError::InvalidUpstream(value.to_string());
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.contains('/') || trimmed.contains('@') {
        return Err(invalid());
    }

    let url = url::Url::parse(&format!("http://{}", trimmed)).map_err(|_| invalid())?;
    let host = match url.host().ok_or_else(invalid)? {
        url::Host::Ipv6(ip) => format!("[{}]", ip),
        other => other.to_string(),
    };
    let port = url.port_or_known_default().unwrap_or(80);
    Ok(format!("{}:{}", host, port))
}

fn timeout_secs(
    value: Option<u64>,
    default: Duration,
    name: &'static str,
) -> Result<Duration, ConfigError> {
    match value {
        Some(0) => Err(ConfigError::ZeroTimeout(name)),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => Ok(default),
    }
}
