//! Upstream forwarding and egress control
//!
//! This module implements the forwarding side of the listener: the
//! [`Forwarder`] capability, its HTTP implementation, the dialer that opens
//! upstream connections and the guard that decides which destinations it
//! may reach.

pub mod dialer;
pub mod error;
pub mod guard;
pub mod upstream;

pub use dialer::{DialPolicy, GuardedDialer};
pub use error::ForwardError;
pub use guard::{AllowList, EgressGuard, GuardError, IpCidr};
pub use upstream::{Forwarder, HttpForwarder, UpstreamBody, UpstreamResponse};
