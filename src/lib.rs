//! Tollgate - HTTPS-only edge listener
//!
//! Redirects every plain HTTP request to its `https` equivalent, except ACME
//! HTTP-01 challenges, which are relayed in cleartext to a backend reachable
//! only through an allow-list of network ranges.

pub mod config;
pub mod http;
pub mod proxy;
pub mod router;
pub mod server;
