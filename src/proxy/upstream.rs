//! Upstream connection and request forwarding
//!
//! This module defines the [`Forwarder`] capability the router relies on and
//! [`HttpForwarder`], its HTTP/1.1 implementation. The forwarder writes the
//! inbound request to the upstream unchanged apart from hop-by-hop headers,
//! reads the response head and hands the body back as a stream.

use crate::http::headers::HeaderMap;
use crate::http::parser::{ResponseHead, parse_response_head};
use crate::http::request::{Method, Request};
use crate::http::response::StatusCode;
use crate::proxy::dialer::GuardedDialer;
use crate::proxy::error::ForwardError;
use async_trait::async_trait;
use bytes::BytesMut;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Default buffer size for reading upstream responses
const BUFFER_SIZE: usize = 8192;

/// Default bound on sending a request and receiving the response head.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Port used when an authority does not name one.
const DEFAULT_HTTP_PORT: u16 = 80;

/// Headers that describe a single connection and are never relayed.
const HOP_BY_HOP: &[&str] = &[
    "Connection",
    "Keep-Alive",
    "Proxy-Connection",
    "TE",
    "Trailer",
    "Transfer-Encoding",
    "Upgrade",
];

/// A streaming response body.
pub type UpstreamBody = Pin<Box<dyn AsyncRead + Send>>;

/// A response received from the upstream.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// `None` when the response has no body.
    pub body: Option<UpstreamBody>,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Option<UpstreamBody>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// The declared Content-Length, if present and valid. A chunked body
    /// has no declared length even if the header is present.
    pub fn content_length(&self) -> Option<u64> {
        if self.headers.has_token("Transfer-Encoding", "chunked") {
            return None;
        }
        self.headers
            .get("Content-Length")
            .and_then(|v| v.trim().parse().ok())
    }

    /// True when the body runs until the upstream closes, so the client
    /// connection must be closed after relaying it.
    pub fn is_close_delimited(&self) -> bool {
        self.body.is_some()
            && !self.headers.contains("Content-Length")
            && !self.headers.has_token("Transfer-Encoding", "chunked")
    }
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Something that can perform an HTTP round trip.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Sends `request` upstream and returns the response or an error.
    async fn forward(&self, request: Request) -> Result<UpstreamResponse, ForwardError>;
}

/// Forwards requests over fresh, guarded HTTP/1.1 connections.
///
/// Each request opens its own connection and asks the upstream to close it
/// afterwards, so every forward passes through the egress guard.
pub struct HttpForwarder {
    dialer: GuardedDialer,

    /// Fixed `host:port` to send every request to. When `None`, the
    /// request's own Host is used.
    upstream: Option<String>,

    /// Bound on writing the request and reading the response head.
    request_timeout: Duration,
}

impl HttpForwarder {
    pub fn new(dialer: GuardedDialer, upstream: Option<String>, request_timeout: Duration) -> Self {
        Self {
            dialer,
            upstream,
            request_timeout,
        }
    }

    /// The `host:port` a request will be sent to.
    pub fn authority_for(&self, request: &Request) -> Result<String, ForwardError> {
        let authority = match &self.upstream {
            Some(upstream) => upstream.clone(),
            None => request
                .url()
                .and_then(|url| {
                    let host = url.host_str()?.to_string();
                    let port = url.port_or_known_default().unwrap_or(DEFAULT_HTTP_PORT);
                    Some(format!("{}:{}", host, port))
                })
                .ok_or(ForwardError::MissingAuthority)?,
        };
        Ok(authority)
    }

    /// Resolves the authority and connects to the first permitted address.
    async fn connect(&self, authority: &str) -> Result<TcpStream, ForwardError> {
        let addrs: Vec<_> = tokio::net::lookup_host(authority)
            .await
            .map_err(|source| ForwardError::Resolve {
                authority: authority.to_string(),
                source,
            })?
            .collect();

        let mut last_error = None;
        for addr in addrs {
            match self.dialer.dial(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| ForwardError::NoAddresses(authority.to_string())))
    }

    /// Encodes `request` for the upstream.
    ///
    /// Method, target, headers and body are passed through. Hop-by-hop
    /// headers are dropped and `Connection: close` is added. A Host header
    /// is only added when the client sent none.
    pub fn build_http_request(&self, request: &Request, authority: &str) -> Vec<u8> {
        let mut buffer = Vec::new();

        // Request line
        let target = if request.target.is_empty() {
            "/"
        } else {
            &request.target
        };
        buffer.extend_from_slice(
            format!("{} {} HTTP/1.1\r\n", request.method, target).as_bytes(),
        );

        // Headers named by Connection are hop-by-hop too.
        let listed: Vec<String> = request
            .headers
            .get_all("Connection")
            .flat_map(|v| v.split(','))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        let mut headers = HeaderMap::new();
        for (key, value) in request.headers.iter() {
            let hop = HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(key))
                || listed.iter().any(|h| h.eq_ignore_ascii_case(key));
            if !hop {
                headers.append(key, value);
            }
        }

        if !headers.contains("Host") {
            headers.append("Host", authority);
        }
        headers.append("Connection", "close");

        for (key, value) in headers.iter() {
            buffer.extend_from_slice(format!("{}: {}\r\n", key, value).as_bytes());
        }

        // End of headers
        buffer.extend_from_slice(b"\r\n");

        if !request.body.is_empty() {
            buffer.extend_from_slice(&request.body);
        }

        buffer
    }

    async fn exchange(
        &self,
        mut stream: TcpStream,
        request: &Request,
        authority: &str,
    ) -> Result<UpstreamResponse, ForwardError> {
        let request_bytes = self.build_http_request(request, authority);
        stream.write_all(&request_bytes).await?;
        stream.flush().await?;

        tracing::trace!("request sent to upstream");

        let (head, leftover) = read_response_head(&mut stream).await?;
        let body = response_body(&request.method, &head, leftover, stream);

        Ok(UpstreamResponse::new(head.status, head.headers, body))
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, request: Request) -> Result<UpstreamResponse, ForwardError> {
        let authority = self.authority_for(&request)?;

        tracing::debug!(
            method = %request.method,
            path = %request.path(),
            upstream = %authority,
            "forwarding request"
        );

        let stream = self.connect(&authority).await?;

        timeout(self.request_timeout, self.exchange(stream, &request, &authority))
            .await
            .map_err(|_| ForwardError::Timeout("waiting for upstream response"))?
    }
}

/// Reads until a complete, final response head is buffered.
///
/// Interim `1xx` responses other than `101` are skipped. Returns the head
/// and any body bytes read past it.
async fn read_response_head(
    stream: &mut TcpStream,
) -> Result<(ResponseHead, BytesMut), ForwardError> {
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

    loop {
        match parse_response_head(&buffer) {
            Ok((head, consumed)) => {
                let _ = buffer.split_to(consumed);
                let status = head.status.as_u16();
                if (100..200).contains(&status) && status != 101 {
                    continue;
                }
                return Ok((head, buffer));
            }
            Err(crate::http::parser::ParseError::Incomplete) => {}
            Err(e) => return Err(e.into()),
        }

        let n = stream.read_buf(&mut buffer).await?;
        if n == 0 {
            return Err(ForwardError::UpstreamClosed);
        }
    }
}

/// Builds the body stream for a response, or `None` if it has no body.
///
/// Content-Length bodies are cut to their declared length. Chunked and
/// close-delimited bodies are relayed raw until the upstream closes.
fn response_body(
    method: &Method,
    head: &ResponseHead,
    leftover: BytesMut,
    stream: TcpStream,
) -> Option<UpstreamBody> {
    if *method == Method::HEAD || head.status.is_bodyless() {
        return None;
    }

    let reader = std::io::Cursor::new(leftover.freeze()).chain(stream);

    if head.is_chunked() {
        return Some(Box::pin(reader));
    }

    match head.content_length() {
        Some(0) => None,
        Some(len) => Some(Box::pin(reader.take(len))),
        None => Some(Box::pin(reader)),
    }
}
