//! Request routing: redirect to HTTPS, or relay ACME challenges.
//!
//! Every inbound request takes exactly one of two routes. Paths under
//! `/.well-known/acme-challenge` are forwarded upstream and the response
//! relayed verbatim; everything else gets a `308 Permanent Redirect` to the
//! same URL under `https`. The choice is made once, by [`route_for`], and
//! each route produces exactly one [`RouteOutcome`].

use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::writer::{ResponseWriter, serialize_head};
use crate::proxy::upstream::{Forwarder, UpstreamResponse};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, error};

/// The two ways a request can be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Forward,
    Redirect,
}

/// Picks the route for a request from its path alone.
pub fn route_for(request: &Request) -> Route {
    if request.is_acme_challenge() {
        Route::Forward
    } else {
        Route::Redirect
    }
}

/// The single response produced for a request.
#[derive(Debug)]
pub enum RouteOutcome {
    /// A redirect generated locally.
    Redirect(Response),
    /// An upstream response to relay.
    Relay(UpstreamResponse),
    /// A locally generated error (`502` after a failed forward, or `400`
    /// when no redirect URL can be formed).
    Failed(Response),
}

impl RouteOutcome {
    /// Writes the outcome to the client.
    ///
    /// Returns whether the connection can carry another request. An error
    /// means the client could not be written to at all. A failure while
    /// streaming a relayed body is logged and ends the connection, since
    /// the status and headers have already gone out.
    pub async fn write_to<W>(self, stream: &mut W) -> anyhow::Result<bool>
    where
        W: AsyncWrite + Unpin,
    {
        match self {
            RouteOutcome::Redirect(response) => {
                ResponseWriter::new(&response).write_to_stream(stream).await?;
                Ok(true)
            }
            RouteOutcome::Failed(response) => {
                ResponseWriter::new(&response).write_to_stream(stream).await?;
                Ok(false)
            }
            RouteOutcome::Relay(upstream) => relay(upstream, stream).await,
        }
    }
}

async fn relay<W>(upstream: UpstreamResponse, stream: &mut W) -> anyhow::Result<bool>
where
    W: AsyncWrite + Unpin,
{
    // A relayed `Connection: close` must be honored on the client side too.
    let reusable =
        !upstream.is_close_delimited() && !upstream.headers.has_token("Connection", "close");
    let declared = upstream.content_length();
    let UpstreamResponse {
        status,
        headers,
        body,
    } = upstream;

    stream.write_all(&serialize_head(status, &headers)).await?;

    if let Some(mut body) = body {
        let copied = match tokio::io::copy(&mut body, stream).await {
            Ok(copied) => copied,
            Err(e) => {
                error!(error = %e, "failed to write response from upstream to client");
                return Ok(false);
            }
        };
        if let Some(expected) = declared.filter(|&expected| copied < expected) {
            error!(copied, expected, "upstream body shorter than its Content-Length");
            return Ok(false);
        }
    }

    stream.flush().await?;
    Ok(reusable)
}

/// Routes requests, forwarding ACME challenges through a [`Forwarder`].
pub struct Router {
    forwarder: Arc<dyn Forwarder>,
}

impl Router {
    pub fn new(forwarder: Arc<dyn Forwarder>) -> Self {
        Self { forwarder }
    }

    /// Handles one request and returns the response to send.
    pub async fn route(&self, request: Request) -> RouteOutcome {
        let route = route_for(&request);
        debug!(method = %request.method, path = %request.path(), ?route, "routing request");

        match route {
            Route::Forward => self.forward(request).await,
            Route::Redirect => redirect(&request),
        }
    }

    async fn forward(&self, request: Request) -> RouteOutcome {
        let method = request.method.clone();
        let path = request.path().to_string();

        match self.forwarder.forward(request).await {
            Ok(upstream) => RouteOutcome::Relay(upstream),
            Err(e) => {
                error!(%method, %path, error = %e, "failed to send request to upstream");
                RouteOutcome::Failed(Response::bad_gateway())
            }
        }
    }
}

/// Builds the `308` response pointing at the `https` form of the request URL.
fn redirect(request: &Request) -> RouteOutcome {
    match https_url(request) {
        Some(location) => RouteOutcome::Redirect(Response::permanent_redirect(&location)),
        None => {
            debug!(request_target = %request.target, "cannot build redirect without a host");
            RouteOutcome::Failed(Response::bad_request())
        }
    }
}

/// The request URL with its scheme replaced by `https`.
///
/// Host, port, path and query are copied byte for byte; nothing is
/// normalized. Origin-form targets are joined to the `Host` header.
/// Returns `None` when no host is known.
pub fn https_url(request: &Request) -> Option<String> {
    if let Some((_, rest)) = request.absolute_form() {
        return Some(format!("https://{}", rest));
    }

    let target = request.target.as_str();
    if target.starts_with('/') {
        return Some(format!("https://{}{}", request.host()?, target));
    }

    // Authority-form (CONNECT) or asterisk-form.
    let authority = request
        .host()
        .or_else(|| (!target.is_empty() && target != "*").then_some(target))?;
    Some(format!("https://{}", authority))
}
