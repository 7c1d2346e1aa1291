use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;

use crate::http::parser::{ParseError, parse_http_request};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::writer::ResponseWriter;
use crate::router::{RouteOutcome, Router};

pub struct Connection<S = TcpStream> {
    stream: S,
    buffer: Vec<u8>,
    router: Arc<Router>,
    state: ConnectionState,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing(RouteOutcome, bool), // bool = client asked for keep-alive
    Rejecting(ParseError),
    Closed,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, router: Arc<Router>) -> Self {
        Self {
            stream,
            buffer: Vec::with_capacity(4096),
            router,
            state: ConnectionState::Reading,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Reading => {
                    self.state = match self.read_request().await? {
                        Ok(Some(req)) => ConnectionState::Processing(req),
                        Ok(None) => ConnectionState::Closed,
                        Err(e) => ConnectionState::Rejecting(e),
                    };
                }

                ConnectionState::Processing(req) => {
                    let keep_alive = req.keep_alive();
                    let outcome = self.router.route(req).await;
                    self.state = ConnectionState::Writing(outcome, keep_alive);
                }

                ConnectionState::Writing(outcome, keep_alive) => {
                    let reusable = outcome.write_to(&mut self.stream).await?;

                    self.state = if keep_alive && reusable {
                        ConnectionState::Reading
                    } else {
                        ConnectionState::Closed
                    };
                }

                ConnectionState::Rejecting(e) => {
                    tracing::debug!(error = %e, "rejecting malformed request");
                    ResponseWriter::new(&Response::bad_request())
                        .write_to_stream(&mut self.stream)
                        .await?;
                    self.state = ConnectionState::Closed;
                }

                ConnectionState::Closed => {
                    break;
                }
            }
        }

        Ok(())
    }

    /// Reads the next request.
    ///
    /// The outer error is an I/O failure; the inner one a malformed request.
    /// `Ok(Ok(None))` means the client closed the connection.
    pub async fn read_request(&mut self) -> anyhow::Result<Result<Option<Request>, ParseError>> {
        loop {
            match parse_http_request(&self.buffer) {
                Ok((request, consumed)) => {
                    self.buffer.drain(..consumed);
                    return Ok(Ok(Some(request)));
                }

                Err(ParseError::Incomplete) => {
                    // Need more data
                }

                Err(e) => {
                    return Ok(Err(e));
                }
            }

            let mut temp = [0u8; 4096];
            let n = self.stream.read(&mut temp).await?;

            if n == 0 {
                // Client closed connection
                return Ok(Ok(None));
            }

            self.buffer.extend_from_slice(&temp[..n]);
        }
    }
}
