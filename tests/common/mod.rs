//! Shared test helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Mutex;
use tollgate::http::headers::HeaderMap;
use tollgate::http::request::{Method, Request, RequestBuilder};
use tollgate::http::response::StatusCode;
use tollgate::proxy::{ForwardError, Forwarder, GuardError, UpstreamResponse};

/// What the mock returns on each call.
#[derive(Clone)]
pub enum Reply {
    Ok {
        status: u16,
        headers: Vec<(&'static str, &'static str)>,
        body: Option<&'static [u8]>,
    },
    Refused,
}

/// A forwarder that records every request it is given.
pub struct MockForwarder {
    pub calls: Mutex<Vec<Request>>,
    reply: Reply,
}

impl MockForwarder {
    pub fn new(reply: Reply) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            reply,
        }
    }

    pub fn ok(status: u16) -> Self {
        Self::new(Reply::Ok {
            status,
            headers: vec![],
            body: None,
        })
    }

    pub fn refused() -> Self {
        Self::new(Reply::Refused)
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Forwarder for MockForwarder {
    async fn forward(&self, request: Request) -> Result<UpstreamResponse, ForwardError> {
        self.calls.lock().unwrap().push(request);

        match &self.reply {
            Reply::Ok {
                status,
                headers,
                body,
            } => {
                let headers: HeaderMap = headers.iter().copied().collect();
                let body = body.map(|b| {
                    Box::pin(std::io::Cursor::new(b.to_vec())) as tollgate::proxy::UpstreamBody
                });
                Ok(UpstreamResponse::new(
                    StatusCode::from_u16(*status).unwrap(),
                    headers,
                    body,
                ))
            }
            Reply::Refused => Err(GuardError::NotPermitted("192.168.1.1:80".to_string()).into()),
        }
    }
}

pub fn get(target: &str, host: &str) -> Request {
    RequestBuilder::new()
        .method(Method::GET)
        .target(target)
        .header("Host", host)
        .build()
        .unwrap()
}
