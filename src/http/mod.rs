//! HTTP protocol implementation.
//!
//! A small HTTP/1.1 server side with keep-alive support, plus the pieces the
//! forwarder needs to talk to an upstream.
//!
//! # Architecture
//!
//! - **`connection`**: per-connection request/response state machine
//! - **`headers`**: ordered, multi-valued header storage
//! - **`parser`**: parses requests and upstream response heads from byte buffers
//! - **`request`**: HTTP request representation
//! - **`response`**: status codes and locally generated responses
//! - **`writer`**: serializes responses to the client
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Wait for incoming request data
//!        └──────┬──────┘
//!               │ Request received          Malformed request
//!               ▼                           ──────────────────► Rejecting (400) → Closed
//!        ┌──────────────────┐
//!        │   Processing     │ ← Route: redirect or forward
//!        └──────┬───────────┘
//!               │ Outcome ready
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Send or relay response to client
//!        └──────┬───────────┘
//!               │ Response sent
//!               ├─ Keep-Alive → Reading (same connection)
//!               └─ Close → Closed
//! ```

pub mod connection;
pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
