//! HTTP protocol implementation.
//!
//! This module implements an HTTP/1.1 server with keep-alive connections and
//! a response write path that either consolidates a body into a single
//! `Content-Length` message or streams it with chunked transfer encoding.
//!
//! # Architecture
//!
//! - **`connection`**: Per-connection loop (read, process, write, repeat)
//! - **`parser`**: Parses incoming HTTP requests from byte buffers
//! - **`request`** / **`response`**: Request model and response envelope
//! - **`service`**: Application hook producing a reply for each request
//! - **`states`**: Per-exchange listener state machine, including the
//!   response body transmission state
//! - **`chunk`**: Owned-once body chunks and the zero-copy composite buffer
//! - **`channel`**: Ordered asynchronous write queue in front of the socket
//! - **`writer`**: Wire encoding of response heads and body frames
//! - **`status`**: Exactly-once outcome of each response
//! - **`observer`**: Optional instrumentation hooks
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Wait for incoming request data
//!        └──────┬──────┘
//!               │ Request received
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← Run the service, feed body chunks
//!        └──────┬───────────┘
//!               │ Final chunk handed over
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Wait for the final write to complete
//!        └──────┬───────────┘
//!               │ Response status notified
//!               ├─ Keep-Alive → Reading (same connection)
//!               └─ Close → Closed
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use courier::config::Config;
//! use courier::http::connection::Connection;
//! use courier::http::service::Hello;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cfg = Config::load();
//!     let listener = TcpListener::bind(&cfg.listen_addr).await?;
//!
//!     loop {
//!         let (socket, _addr) = listener.accept().await?;
//!         let mut conn = Connection::new(socket, &cfg, Arc::new(Hello));
//!         tokio::spawn(async move {
//!             if let Err(e) = conn.run().await {
//!                 eprintln!("Connection error: {}", e);
//!             }
//!         });
//!     }
//! }
//! ```

pub mod channel;
pub mod chunk;
pub mod connection;
pub mod observer;
pub mod parser;
pub mod request;
pub mod response;
pub mod service;
pub mod states;
pub mod status;
pub mod writer;
