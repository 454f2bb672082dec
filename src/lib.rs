//! Courier - HTTP/1.1 response transmission engine
//!
//! Core library: the per-exchange listener state machine, the outbound write
//! path and the connection plumbing around it.

pub mod config;
pub mod error;
pub mod http;
pub mod server;
