//! Instrumentation hooks for the exchange lifecycle.

use crate::http::request::Request;
use crate::http::response::Response;

/// Receives lifecycle events of every exchange on a connection.
///
/// Passed explicitly through [`ExchangeContext`](crate::http::states::ExchangeContext);
/// all methods default to doing nothing.
pub trait ResponseObserver: Send + Sync {
    /// A request head has been read.
    fn request_received(&self, _request: &Request) {}

    /// The final write of a response has been issued.
    fn response_sending(&self, _response: &Response) {}
}
