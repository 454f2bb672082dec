//! Application-facing request handling.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder, StatusCode};

/// A response body as produced by the application.
pub enum Body {
    /// The complete body, known up front.
    Full(Bytes),
    /// A body produced incrementally. The body ends when the sender is dropped.
    Stream(mpsc::Receiver<Bytes>),
}

/// What a [`Service`] answers with.
pub struct Reply {
    pub response: Response,
    pub body: Body,
}

impl Reply {
    /// A reply with a complete body. The body length is declared on the
    /// response so the write path sends it in one piece.
    pub fn full(mut response: Response, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        response.set_content_length(body.len() as u64);
        Self {
            response,
            body: Body::Full(body),
        }
    }

    /// A reply whose body arrives through `rx`.
    pub fn stream(response: Response, rx: mpsc::Receiver<Bytes>) -> Self {
        Self {
            response,
            body: Body::Stream(rx),
        }
    }

    /// A 200 OK plain-text reply.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        let response = ResponseBuilder::new(StatusCode::Ok)
            .header("Content-Type", "text/plain")
            .build();
        Self::full(response, body)
    }

    pub fn not_found() -> Self {
        Self::full(Response::new(StatusCode::NotFound), "404 Not Found")
    }

    pub fn internal_error() -> Self {
        Self::full(
            Response::new(StatusCode::InternalServerError),
            "500 Internal Server Error",
        )
    }
}

/// Produces a reply for each request.
pub trait Service: Send + Sync + 'static {
    fn call(&self, request: &Request) -> Reply;
}

impl<F> Service for F
where
    F: Fn(&Request) -> Reply + Send + Sync + 'static,
{
    fn call(&self, request: &Request) -> Reply {
        self(request)
    }
}

/// Default service of the binary.
pub struct Hello;

impl Service for Hello {
    fn call(&self, request: &Request) -> Reply {
        match request.path.as_str() {
            "/" => Reply::ok("Hello from courier\n"),
            "/stream" => {
                let (tx, rx) = mpsc::channel(4);
                tokio::spawn(async move {
                    for line in ["streaming ", "from ", "courier\n"] {
                        if tx.send(Bytes::from_static(line.as_bytes())).await.is_err() {
                            break;
                        }
                    }
                });
                Reply::stream(Response::new(StatusCode::Ok), rx)
            }
            _ => Reply::not_found(),
        }
    }
}
