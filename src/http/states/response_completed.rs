use crate::http::request::Request;

/// Terminal state: the response has been fully handled, successfully or not.
pub struct ResponseCompleted {
    request: Request,
}

impl ResponseCompleted {
    pub fn new(request: Request) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn handle_abrupt_channel_closure(&mut self) {
        tracing::debug!(path = %self.request.path, "Remote client closed the connection after the response");
    }

    pub fn handle_idle_timeout(&mut self) {
        tracing::debug!(path = %self.request.path, "Idle timeout after the response completed");
    }
}
