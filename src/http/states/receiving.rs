use bytes::Bytes;

use crate::http::request::Request;
use crate::http::states::{ExchangeContext, ListenerState, SendingHeaders};

/// Initial state of an exchange: waiting for a request head.
pub struct ReceivingHeaders {
    ctx: ExchangeContext,
}

impl ReceivingHeaders {
    pub fn new(ctx: ExchangeContext) -> Self {
        Self { ctx }
    }

    pub fn read_inbound_request_headers(&mut self, request: &Request) -> ListenerState {
        if let Some(observer) = &self.ctx.observer {
            observer.request_received(request);
        }
        ListenerState::ReceivingEntityBody(ReceivingEntityBody::new(
            self.ctx.clone(),
            request.clone(),
        ))
    }

    pub fn handle_abrupt_channel_closure(&mut self) {
        tracing::debug!("Remote client closed an idle connection");
    }

    pub fn handle_idle_timeout(&mut self) {
        tracing::debug!("Idle timeout on connection waiting for a request");
    }
}

/// The request head is in; its body is being read.
pub struct ReceivingEntityBody {
    ctx: ExchangeContext,
    request: Request,
    received: u64,
}

impl ReceivingEntityBody {
    pub fn new(ctx: ExchangeContext, request: Request) -> Self {
        Self {
            ctx,
            request,
            received: 0,
        }
    }

    pub fn read_inbound_request_body(&mut self, data: Bytes, last: bool) -> Option<ListenerState> {
        self.received += data.len() as u64;
        if !last {
            return None;
        }

        tracing::trace!(
            path = %self.request.path,
            received = self.received,
            "Inbound request body complete"
        );
        Some(ListenerState::SendingHeaders(SendingHeaders::new(
            self.ctx.clone(),
            self.request.clone(),
        )))
    }

    pub fn handle_abrupt_channel_closure(&mut self) {
        tracing::error!(
            path = %self.request.path,
            received = self.received,
            "Remote client closed the connection while reading inbound request body"
        );
    }

    pub fn handle_idle_timeout(&mut self) {
        tracing::error!(
            path = %self.request.path,
            received = self.received,
            "Idle timeout triggered while reading inbound request body"
        );
    }
}
