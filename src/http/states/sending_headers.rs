use crate::config::Chunking;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::states::{
    should_keep_alive, ExchangeContext, ListenerState, SendingEntityBody, WeakStateHolder,
};
use crate::http::status::ResponseStatusFuture;
use crate::http::writer::Frame;

/// The request has been read; the application is about to respond.
pub struct SendingHeaders {
    ctx: ExchangeContext,
    request: Request,
}

impl SendingHeaders {
    pub fn new(ctx: ExchangeContext, request: Request) -> Self {
        Self { ctx, request }
    }

    /// Picks the transmission mode for `response`.
    ///
    /// Streaming responses get their head written right away with chunked
    /// framing. Everything else is deferred so the body can be measured and
    /// sent together with the head.
    pub fn write_outbound_response_headers(
        &mut self,
        mut response: Response,
        status: ResponseStatusFuture,
        holder: WeakStateHolder,
    ) -> ListenerState {
        let keep_alive = should_keep_alive(&self.request, &response);
        let streaming = self.use_chunking(&response);

        if streaming {
            response.set_chunked();
            let head = self.ctx.response_head(&self.request, &response, keep_alive);
            // Unobserved; a failure resurfaces on the response's final write.
            let _ = self.ctx.channel.write_and_flush(Frame::Head(head));
        }

        tracing::debug!(
            method = %self.request.method,
            path = %self.request.path,
            status = response.status.as_u16(),
            streaming,
            keep_alive,
            "Writing outbound response"
        );

        ListenerState::SendingEntityBody(SendingEntityBody::new(
            self.ctx.clone(),
            holder,
            self.request.clone(),
            response,
            status,
            keep_alive,
            streaming,
        ))
    }

    pub fn handle_abrupt_channel_closure(&mut self) {
        tracing::error!(
            method = %self.request.method,
            path = %self.request.path,
            "Remote client closed the connection before initiating outbound response"
        );
    }

    pub fn handle_idle_timeout(&mut self) {
        tracing::error!(
            method = %self.request.method,
            path = %self.request.path,
            "Idle timeout triggered before initiating outbound response"
        );
    }

    fn use_chunking(&self, response: &Response) -> bool {
        if !self.request.is_http11() {
            return false;
        }
        match self.ctx.chunking {
            Chunking::Always => true,
            Chunking::Auto => response.content_length().is_none(),
            Chunking::Never => false,
        }
    }
}
