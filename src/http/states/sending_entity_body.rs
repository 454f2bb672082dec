use bytes::Bytes;

use crate::config::Chunking;
use crate::http::channel::WriteFuture;
use crate::http::chunk::{BodyChunk, CompositeBuf};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::states::{CompletionNotifier, ExchangeContext, WeakStateHolder};
use crate::http::status::ResponseStatusFuture;
use crate::http::writer::{Frame, ResponseHead};

/// State between the start and the end of writing a response body.
///
/// In streaming mode (`headers_written`) each chunk is written as soon as it
/// arrives. Otherwise chunks are buffered until the final one, and the whole
/// response goes out as a single write with a computed `Content-Length`.
pub struct SendingEntityBody {
    ctx: ExchangeContext,
    holder: WeakStateHolder,
    request: Request,
    response: Response,
    status: ResponseStatusFuture,
    keep_alive: bool,
    head_request: bool,
    headers_written: bool,
    content_length: u64,
    buffered: CompositeBuf,
    last_written: bool,
}

impl SendingEntityBody {
    pub(crate) fn new(
        ctx: ExchangeContext,
        holder: WeakStateHolder,
        request: Request,
        response: Response,
        status: ResponseStatusFuture,
        keep_alive: bool,
        headers_written: bool,
    ) -> Self {
        let head_request = request.is_head();
        Self {
            ctx,
            holder,
            request,
            response,
            status,
            keep_alive,
            head_request,
            headers_written,
            content_length: 0,
            buffered: CompositeBuf::new(),
            last_written: false,
        }
    }

    pub fn headers_written(&self) -> bool {
        self.headers_written
    }

    pub fn is_head_request(&self) -> bool {
        self.head_request
    }

    /// Body bytes accounted so far while buffering.
    pub fn accumulated_length(&self) -> u64 {
        self.content_length
    }

    pub fn buffered_chunks(&self) -> usize {
        self.buffered.segment_count()
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn write_outbound_response_body(&mut self, chunk: BodyChunk) {
        if self.last_written {
            tracing::warn!(
                len = chunk.len(),
                method = %self.request.method,
                path = %self.request.path,
                "Body chunk received after the final chunk, dropping"
            );
            chunk.release();
            return;
        }

        if chunk.is_last() {
            self.last_written = true;

            let write = if self.headers_written {
                self.write_last_chunk(chunk)
            } else {
                self.content_length += chunk.len() as u64;
                self.response.set_content_length(self.content_length);
                self.write_full_response(chunk)
            };
            self.check_for_response_write_status(write);

            if !self.keep_alive {
                self.ctx.channel.close();
            }
            if let Some(observer) = &self.ctx.observer {
                observer.response_sending(&self.response);
            }
        } else if self.headers_written {
            if self.head_request {
                chunk.release();
                return;
            }
            self.write_chunk(chunk.into_bytes());
        } else if self.exceeds_buffer_limit(chunk.len()) {
            self.switch_to_streaming(chunk);
        } else {
            self.content_length += chunk.len() as u64;
            self.buffered.push(chunk.into_bytes());
        }
    }

    pub fn handle_abrupt_channel_closure(&mut self) {
        // The status future is notified by the pending write's completion.
        tracing::error!(
            method = %self.request.method,
            path = %self.request.path,
            "Remote client closed the connection while writing outbound response body"
        );
    }

    pub fn handle_idle_timeout(&mut self) {
        // The status future is notified by the pending write's completion.
        tracing::error!(
            method = %self.request.method,
            path = %self.request.path,
            "Idle timeout triggered while writing outbound response body"
        );
    }

    /// Drops everything still referenced by this state.
    pub(crate) fn reset(&mut self) {
        self.buffered.clear();
        self.content_length = 0;
        self.headers_written = false;
    }

    fn write_last_chunk(&mut self, chunk: BodyChunk) -> WriteFuture {
        let data = if self.head_request {
            chunk.release();
            Bytes::new()
        } else {
            chunk.into_bytes()
        };
        self.ctx.channel.write_and_flush(Frame::Last(data))
    }

    fn write_full_response(&mut self, chunk: BodyChunk) -> WriteFuture {
        let mut body = std::mem::take(&mut self.buffered);
        body.push(chunk.into_bytes());

        // Content-Length still describes the body a GET would have produced.
        if self.head_request {
            body.clear();
        }

        let head = self.head();
        self.ctx.channel.write_and_flush(Frame::Full { head, body })
    }

    /// Non-final writes are not observed individually. The transport fails
    /// every write after a failed one, so the final write reports it.
    fn write_chunk(&self, data: Bytes) {
        let _ = self.ctx.channel.write_and_flush(Frame::Chunk(data));
    }

    fn exceeds_buffer_limit(&self, incoming: usize) -> bool {
        // HTTP/1.0 peers cannot receive chunked framing, keep buffering.
        self.request.is_http11()
            && self.ctx.chunking != Chunking::Never
            && self
                .ctx
                .max_buffered_bytes
                .is_some_and(|limit| self.content_length + incoming as u64 > limit)
    }

    fn switch_to_streaming(&mut self, chunk: BodyChunk) {
        tracing::debug!(
            buffered = self.content_length,
            incoming = chunk.len(),
            limit = ?self.ctx.max_buffered_bytes,
            path = %self.request.path,
            "Buffered body exceeds limit, switching to chunked transfer"
        );

        self.response.set_chunked();
        let _ = self.ctx.channel.write_and_flush(Frame::Head(self.head()));
        self.headers_written = true;

        let buffered = std::mem::take(&mut self.buffered);
        self.content_length = 0;

        if self.head_request {
            drop(buffered);
            chunk.release();
            return;
        }

        for segment in buffered.into_segments() {
            self.write_chunk(segment);
        }
        self.write_chunk(chunk.into_bytes());
    }

    fn check_for_response_write_status(&self, write: WriteFuture) {
        let notifier =
            CompletionNotifier::new(self.holder.clone(), self.status.clone(), self.request.clone());
        write.on_complete(move |result| notifier.complete(result));
    }

    fn head(&self) -> ResponseHead {
        self.ctx
            .response_head(&self.request, &self.response, self.keep_alive)
    }
}
