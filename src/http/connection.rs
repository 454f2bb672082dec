use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadHalf};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

use crate::config::Config;
use crate::http::channel::{spawn_writer, Channel, Progress};
use crate::http::chunk::{BodyChunk, CompositeBuf};
use crate::http::observer::ResponseObserver;
use crate::http::parser::{parse_http_request, ParseError};
use crate::http::request::Request;
use crate::http::response::{ResponseBuilder, StatusCode};
use crate::http::service::{Body, Service};
use crate::http::states::{should_keep_alive, ExchangeContext, ExchangeStateHolder};
use crate::http::status::{response_status, ResponseStatus};
use crate::http::writer::{Frame, ResponseHead};

/// Drives one client connection: reads requests, runs the service and feeds
/// the reply through the exchange state machine.
///
/// Everything for the connection happens on the task calling [`run`], except
/// socket writes, which the channel's driver task performs in order.
///
/// [`run`]: Connection::run
pub struct Connection<S> {
    reader: ReadHalf<S>,
    channel: Channel,
    progress: Progress,
    writer: JoinHandle<()>,
    buffer: BytesMut,
    ctx: ExchangeContext,
    service: Arc<dyn Service>,
    /// `None` disables the idle timer.
    idle_timeout: Option<Duration>,
    peer_closed: bool,
    state: ConnectionState,
}

pub enum ConnectionState {
    Reading,
    Processing(ExchangeStateHolder, Request),
    Writing {
        holder: ExchangeStateHolder,
        status: ResponseStatus,
        keep_alive: bool,
    },
    Closed,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S, config: &Config, service: Arc<dyn Service>) -> Self {
        let (reader, write_half) = tokio::io::split(stream);
        let (channel, progress, writer) = spawn_writer(write_half);
        let ctx = ExchangeContext::from_config(channel.clone(), config);

        Self {
            reader,
            channel,
            progress,
            writer,
            buffer: BytesMut::with_capacity(4096),
            ctx,
            service,
            idle_timeout: config.idle_timeout(),
            peer_closed: false,
            state: ConnectionState::Reading,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ResponseObserver>) -> Self {
        self.ctx = self.ctx.with_observer(observer);
        self
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        let result = self.serve().await;
        self.shutdown().await;
        result
    }

    async fn serve(&mut self) -> anyhow::Result<()> {
        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Reading => {
                    let holder = ExchangeStateHolder::new(self.ctx.clone());
                    self.state = match self.read_request(&holder).await? {
                        Some(request) => {
                            holder.read_inbound_request_headers(&request);
                            holder.read_inbound_request_body(request.body.clone(), true);
                            ConnectionState::Processing(holder, request)
                        }
                        None => ConnectionState::Closed,
                    };
                }

                ConnectionState::Processing(holder, request) => {
                    let reply = self.service.call(&request);
                    let keep_alive = should_keep_alive(&request, &reply.response);

                    let (notifier, status) = response_status();
                    holder.write_outbound_response_headers(reply.response, notifier);
                    self.feed_body(&holder, reply.body).await;

                    self.state = ConnectionState::Writing {
                        holder,
                        status,
                        keep_alive,
                    };
                }

                ConnectionState::Writing {
                    holder,
                    status,
                    keep_alive,
                } => {
                    let written = self.await_response(&holder, status).await;

                    self.state = if written && keep_alive && !self.peer_closed {
                        ConnectionState::Reading // go back for next request
                    } else {
                        ConnectionState::Closed
                    };
                }

                ConnectionState::Closed => break,
            }
        }

        Ok(())
    }

    async fn read_request(&mut self, holder: &ExchangeStateHolder) -> anyhow::Result<Option<Request>> {
        loop {
            match parse_http_request(&self.buffer) {
                Ok((request, consumed)) => {
                    self.buffer.advance(consumed);
                    return Ok(Some(request));
                }

                Err(ParseError::Incomplete) => {}

                Err(e) => {
                    self.reject(&e).await;
                    return Err(anyhow::anyhow!("HTTP parse error: {e}"));
                }
            }

            if self.peer_closed {
                return Ok(None);
            }

            match idle_bounded(self.idle_timeout, self.reader.read_buf(&mut self.buffer)).await {
                None => {
                    holder.handle_idle_timeout();
                    return Ok(None);
                }
                Some(Ok(0)) => {
                    self.peer_closed = true;
                    holder.handle_abrupt_channel_closure();
                    return Ok(None);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    async fn feed_body(&mut self, holder: &ExchangeStateHolder, body: Body) {
        match body {
            Body::Full(bytes) => holder.write_outbound_response_body(BodyChunk::last(bytes)),
            Body::Stream(mut rx) => {
                loop {
                    match idle_bounded(self.idle_timeout, rx.recv()).await {
                        Some(Some(bytes)) => holder.write_outbound_response_body(BodyChunk::new(bytes)),
                        Some(None) => break,
                        None => {
                            holder.handle_idle_timeout();
                            // Tearing the transport down fails the final write,
                            // which reports the outcome.
                            self.writer.abort();
                            break;
                        }
                    }
                }
                holder.write_outbound_response_body(BodyChunk::end());
            }
        }
    }

    /// Waits for the response's final write. Returns whether it succeeded.
    ///
    /// Inbound bytes and outbound write progress both count as activity.
    async fn await_response(&mut self, holder: &ExchangeStateHolder, mut status: ResponseStatus) -> bool {
        let limit = self.idle_timeout.unwrap_or_default();
        let idle = sleep(limit);
        tokio::pin!(idle);
        let mut timed_out = self.idle_timeout.is_none();
        let mut writer_alive = true;

        loop {
            tokio::select! {
                outcome = &mut status => {
                    return match outcome {
                        Ok(request) => {
                            tracing::debug!(method = %request.method, path = %request.path, "Response completed");
                            true
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Response failed");
                            false
                        }
                    };
                }

                read = self.reader.read_buf(&mut self.buffer), if !self.peer_closed => {
                    match read {
                        Ok(n) if n > 0 => {
                            idle.as_mut().reset(Instant::now() + limit);
                        }
                        _ => {
                            self.peer_closed = true;
                            holder.handle_abrupt_channel_closure();
                        }
                    }
                }

                changed = self.progress.changed(), if writer_alive => {
                    match changed {
                        Ok(()) => idle.as_mut().reset(Instant::now() + limit),
                        Err(_) => writer_alive = false,
                    }
                }

                _ = &mut idle, if !timed_out => {
                    timed_out = true;
                    holder.handle_idle_timeout();
                    self.writer.abort();
                }
            }
        }
    }

    async fn reject(&self, err: &ParseError) {
        let status = match err {
            ParseError::UnsupportedTransferEncoding => StatusCode::NotImplemented,
            _ => StatusCode::BadRequest,
        };
        let head = ResponseHead {
            response: ResponseBuilder::new(status).content_length(0).build(),
            version: "HTTP/1.1".to_string(),
            keep_alive: false,
            server_name: self.ctx.server_name.clone(),
            body_suppressed: false,
        };

        let write = self.channel.write_and_flush(Frame::Full {
            head,
            body: CompositeBuf::new(),
        });
        if let Err(e) = write.await {
            tracing::debug!(error = %e, "Failed to reject malformed request");
        }
    }

    async fn shutdown(&mut self) {
        self.state = ConnectionState::Closed;
        self.channel.close();
        let _ = (&mut self.writer).await;
    }
}

/// Runs `fut` under the idle timer. `None` means the timer fired first.
async fn idle_bounded<F: Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
    match limit {
        Some(limit) => timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}
