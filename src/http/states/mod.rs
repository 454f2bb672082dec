//! Per-exchange listener state machine.
//!
//! Every exchange on a connection walks through the same states:
//!
//! ```text
//!   ReceivingHeaders ──► ReceivingEntityBody ──► SendingHeaders
//!                                                     │
//!                                                     ▼
//!                        ResponseCompleted ◄── SendingEntityBody
//! ```
//!
//! The current state lives in an [`ExchangeStateHolder`]. Callers never hold a
//! state directly; they invoke operations on the holder, which forwards them
//! to whatever state is authoritative and installs the next state if the
//! operation produced one. Operations that make no sense for the current
//! state are logged and ignored.
//!
//! All operations for one exchange are issued from the connection's own task.
//! The holder's slot is behind a mutex only because the final write of a
//! response completes on a spawned task, which performs the last transition.

mod completion;
mod receiving;
mod response_completed;
mod sending_entity_body;
mod sending_headers;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bytes::Bytes;

use crate::config::{Chunking, Config};
use crate::http::channel::Channel;
use crate::http::chunk::BodyChunk;
use crate::http::observer::ResponseObserver;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::status::ResponseStatusFuture;
use crate::http::writer::ResponseHead;

pub use completion::CompletionNotifier;
pub use receiving::{ReceivingEntityBody, ReceivingHeaders};
pub use response_completed::ResponseCompleted;
pub use sending_entity_body::SendingEntityBody;
pub use sending_headers::SendingHeaders;

/// Connection-wide collaborators shared by every state of every exchange.
#[derive(Clone)]
pub struct ExchangeContext {
    pub channel: Channel,
    pub server_name: Option<String>,
    pub chunking: Chunking,
    /// Largest body buffered before headers are forced out; `None` buffers
    /// without limit.
    pub max_buffered_bytes: Option<u64>,
    pub observer: Option<Arc<dyn ResponseObserver>>,
}

impl ExchangeContext {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            server_name: None,
            chunking: Chunking::Auto,
            max_buffered_bytes: None,
            observer: None,
        }
    }

    pub fn from_config(channel: Channel, config: &Config) -> Self {
        Self {
            channel,
            server_name: config.server_name.clone(),
            chunking: config.chunking,
            max_buffered_bytes: config.buffer_limit(),
            observer: None,
        }
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    pub fn with_chunking(mut self, chunking: Chunking) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_max_buffered_bytes(mut self, limit: u64) -> Self {
        self.max_buffered_bytes = Some(limit);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ResponseObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub(crate) fn response_head(
        &self,
        request: &Request,
        response: &Response,
        keep_alive: bool,
    ) -> ResponseHead {
        ResponseHead {
            response: response.clone(),
            version: request.version.clone(),
            keep_alive,
            server_name: self.server_name.clone(),
            body_suppressed: request.is_head(),
        }
    }
}

/// Whether the connection stays open once `response` has been written.
pub fn should_keep_alive(request: &Request, response: &Response) -> bool {
    request.keep_alive() && !response.wants_close()
}

/// The authoritative state of one exchange.
pub enum ListenerState {
    ReceivingHeaders(ReceivingHeaders),
    ReceivingEntityBody(ReceivingEntityBody),
    SendingHeaders(SendingHeaders),
    SendingEntityBody(SendingEntityBody),
    ResponseCompleted(ResponseCompleted),
}

impl ListenerState {
    pub fn name(&self) -> &'static str {
        match self {
            ListenerState::ReceivingHeaders(_) => "ReceivingHeaders",
            ListenerState::ReceivingEntityBody(_) => "ReceivingEntityBody",
            ListenerState::SendingHeaders(_) => "SendingHeaders",
            ListenerState::SendingEntityBody(_) => "SendingEntityBody",
            ListenerState::ResponseCompleted(_) => "ResponseCompleted",
        }
    }

    pub fn as_sending_entity_body(&self) -> Option<&SendingEntityBody> {
        match self {
            ListenerState::SendingEntityBody(s) => Some(s),
            _ => None,
        }
    }

    pub fn read_inbound_request_headers(&mut self, request: &Request) -> Option<ListenerState> {
        match self {
            ListenerState::ReceivingHeaders(s) => Some(s.read_inbound_request_headers(request)),
            other => other.illegal("read_inbound_request_headers"),
        }
    }

    pub fn read_inbound_request_body(&mut self, data: Bytes, last: bool) -> Option<ListenerState> {
        match self {
            ListenerState::ReceivingEntityBody(s) => s.read_inbound_request_body(data, last),
            other => other.illegal("read_inbound_request_body"),
        }
    }

    pub fn write_outbound_response_headers(
        &mut self,
        response: Response,
        status: ResponseStatusFuture,
        holder: WeakStateHolder,
    ) -> Option<ListenerState> {
        match self {
            ListenerState::SendingHeaders(s) => {
                Some(s.write_outbound_response_headers(response, status, holder))
            }
            other => other.illegal("write_outbound_response_headers"),
        }
    }

    pub fn write_outbound_response_body(&mut self, chunk: BodyChunk) -> Option<ListenerState> {
        match self {
            ListenerState::SendingEntityBody(s) => {
                s.write_outbound_response_body(chunk);
                None
            }
            other => {
                chunk.release();
                other.illegal("write_outbound_response_body")
            }
        }
    }

    pub fn handle_abrupt_channel_closure(&mut self) {
        match self {
            ListenerState::ReceivingHeaders(s) => s.handle_abrupt_channel_closure(),
            ListenerState::ReceivingEntityBody(s) => s.handle_abrupt_channel_closure(),
            ListenerState::SendingHeaders(s) => s.handle_abrupt_channel_closure(),
            ListenerState::SendingEntityBody(s) => s.handle_abrupt_channel_closure(),
            ListenerState::ResponseCompleted(s) => s.handle_abrupt_channel_closure(),
        }
    }

    pub fn handle_idle_timeout(&mut self) {
        match self {
            ListenerState::ReceivingHeaders(s) => s.handle_idle_timeout(),
            ListenerState::ReceivingEntityBody(s) => s.handle_idle_timeout(),
            ListenerState::SendingHeaders(s) => s.handle_idle_timeout(),
            ListenerState::SendingEntityBody(s) => s.handle_idle_timeout(),
            ListenerState::ResponseCompleted(s) => s.handle_idle_timeout(),
        }
    }

    fn illegal(&self, operation: &'static str) -> Option<ListenerState> {
        tracing::warn!(
            state = self.name(),
            operation,
            "Operation is not a dependant action of this state, ignoring"
        );
        None
    }
}

/// The single slot holding an exchange's current state.
#[derive(Clone)]
pub struct ExchangeStateHolder {
    slot: Arc<Mutex<ListenerState>>,
}

/// Non-owning reference to an [`ExchangeStateHolder`].
///
/// States keep this rather than a strong handle so an exchange that is
/// dropped mid-response does not keep itself alive.
#[derive(Clone)]
pub struct WeakStateHolder {
    slot: Weak<Mutex<ListenerState>>,
}

impl WeakStateHolder {
    pub fn upgrade(&self) -> Option<ExchangeStateHolder> {
        self.slot.upgrade().map(|slot| ExchangeStateHolder { slot })
    }
}

impl ExchangeStateHolder {
    /// Starts a new exchange waiting for request headers.
    pub fn new(ctx: ExchangeContext) -> Self {
        Self::with_state(ListenerState::ReceivingHeaders(ReceivingHeaders::new(ctx)))
    }

    pub fn with_state(state: ListenerState) -> Self {
        Self {
            slot: Arc::new(Mutex::new(state)),
        }
    }

    pub fn downgrade(&self) -> WeakStateHolder {
        WeakStateHolder {
            slot: Arc::downgrade(&self.slot),
        }
    }

    pub fn state_name(&self) -> &'static str {
        self.lock().name()
    }

    pub fn is_completed(&self) -> bool {
        matches!(*self.lock(), ListenerState::ResponseCompleted(_))
    }

    /// Runs `f` against the current state without changing it.
    pub fn inspect<R>(&self, f: impl FnOnce(&ListenerState) -> R) -> R {
        f(&*self.lock())
    }

    /// Installs `next` unconditionally and hands back the state it replaced.
    pub fn set_listener_state(&self, next: ListenerState) -> ListenerState {
        let mut state = self.lock();
        tracing::debug!(from = state.name(), to = next.name(), "Listener state transition");
        std::mem::replace(&mut *state, next)
    }

    pub fn read_inbound_request_headers(&self, request: &Request) {
        self.apply(|state| state.read_inbound_request_headers(request));
    }

    pub fn read_inbound_request_body(&self, data: Bytes, last: bool) {
        self.apply(|state| state.read_inbound_request_body(data, last));
    }

    pub fn write_outbound_response_headers(&self, response: Response, status: ResponseStatusFuture) {
        let holder = self.downgrade();
        self.apply(|state| state.write_outbound_response_headers(response, status, holder));
    }

    pub fn write_outbound_response_body(&self, chunk: BodyChunk) {
        self.apply(|state| state.write_outbound_response_body(chunk));
    }

    pub fn handle_abrupt_channel_closure(&self) {
        self.lock().handle_abrupt_channel_closure();
    }

    pub fn handle_idle_timeout(&self) {
        self.lock().handle_idle_timeout();
    }

    fn apply(&self, f: impl FnOnce(&mut ListenerState) -> Option<ListenerState>) {
        let mut state = self.lock();
        if let Some(next) = f(&mut *state) {
            tracing::debug!(from = state.name(), to = next.name(), "Listener state transition");
            *state = next;
        }
    }

    fn lock(&self) -> MutexGuard<'_, ListenerState> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
