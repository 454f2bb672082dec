use crate::error::ServerError;
use crate::http::channel::ChannelError;
use crate::http::request::Request;
use crate::http::states::{ListenerState, ResponseCompleted, WeakStateHolder};
use crate::http::status::ResponseStatusFuture;

/// Carries the outcome of a response's final write to the exchange.
///
/// Runs exactly once per response, from the write's completion handler. It
/// moves the exchange into [`ResponseCompleted`] first and then notifies the
/// status future, so whoever awaits the status observes the terminal state.
pub struct CompletionNotifier {
    holder: WeakStateHolder,
    status: ResponseStatusFuture,
    request: Request,
}

impl CompletionNotifier {
    pub fn new(holder: WeakStateHolder, status: ResponseStatusFuture, request: Request) -> Self {
        Self {
            holder,
            status,
            request,
        }
    }

    pub fn complete(self, result: Result<(), ChannelError>) {
        let outcome = result.map_err(ServerError::from);

        if let Err(e) = &outcome {
            tracing::warn!(
                error = %e,
                method = %self.request.method,
                path = %self.request.path,
                "Failed to write outbound response"
            );
        }

        if let Some(holder) = self.holder.upgrade() {
            let completed = ResponseCompleted::new(self.request.clone());
            let previous = holder.set_listener_state(ListenerState::ResponseCompleted(completed));
            if let ListenerState::SendingEntityBody(mut body) = previous {
                body.reset();
            }
        }

        match outcome {
            Ok(()) => self.status.notify_success(self.request),
            Err(e) => self.status.notify_failure(e),
        };
    }
}
