//! Exactly-once outcome of one response.
//!
//! [`response_status`] returns a notifier half, shared by every path that can
//! observe the end of a response, and an awaitable half held by whoever waits
//! for the exchange to finish. The first notification wins; later ones are
//! dropped and reported.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::ServerError;
use crate::http::request::Request;

type Outcome = Result<Request, ServerError>;

/// Creates a connected notifier / receiver pair for one response.
pub fn response_status() -> (ResponseStatusFuture, ResponseStatus) {
    let (tx, rx) = oneshot::channel();
    let notifier = ResponseStatusFuture {
        tx: Arc::new(Mutex::new(Some(tx))),
    };
    (notifier, ResponseStatus { rx })
}

/// Notifier half. Cloning shares the same single notification.
#[derive(Debug, Clone)]
pub struct ResponseStatusFuture {
    tx: Arc<Mutex<Option<oneshot::Sender<Outcome>>>>,
}

impl ResponseStatusFuture {
    /// Reports that the response was written. Returns `false` if the outcome
    /// had already been reported.
    pub fn notify_success(&self, request: Request) -> bool {
        self.notify(Ok(request))
    }

    /// Reports that the response failed. Returns `false` if the outcome had
    /// already been reported.
    pub fn notify_failure(&self, err: ServerError) -> bool {
        self.notify(Err(err))
    }

    pub fn is_notified(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn notify(&self, outcome: Outcome) -> bool {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();

        match tx {
            Some(tx) => {
                // The waiting side may have gone away; the outcome is then moot.
                let _ = tx.send(outcome);
                true
            }
            None => {
                tracing::warn!(
                    success = outcome.is_ok(),
                    "Response status already notified, dropping duplicate"
                );
                false
            }
        }
    }
}

/// Awaitable half: resolves to the original request on success.
#[derive(Debug)]
pub struct ResponseStatus {
    rx: oneshot::Receiver<Outcome>,
}

impl Future for ResponseStatus {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or_else(|_| Err(ServerError::Abandoned)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::{Method, RequestBuilder};

    fn request() -> Request {
        RequestBuilder::new()
            .method(Method::GET)
            .path("/")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn only_first_notification_is_delivered() {
        let (notifier, status) = response_status();

        assert!(notifier.notify_failure(ServerError::RemoteClosed));
        assert!(!notifier.notify_success(request()));
        assert!(notifier.is_notified());

        assert!(status.await.unwrap_err().is_remote_closed());
    }

    #[tokio::test]
    async fn dropped_notifier_reports_abandoned() {
        let (notifier, status) = response_status();
        drop(notifier);

        assert!(matches!(status.await, Err(ServerError::Abandoned)));
    }
}
