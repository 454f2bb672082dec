//! Error vocabulary reported through the response status future.

use std::io;

use thiserror::Error;

use crate::http::channel::ChannelError;

/// Outcome of a failed response transmission.
///
/// Transport failures are normalized here so that callers see one stable set
/// of errors whatever the transport reported underneath.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The remote client went away before the response was fully written.
    #[error("remote client closed the connection before completing outbound response")]
    RemoteClosed,

    /// Any other I/O failure while writing the response.
    #[error("failed to write outbound response: {0}")]
    Write(#[source] io::Error),

    /// The exchange was torn down without a write ever completing.
    #[error("response status dropped before the response completed")]
    Abandoned,
}

impl ServerError {
    pub fn is_remote_closed(&self) -> bool {
        matches!(self, ServerError::RemoteClosed)
    }
}

impl From<ChannelError> for ServerError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Closed => ServerError::RemoteClosed,
            ChannelError::Io(e) if is_closed_kind(e.kind()) => ServerError::RemoteClosed,
            ChannelError::Io(e) => ServerError::Write(e),
        }
    }
}

fn is_closed_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_channel_maps_to_remote_closed() {
        assert!(ServerError::from(ChannelError::Closed).is_remote_closed());
        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert!(ServerError::from(ChannelError::Io(reset)).is_remote_closed());
    }

    #[test]
    fn other_io_errors_are_kept() {
        let err = io::Error::other("disk on fire");
        match ServerError::from(ChannelError::Io(err)) {
            ServerError::Write(e) => assert_eq!(e.to_string(), "disk on fire"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
