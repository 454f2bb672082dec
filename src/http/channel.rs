//! Asynchronous transport channel.
//!
//! A [`Channel`] is a cheap, cloneable handle to one connection's write side.
//! Commands are queued to a driver task that owns the socket and executes
//! them strictly in order, so a `close()` issued after a write takes effect
//! only once that write has completed.
//!
//! The driver also publishes a [`Progress`] counter that moves every time
//! bytes reach the transport, so a slow but live reader is not mistaken for
//! an idle one.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use thiserror::Error;
use bytes::Buf;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::http::writer::{Frame, FrameEncoder};

/// Failure of a single write.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel was already closed when the write was attempted, or was
    /// torn down before the write could run.
    #[error("channel closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A command for the transport driver.
#[derive(Debug)]
pub enum Command {
    Write {
        frame: Frame,
        done: oneshot::Sender<Result<(), ChannelError>>,
    },
    Close,
}

/// Receiving end of a channel's command queue.
pub type Outbox = mpsc::UnboundedReceiver<Command>;

/// Number of partial writes the driver has completed so far.
pub type Progress = watch::Receiver<u64>;

#[derive(Debug, Clone)]
pub struct Channel {
    tx: mpsc::UnboundedSender<Command>,
}

impl Channel {
    /// Creates a channel whose commands are delivered to the returned outbox
    /// instead of a socket. The caller is the driver.
    pub fn detached() -> (Channel, Outbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Channel { tx }, rx)
    }

    /// Queues a frame and flushes it. The returned future resolves once the
    /// driver has written it, or failed to.
    pub fn write_and_flush(&self, frame: Frame) -> WriteFuture {
        let (done, rx) = oneshot::channel();

        if let Err(mpsc::error::SendError(Command::Write { done, .. })) =
            self.tx.send(Command::Write { frame, done })
        {
            let _ = done.send(Err(ChannelError::Closed));
        }

        WriteFuture { rx }
    }

    /// Closes the transport after every write queued so far.
    pub fn close(&self) {
        let _ = self.tx.send(Command::Close);
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Pending result of a [`Channel::write_and_flush`].
#[derive(Debug)]
pub struct WriteFuture {
    rx: oneshot::Receiver<Result<(), ChannelError>>,
}

impl WriteFuture {
    /// Runs `f` with the write's outcome once it is known.
    ///
    /// The handler runs on a spawned task, so it may execute on any worker
    /// thread.
    pub fn on_complete<F>(self, f: F)
    where
        F: FnOnce(Result<(), ChannelError>) + Send + 'static,
    {
        tokio::spawn(async move { f(self.await) });
    }
}

impl Future for WriteFuture {
    type Output = Result<(), ChannelError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or_else(|_| Err(ChannelError::Closed)))
    }
}

/// Spawns the driver task for `io` and returns the channel feeding it along
/// with its write progress.
pub fn spawn_writer<W>(io: W) -> (Channel, Progress, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (channel, outbox) = Channel::detached();
    let (progress_tx, progress) = watch::channel(0);
    let task = tokio::spawn(drive(outbox, io, progress_tx));
    (channel, progress, task)
}

async fn drive<W>(mut outbox: Outbox, mut io: W, progress: watch::Sender<u64>)
where
    W: AsyncWrite + Unpin,
{
    let mut encoder = FrameEncoder::new();
    let mut failed = false;

    while let Some(command) = outbox.recv().await {
        match command {
            Command::Write { frame, done } => {
                // Once a write failed the stream is in an unknown state.
                if failed {
                    let _ = done.send(Err(ChannelError::Closed));
                    continue;
                }

                let mut buf = encoder.encode(frame);
                let mut result = write_reporting(&mut io, &mut buf, &progress).await;
                if result.is_ok() {
                    result = io.flush().await;
                }

                if let Err(e) = &result {
                    tracing::debug!(error = %e, "Transport write failed");
                    failed = true;
                }
                let _ = done.send(result.map_err(ChannelError::Io));
            }
            Command::Close => {
                if let Err(e) = io.shutdown().await {
                    tracing::debug!(error = %e, "Transport shutdown failed");
                }
                break;
            }
        }
    }

    outbox.close();
    while let Ok(command) = outbox.try_recv() {
        if let Command::Write { done, .. } = command {
            let _ = done.send(Err(ChannelError::Closed));
        }
    }

    tracing::trace!("Transport driver finished");
}

/// Writes all of `buf`, bumping `progress` after every partial write.
async fn write_reporting<W, B>(io: &mut W, buf: &mut B, progress: &watch::Sender<u64>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    B: Buf,
{
    while buf.has_remaining() {
        if io.write_buf(buf).await? == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
        progress.send_modify(|n| *n = n.wrapping_add(1));
    }
    Ok(())
}
