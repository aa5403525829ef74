//! Frame transport for the panel link.
//!
//! [`Transport`] owns the link to the panel. It runs one task that turns the
//! incoming byte stream into frames and one task that drains the outgoing
//! queue, so writes from concurrent callers never interleave. The link is
//! any `AsyncRead + AsyncWrite` stream; in production that is the
//! [`SerialStream`](tokio_serial::SerialStream) opened by
//! [`serial::open_port`].

pub mod serial;

use std::io;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::protocol::{FrameDecoder, encode_frame};

pub use serial::{SerialConfig, list_ports, open_port};

/// Default capacity of the outgoing queue.
pub const DEFAULT_SEND_QUEUE: usize = 10;

/// Cloneable handle for queueing frames to the panel.
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<Bytes>,
}

impl FrameSender {
    /// Wraps the sending side of an outgoing queue.
    #[must_use]
    pub const fn from_channel(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }

    /// Queues a payload; the terminator is appended by the writer.
    ///
    /// Waits while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns `Error::ChannelClosed` if the writer has stopped.
    pub async fn send(&self, payload: Bytes) -> Result<()> {
        self.tx.send(payload).await.map_err(|_| Error::ChannelClosed)
    }
}

/// Running transport with its read and write loops.
pub struct Transport {
    sender: FrameSender,
    read_task: Option<JoinHandle<Result<()>>>,
    write_task: Option<JoinHandle<Result<()>>>,
}

impl Transport {
    /// Starts the read and write loops on `stream`.
    ///
    /// Every decoded frame is sent, in wire order, to `frame_sink`.
    /// Must be called from within a Tokio runtime.
    pub fn spawn<S>(stream: S, frame_sink: mpsc::Sender<Bytes>, queue_capacity: usize) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));

        let read_task = tokio::spawn(async move {
            let result = run_read_loop(reader, FrameDecoder::new(), frame_sink).await;
            if let Err(e) = &result {
                tracing::error!("read loop error: {}", e);
            }
            result
        });
        let write_task = tokio::spawn(async move {
            let result = run_write_loop(writer, rx).await;
            if let Err(e) = &result {
                tracing::error!("write loop error: {}", e);
            }
            result
        });

        Self {
            sender: FrameSender::from_channel(tx),
            read_task: Some(read_task),
            write_task: Some(write_task),
        }
    }

    /// Returns a handle for queueing frames.
    #[must_use]
    pub fn sender(&self) -> FrameSender {
        self.sender.clone()
    }

    /// Queues a payload for sending.
    ///
    /// # Errors
    ///
    /// Returns `Error::ChannelClosed` if the writer has stopped.
    pub async fn send(&self, payload: Bytes) -> Result<()> {
        self.sender.send(payload).await
    }

    /// Waits until either loop stops and returns its outcome.
    ///
    /// A link failure is reported as an error; the transport cannot recover
    /// from it. The other loop is stopped.
    pub async fn closed(&mut self) -> Result<()> {
        let (Some(read_task), Some(write_task)) = (self.read_task.as_mut(), self.write_task.as_mut())
        else {
            return Ok(());
        };

        let outcome = tokio::select! {
            result = read_task => result,
            result = write_task => result,
        };
        self.close();

        match outcome {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(Error::Io(io::Error::other(e))),
        }
    }

    /// Stops both loops.
    pub fn close(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        if let Some(task) = self.write_task.take() {
            task.abort();
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Reads from the link and forwards every complete frame.
///
/// # Errors
///
/// Returns an error if reading fails or the link reaches end of stream.
pub async fn run_read_loop<R>(
    mut reader: ReadHalf<R>,
    mut decoder: FrameDecoder,
    frame_tx: mpsc::Sender<Bytes>,
) -> Result<()>
where
    R: AsyncRead + AsyncWrite,
{
    let mut buf = [0u8; 1024];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("panel link closed");
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "panel link closed",
                )));
            }
            Ok(n) => n,
            Err(e) => {
                tracing::error!("serial read error: {}", e);
                return Err(Error::Io(e));
            }
        };

        tracing::trace!("received {}", hex::encode(&buf[..n]));
        decoder.feed(&buf[..n]);

        loop {
            match decoder.decode() {
                Ok(Some(frame)) => {
                    tracing::trace!("decoded frame {}", hex::encode(&frame));
                    if frame_tx.send(frame).await.is_err() {
                        tracing::debug!("frame receiver dropped");
                        return Ok(());
                    }
                }
                Ok(None) => break, // Need more data
                Err(e) => {
                    tracing::warn!("frame decode error: {}", e);
                }
            }
        }
    }
}

/// Writes queued payloads, each followed by the terminator, in queue order.
///
/// # Errors
///
/// Returns an error if writing fails.
pub async fn run_write_loop<W>(mut writer: WriteHalf<W>, mut rx: mpsc::Receiver<Bytes>) -> Result<()>
where
    W: AsyncRead + AsyncWrite,
{
    while let Some(payload) = rx.recv().await {
        tracing::debug!("sending {:?}", String::from_utf8_lossy(&payload));
        let frame = encode_frame(&payload);
        tracing::trace!("sending frame {}", hex::encode(&frame));

        writer.write_all(&frame).await.map_err(Error::Io)?;
        writer.flush().await.map_err(Error::Io)?;
    }
    tracing::debug!("send queue closed");
    Ok(())
}
