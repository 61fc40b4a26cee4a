//! File-to-byte-stream encoder: the producer half of one upload attempt.
//!
//! A spawned task reads the source file in fixed-size chunks and feeds a
//! bounded channel; the HTTP request body drains the other end while the
//! read is still in progress. The channel holds at most one chunk, so the
//! reader can never run further ahead of transmission than that.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::TransferError;
use crate::progress::{ProgressEvent, ProgressSink};

/// Byte stream consumed as an HTTP request body.
pub type ByteStream = ReceiverStream<Result<Bytes, io::Error>>;

/// Handle to a running producer task.
pub struct EncoderHandle {
    task: JoinHandle<Result<u64, TransferError>>,
}

impl EncoderHandle {
    /// Waits for the producer to finish; returns the bytes it streamed.
    pub async fn finish(self) -> Result<u64, TransferError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(TransferError::Encoder(e.to_string())),
        }
    }
}

/// Spawns the producer for one attempt.
///
/// `file` must be freshly opened and `total` its size at open time. The
/// returned stream yields the file's bytes in order and ends when the
/// producer closes the channel after the last chunk; the handle resolves
/// with the byte count, or with the failure the stream was aborted for.
pub fn spawn_encoder(
    file: File,
    path: PathBuf,
    total: u64,
    chunk_size: usize,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
) -> (ByteStream, EncoderHandle) {
    let (tx, rx) = mpsc::channel::<Result<Bytes, io::Error>>(1);
    let task = tokio::spawn(produce(file, path, total, chunk_size, sink, cancel, tx));
    (ReceiverStream::new(rx), EncoderHandle { task })
}

async fn produce(
    mut file: File,
    path: PathBuf,
    total: u64,
    chunk_size: usize,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
    tx: mpsc::Sender<Result<Bytes, io::Error>>,
) -> Result<u64, TransferError> {
    let mut buf = vec![0u8; chunk_size];
    let mut transferred: u64 = 0;

    loop {
        // Never read past the size recorded at open time: the declared
        // body length stays exact even if the file grows underneath us.
        let remaining = total - transferred;
        if remaining == 0 {
            return Ok(transferred);
        }
        let want = chunk_size.min(remaining as usize);

        // Chunk writes are not interruptible; cancellation lands between
        // chunks. An error pushed into the channel makes the consumer
        // abort the request instead of finishing a truncated body.
        if cancel.is_cancelled() {
            let _ = tx.send(Err(io::Error::other("upload cancelled"))).await;
            return Err(TransferError::Cancelled);
        }

        let n = match file.read(&mut buf[..want]).await {
            Ok(n) => n,
            Err(source) => {
                let _ = tx.send(Err(io::Error::other("source read failed"))).await;
                return Err(TransferError::Read { path, source });
            }
        };
        if n == 0 {
            // Early end of file (the source shrank). Dropping the sender
            // closes the stream; the consumer decides what a short body
            // means.
            return Ok(transferred);
        }

        let chunk = Bytes::copy_from_slice(&buf[..n]);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(TransferError::Cancelled);
            }
            sent = tx.send(Ok(chunk)) => {
                if sent.is_err() {
                    // Consumer went away with bytes still unsent. The
                    // attempt must not count as delivered even if the
                    // server already answered.
                    return Err(TransferError::StreamClosed);
                }
            }
        }

        transferred += n as u64;
        sink.on_progress(ProgressEvent::new(transferred, total));
    }
}
