//! Transport-free core of the streaming transfer engine.
//!
//! Holds the pieces shared by the client and server sides: the transfer
//! configuration, the concurrency slot pool, the progress observer types,
//! and the chunked file-to-byte-stream encoder that feeds an HTTP request
//! body while the file is still being read.

mod config;
mod encoder;
pub mod humanize;
mod limiter;
mod progress;

pub use config::TransferConfig;
pub use encoder::{ByteStream, EncoderHandle, spawn_encoder};
pub use limiter::{Slot, SlotPool};
pub use progress::{CollectingSink, NullSink, ProgressEvent, ProgressSink, ThrottledSink};

/// Default read chunk size: 64 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Errors produced by the transfer core.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("cannot access {path}: {source}")]
    FileAccess {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("file is empty: {path}")]
    EmptyFile { path: std::path::PathBuf },

    #[error("read failed for {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upload stream closed before the file was fully sent")]
    StreamClosed,

    #[error("encoder task failed: {0}")]
    Encoder(String),

    #[error("cancelled")]
    Cancelled,
}
