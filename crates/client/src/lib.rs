//! Streaming multipart upload engine.
//!
//! [`Uploader`] sends files to an HTTP endpoint as a single `file` form
//! field whose body is produced while the file is still being read, so no
//! whole file is ever buffered in memory. Concurrency is bounded by a
//! shared slot pool, transient failures are retried, and progress flows to
//! a caller-supplied [`ferry_transfer::ProgressSink`].

mod batch;
mod error;
mod retry;
mod upload;

pub use error::{BatchFailures, ErrorClass, UploadError};
pub use upload::Uploader;
