//! Upload error taxonomy and retry classification.

use std::fmt;
use std::path::PathBuf;

use ferry_transfer::TransferError;

/// Errors produced by the upload engine.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("upload failed after {attempts} attempts: {source}")]
    Failed {
        attempts: u32,
        #[source]
        source: Box<UploadError>,
    },

    #[error("no files to upload")]
    EmptyBatch,

    #[error(transparent)]
    Batch(#[from] BatchFailures),

    #[error("upload task failed: {0}")]
    Internal(String),
}

/// Retry eligibility of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retrying cannot help.
    Permanent,
    /// Retrying may help.
    Transient,
    /// The caller asked to stop; bypasses remaining retries.
    Cancelled,
}

impl UploadError {
    /// Classifies this error for the retry policy.
    ///
    /// File access, empty files, mid-read failures and request construction
    /// problems are permanent; network-level failures and non-success
    /// responses are transient.
    pub fn class(&self) -> ErrorClass {
        match self {
            UploadError::Transfer(TransferError::Cancelled) => ErrorClass::Cancelled,
            UploadError::Transfer(_) => ErrorClass::Permanent,
            // A builder error is a malformed request, not a flaky network.
            UploadError::Http(e) if e.is_builder() => ErrorClass::Permanent,
            UploadError::Http(_) => ErrorClass::Transient,
            UploadError::Status { .. } => ErrorClass::Transient,
            UploadError::Failed { source, .. } => source.class(),
            UploadError::EmptyBatch | UploadError::Batch(_) | UploadError::Internal(_) => {
                ErrorClass::Permanent
            }
        }
    }

    /// Whether this error (or its wrapped cause) is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.class() == ErrorClass::Cancelled
    }
}

/// Per-file failures of one batch call, aggregated into a single error.
#[derive(Debug)]
pub struct BatchFailures {
    failures: Vec<(PathBuf, UploadError)>,
}

impl BatchFailures {
    pub(crate) fn new(failures: Vec<(PathBuf, UploadError)>) -> Self {
        Self { failures }
    }

    /// Each failing path with its cause.
    pub fn failures(&self) -> &[(PathBuf, UploadError)] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for BatchFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} upload(s) failed: ", self.failures.len())?;
        for (i, (path, cause)) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {cause}", path.display())?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchFailures {}
