//! Single-file transfer orchestration.

use std::path::Path;
use std::sync::Arc;

use reqwest::Body;
use reqwest::multipart::{Form, Part};
use tokio::fs::File;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use ferry_transfer::{
    ProgressEvent, ProgressSink, SlotPool, TransferConfig, TransferError, spawn_encoder,
};

use crate::error::UploadError;
use crate::retry;

/// Streaming upload engine.
///
/// Cheap to clone; clones share the HTTP connection pool, the slot pool
/// and the configuration.
#[derive(Clone)]
pub struct Uploader {
    http: reqwest::Client,
    pool: Arc<SlotPool>,
    config: TransferConfig,
}

impl Uploader {
    /// Builds an engine with its own slot pool.
    pub fn new(config: TransferConfig) -> Result<Self, UploadError> {
        let config = config.normalized();
        let pool = Arc::new(SlotPool::new(config.max_concurrency));
        Self::with_pool(config, pool)
    }

    /// Builds an engine on an existing slot pool, so several engines can
    /// share one concurrency budget.
    pub fn with_pool(config: TransferConfig, pool: Arc<SlotPool>) -> Result<Self, UploadError> {
        let config = config.normalized();
        // No compression: the payloads are opaque binary.
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, pool, config })
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<SlotPool> {
        &self.pool
    }

    /// Uploads one file to `url` as a streamed multipart POST.
    ///
    /// Holds one slot from the pool for the whole attempt loop and retries
    /// transient failures within the configured budget. The sink sees
    /// cumulative progress during each attempt and `on_complete` exactly
    /// once on success; it is never invoked after this returns.
    pub async fn upload(
        &self,
        path: &Path,
        url: &str,
        sink: Arc<dyn ProgressSink>,
        cancel: &CancellationToken,
    ) -> Result<(), UploadError> {
        // Reject obviously bad inputs before taking a slot.
        preflight(path).await?;

        let _slot = self.pool.acquire(cancel).await?;
        debug!(file = %path.display(), "slot acquired");

        let sent = retry::run_with_retries(
            self.config.retry_attempts,
            self.config.retry_delay,
            cancel,
            |attempt| self.upload_once(path, url, Arc::clone(&sink), cancel, attempt),
        )
        .await?;

        sink.on_complete(ProgressEvent::new(sent, sent));
        info!(file = %path.display(), bytes = sent, "upload complete");
        Ok(())
    }

    /// One full encode-and-transmit cycle.
    async fn upload_once(
        &self,
        path: &Path,
        url: &str,
        sink: Arc<dyn ProgressSink>,
        cancel: &CancellationToken,
        attempt: u32,
    ) -> Result<u64, UploadError> {
        // Checked fresh every attempt: the file may have changed since the
        // previous one.
        let file = File::open(path).await.map_err(|source| TransferError::FileAccess {
            path: path.to_path_buf(),
            source,
        })?;
        let total = file
            .metadata()
            .await
            .map_err(|source| TransferError::FileAccess {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        if total == 0 {
            return Err(TransferError::EmptyFile {
                path: path.to_path_buf(),
            }
            .into());
        }

        debug!(file = %path.display(), bytes = total, attempt, "starting attempt");

        let (stream, producer) = spawn_encoder(
            file,
            path.to_path_buf(),
            total,
            self.config.chunk_size,
            sink,
            cancel.clone(),
        );

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_owned());
        let part = Part::stream_with_length(Body::wrap_stream(stream), total)
            .file_name(name)
            .mime_str("application/octet-stream")?;
        let form = Form::new().part("file", part);

        let send = self.http.post(url).multipart(form).send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // Dropping the in-flight request tears the body down; the
                // producer unwinds through its own cancellation check.
                let _ = producer.finish().await;
                return Err(TransferError::Cancelled.into());
            }
            result = send => result,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                // The producer stops on its own once the body is gone.
                let _ = producer.finish().await;
                return Err(e.into());
            }
        };

        let status = response.status();
        match producer.finish().await {
            // The server hung up on the body first; its status is the
            // more useful story.
            Err(TransferError::StreamClosed) if !status.is_success() => {}
            // Otherwise a producer failure outranks the response: a 200
            // for a body we never finished is still a failed attempt.
            Err(e) => return Err(e.into()),
            Ok(sent) => {
                if status.is_success() {
                    return Ok(sent);
                }
            }
        }

        let body = response.text().await.unwrap_or_default();
        Err(UploadError::Status { status, body })
    }
}

/// Precondition checks that must not cost a slot: the path resolves to a
/// readable, non-empty regular file.
async fn preflight(path: &Path) -> Result<(), UploadError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|source| TransferError::FileAccess {
            path: path.to_path_buf(),
            source,
        })?;
    if !meta.is_file() {
        return Err(TransferError::FileAccess {
            path: path.to_path_buf(),
            source: std::io::Error::other("not a regular file"),
        }
        .into());
    }
    if meta.len() == 0 {
        return Err(TransferError::EmptyFile {
            path: path.to_path_buf(),
        }
        .into());
    }
    Ok(())
}
