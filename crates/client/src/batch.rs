//! Multi-file fan-out over the shared slot pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ferry_transfer::{ProgressSink, TransferError};

use crate::error::{BatchFailures, UploadError};
use crate::upload::Uploader;

impl Uploader {
    /// Uploads every path concurrently, each independently bounded by the
    /// engine's slot pool.
    ///
    /// An empty input set is rejected before any resource is touched.
    /// Sibling uploads keep running when one fails; every failure is
    /// collected into one composite error naming each failing path. All
    /// spawned work is joined before this returns, whatever the outcome,
    /// and a fired `cancel` is observed by every in-flight task.
    pub async fn upload_many(
        &self,
        paths: &[PathBuf],
        url: &str,
        sink: Arc<dyn ProgressSink>,
        cancel: &CancellationToken,
    ) -> Result<(), UploadError> {
        if paths.is_empty() {
            return Err(UploadError::EmptyBatch);
        }

        let scope = cancel.child_token();
        let mut tasks = JoinSet::new();
        for path in paths {
            let uploader = self.clone();
            let path = path.clone();
            let url = url.to_owned();
            let sink = Arc::clone(&sink);
            let scope = scope.clone();
            tasks.spawn(async move {
                let result = uploader.upload(&path, &url, sink, &scope).await;
                (path, result)
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((path, Ok(()))) => info!(file = %path.display(), "uploaded"),
                Ok((path, Err(e))) => {
                    warn!(file = %path.display(), error = %e, "upload failed");
                    failures.push((path, e));
                }
                Err(e) => {
                    failures.push((
                        PathBuf::new(),
                        UploadError::Internal(format!("upload task failed: {e}")),
                    ));
                }
            }
        }

        // Every task has unwound by here. A cancelled batch reports
        // cancellation, not the pile of per-file cancellations.
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled.into());
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(BatchFailures::new(failures).into())
        }
    }

    /// Uploads the immediate non-directory entries of `dir`.
    ///
    /// Subdirectories are skipped, not recursed into. An empty directory
    /// fails the same way an empty path list does.
    pub async fn upload_dir(
        &self,
        dir: &Path,
        url: &str,
        sink: Arc<dyn ProgressSink>,
        cancel: &CancellationToken,
    ) -> Result<(), UploadError> {
        let mut entries =
            tokio::fs::read_dir(dir)
                .await
                .map_err(|source| TransferError::FileAccess {
                    path: dir.to_path_buf(),
                    source,
                })?;

        let mut paths = Vec::new();
        while let Some(entry) =
            entries
                .next_entry()
                .await
                .map_err(|source| TransferError::FileAccess {
                    path: dir.to_path_buf(),
                    source,
                })?
        {
            let file_type =
                entry
                    .file_type()
                    .await
                    .map_err(|source| TransferError::FileAccess {
                        path: entry.path(),
                        source,
                    })?;
            if !file_type.is_dir() {
                paths.push(entry.path());
            }
        }

        self.upload_many(&paths, url, sink, cancel).await
    }
}
