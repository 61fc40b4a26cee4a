//! HTTP receiving side of the transfer engine.
//!
//! Accepts streamed multipart uploads on `POST /upload`, persists them
//! under an upload directory chunk by chunk (no full-body buffering), and
//! reports live throughput and ETA while a transfer is in flight.

mod meter;
mod receive;

pub use meter::{ThroughputMeter, ThroughputReport, TransferSummary};
pub use receive::{router, router_with_interval};

use std::net::SocketAddr;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Directory received files are written into.
    pub upload_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            upload_dir: PathBuf::from("uploads"),
        }
    }
}

/// Errors produced by the server runner.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs the upload server until `cancel` fires.
pub async fn serve(config: ServerConfig, cancel: CancellationToken) -> Result<(), ServerError> {
    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        addr = %listener.local_addr()?,
        upload_dir = %config.upload_dir.display(),
        "upload server listening"
    );

    let app = receive::router(config.upload_dir);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("server shut down");
    Ok(())
}
