//! Inbound upload handling: multipart decode, streaming persist, progress.

use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::Router;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use ferry_transfer::humanize::{format_bytes, format_duration};

use crate::meter::{ThroughputMeter, ThroughputReport};

/// Default progress-report interval.
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone)]
struct AppState {
    upload_dir: PathBuf,
    report_interval: Duration,
}

/// Builds the upload router.
pub fn router(upload_dir: PathBuf) -> Router {
    router_with_interval(upload_dir, REPORT_INTERVAL)
}

/// Router with a custom progress-report interval (tests pass zero).
pub fn router_with_interval(upload_dir: PathBuf, report_interval: Duration) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/upload", post(handle_upload))
        // Bodies are streamed to disk, never held in memory, so the
        // default request size cap does not apply.
        .layer(DefaultBodyLimit::disable())
        .with_state(AppState {
            upload_dir,
            report_interval,
        })
}

async fn index() -> &'static str {
    "ferry upload server is running\n"
}

/// Errors surfaced to the uploading client.
#[derive(Debug, thiserror::Error)]
enum ReceiveError {
    #[error("malformed multipart form: {0}")]
    Form(#[from] MultipartError),

    #[error("missing form field \"file\"")]
    MissingField,

    #[error("invalid filename {0:?}")]
    BadFilename(String),

    #[error("read failed mid-stream: {0}")]
    Stream(#[source] MultipartError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReceiveError {
    fn status(&self) -> StatusCode {
        match self {
            ReceiveError::Form(_) | ReceiveError::MissingField | ReceiveError::BadFilename(_) => {
                StatusCode::BAD_REQUEST
            }
            ReceiveError::Stream(_) | ReceiveError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ReceiveError {
    fn into_response(self) -> Response {
        (self.status(), format!("{self}\n")).into_response()
    }
}

async fn handle_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return ReceiveError::MissingField.into_response(),
            Err(e) => return ReceiveError::from(e).into_response(),
        };
        if field.name() != Some("file") {
            continue;
        }

        return match persist_field(&state, &headers, field).await {
            Ok((name, bytes)) => (
                StatusCode::OK,
                format!("file {name} uploaded ({})\n", format_bytes(bytes)),
            )
                .into_response(),
            Err(e) => {
                error!(error = %e, "upload failed");
                e.into_response()
            }
        };
    }
}

/// Streams one form field to disk, reporting throughput as it goes.
///
/// A failure partway through leaves the partial file in place.
async fn persist_field(
    state: &AppState,
    headers: &HeaderMap,
    mut field: Field<'_>,
) -> Result<(String, u64), ReceiveError> {
    let declared = field.file_name().unwrap_or_default().to_owned();
    let name = sanitize_filename(&declared)?;

    fs::create_dir_all(&state.upload_dir).await?;
    // Collisions overwrite.
    let mut dest = fs::File::create(state.upload_dir.join(&name)).await?;

    let total = expected_total(headers, &field);
    let mut meter = ThroughputMeter::new(total, state.report_interval);

    info!(
        file = %name,
        size = %total.map_or_else(|| "unknown".to_owned(), format_bytes),
        "receiving upload"
    );

    let mut received: u64 = 0;
    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => return Err(ReceiveError::Stream(e)),
        };
        dest.write_all(&chunk).await?;
        received += chunk.len() as u64;
        if let Some(report) = meter.record(received) {
            log_report(&name, &report);
        }
    }
    dest.flush().await?;

    let summary = meter.finish(received);
    info!(
        file = %name,
        bytes = received,
        duration = %format_duration(summary.duration),
        avg_speed = %format!("{}/s", format_bytes(summary.average_bps as u64)),
        "upload complete"
    );

    Ok((name, received))
}

fn log_report(name: &str, report: &ThroughputReport) {
    let speed = format!("{}/s", format_bytes(report.speed_bps as u64));
    match report.percentage {
        Some(pct) => {
            let eta = report.eta.map_or_else(|| "-".to_owned(), format_duration);
            info!(
                file = %name,
                received = %format_bytes(report.bytes_received),
                progress = format_args!("{pct:.1}%"),
                speed = %speed,
                eta = %eta,
                "receiving"
            );
        }
        None => info!(
            file = %name,
            received = %format_bytes(report.bytes_received),
            speed = %speed,
            "receiving"
        ),
    }
}

/// Expected size: the request's Content-Length when present and positive,
/// else the part's own declared length, else unknown.
fn expected_total(headers: &HeaderMap, field: &Field<'_>) -> Option<u64> {
    content_length(headers).or_else(|| content_length(field.headers()))
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|len| *len > 0)
}

/// Reduces a client-declared filename to a safe final path component.
///
/// The declared name is advisory; anything that resolves to a parent
/// directory, a bare root, or nothing at all is rejected.
fn sanitize_filename(declared: &str) -> Result<String, ReceiveError> {
    match Path::new(declared).file_name() {
        Some(name) => Ok(name.to_string_lossy().into_owned()),
        None => Err(ReceiveError::BadFilename(declared.to_owned())),
    }
}
