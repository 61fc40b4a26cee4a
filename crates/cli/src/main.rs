//! ferry command-line interface: `ferry server` / `ferry client`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ferry_client::Uploader;
use ferry_server::{ServerConfig, serve};
use ferry_transfer::humanize::format_bytes;
use ferry_transfer::{ProgressEvent, ProgressSink, ThrottledSink, TransferConfig};

#[derive(Debug, Parser)]
#[command(name = "ferry", about = "Streaming HTTP file transfer", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Receive uploads over HTTP.
    Server(ServerArgs),
    /// Upload files to a server.
    Client(ClientArgs),
}

#[derive(Debug, Args)]
struct ServerArgs {
    /// Port to listen on.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Directory received files are written into.
    #[arg(long, default_value = "uploads")]
    upload_dir: PathBuf,
}

#[derive(Debug, Args)]
struct ClientArgs {
    /// Upload endpoint, e.g. http://localhost:8080/upload.
    #[arg(long)]
    url: String,

    /// Files to upload; with --dir, one directory whose files are uploaded.
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Upload the immediate files of the given directory.
    #[arg(long)]
    dir: bool,

    /// HTTP timeout per attempt, in seconds.
    #[arg(long, default_value_t = 30 * 60)]
    timeout_secs: u64,

    /// Read chunk size in bytes.
    #[arg(long, default_value_t = ferry_transfer::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Maximum parallel uploads (0 = number of CPUs).
    #[arg(long, default_value_t = 0)]
    concurrency: usize,

    /// Extra attempts after a failed one.
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Seconds to wait between attempts.
    #[arg(long, default_value_t = 1)]
    retry_delay_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Server(args) => run_server(args).await,
        Commands::Client(args) => run_client(args).await,
    }
}

async fn run_server(args: ServerArgs) -> anyhow::Result<()> {
    let config = ServerConfig {
        port: args.port,
        upload_dir: args.upload_dir,
    };
    serve(config, CancellationToken::new()).await?;
    Ok(())
}

async fn run_client(args: ClientArgs) -> anyhow::Result<()> {
    let config = TransferConfig {
        chunk_size: args.chunk_size,
        max_concurrency: args.concurrency,
        timeout: Duration::from_secs(args.timeout_secs),
        retry_attempts: args.retries,
        retry_delay: Duration::from_secs(args.retry_delay_secs),
    };
    let uploader = Uploader::new(config)?;
    let cancel = CancellationToken::new();
    let sink: Arc<dyn ProgressSink> =
        Arc::new(ThrottledSink::new(ConsoleSink, Duration::from_secs(1)));

    if args.dir {
        anyhow::ensure!(args.paths.len() == 1, "--dir takes exactly one directory");
        uploader
            .upload_dir(&args.paths[0], &args.url, sink, &cancel)
            .await?;
    } else if args.paths.len() == 1 {
        uploader
            .upload(&args.paths[0], &args.url, sink, &cancel)
            .await?;
    } else {
        uploader
            .upload_many(&args.paths, &args.url, sink, &cancel)
            .await?;
    }

    info!("all uploads finished");
    Ok(())
}

/// Logs throttled progress lines for interactive use.
struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn on_progress(&self, event: ProgressEvent) {
        info!(
            progress = format_args!("{:.1}%", event.percentage()),
            sent = %format_bytes(event.bytes_transferred),
            total = %format_bytes(event.total_bytes),
            "uploading"
        );
    }

    fn on_complete(&self, event: ProgressEvent) {
        info!(total = %format_bytes(event.total_bytes), "upload finished");
    }
}
