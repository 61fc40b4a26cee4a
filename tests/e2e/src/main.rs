fn main() {
    println!("Run `cargo test -p ferry-e2e` to execute the end-to-end transfer tests.");
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::Router;
    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use tokio_util::sync::CancellationToken;

    use ferry_client::{UploadError, Uploader};
    use ferry_transfer::{
        CollectingSink, NullSink, ProgressSink, SlotPool, ThrottledSink, TransferConfig,
        TransferError,
    };

    /// Test-sized config: fast retries, explicit bounds.
    fn config(max_concurrency: usize, retry_attempts: u32) -> TransferConfig {
        TransferConfig {
            chunk_size: 64 * 1024,
            max_concurrency,
            timeout: Duration::from_secs(30),
            retry_attempts,
            retry_delay: Duration::from_millis(10),
        }
    }

    fn make_file(dir: &Path, name: &str, len: usize) -> PathBuf {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let path = dir.join(name);
        std::fs::write(&path, &data).unwrap();
        path
    }

    async fn start(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    /// Spins up the real receiving handler over a temp upload dir.
    async fn start_receiver(upload_dir: &Path) -> String {
        let addr = start(ferry_server::router(upload_dir.to_path_buf())).await;
        format!("http://{addr}/upload")
    }

    // -----------------------------------------------------------------------
    // Round trip
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn round_trip_preserves_bytes() {
        let src = tempfile::TempDir::new().unwrap();
        let dst = tempfile::TempDir::new().unwrap();
        let url = start_receiver(dst.path()).await;

        let path = make_file(src.path(), "payload.bin", 1024 * 1024 + 13);
        let uploader = Uploader::new(config(2, 0)).unwrap();
        let sink = Arc::new(CollectingSink::new());

        uploader
            .upload(
                &path,
                &url,
                Arc::clone(&sink) as Arc<dyn ProgressSink>,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let original = std::fs::read(&path).unwrap();
        let stored = std::fs::read(dst.path().join("payload.bin")).unwrap();
        assert_eq!(stored, original);

        // The final progress event reports exactly the file size.
        let events = sink.events();
        let last = events.last().unwrap();
        assert_eq!(last.bytes_transferred, original.len() as u64);
        assert_eq!(last.total_bytes, original.len() as u64);
        assert!(last.is_final());
        assert_eq!(sink.completions().len(), 1);
    }

    #[tokio::test]
    async fn directory_upload_skips_subdirectories() {
        let src = tempfile::TempDir::new().unwrap();
        let dst = tempfile::TempDir::new().unwrap();
        let url = start_receiver(dst.path()).await;

        make_file(src.path(), "a.bin", 2048);
        make_file(src.path(), "b.bin", 4096);
        std::fs::create_dir(src.path().join("nested")).unwrap();
        make_file(&src.path().join("nested"), "c.bin", 1024);

        let uploader = Uploader::new(config(2, 0)).unwrap();
        uploader
            .upload_dir(
                src.path(),
                &url,
                Arc::new(NullSink),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(dst.path().join("a.bin").exists());
        assert!(dst.path().join("b.bin").exists());
        assert!(!dst.path().join("c.bin").exists());
    }

    // -----------------------------------------------------------------------
    // Preflight
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn zero_byte_file_fails_without_using_a_slot() {
        let src = tempfile::TempDir::new().unwrap();
        let path = src.path().join("empty.bin");
        std::fs::write(&path, b"").unwrap();

        // Hold the pool's only slot; the preflight rejection must not wait
        // for it, so the call finishes immediately anyway.
        let pool = Arc::new(SlotPool::new(1));
        let uploader = Uploader::with_pool(config(1, 3), Arc::clone(&pool)).unwrap();
        let _held = pool.acquire(&CancellationToken::new()).await.unwrap();

        let result = tokio::time::timeout(
            Duration::from_millis(200),
            uploader.upload(
                &path,
                "http://127.0.0.1:1/upload",
                Arc::new(NullSink),
                &CancellationToken::new(),
            ),
        )
        .await
        .expect("must not block on the exhausted pool");

        assert!(matches!(
            result.unwrap_err(),
            UploadError::Transfer(TransferError::EmptyFile { .. })
        ));
    }

    #[tokio::test]
    async fn missing_path_fails_permanently() {
        let uploader = Uploader::new(config(1, 3)).unwrap();
        let result = uploader
            .upload(
                Path::new("/no/such/file.bin"),
                "http://127.0.0.1:1/upload",
                Arc::new(NullSink),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(
            result.unwrap_err(),
            UploadError::Transfer(TransferError::FileAccess { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Concurrency bound
    // -----------------------------------------------------------------------

    #[derive(Clone, Default)]
    struct Gauge {
        current: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    async fn gauged_handler(State(gauge): State<Gauge>, _body: Bytes) -> StatusCode {
        let now = gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
        gauge.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        gauge.current.fetch_sub(1, Ordering::SeqCst);
        StatusCode::OK
    }

    #[tokio::test]
    async fn batch_never_exceeds_the_slot_capacity() {
        let src = tempfile::TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..6)
            .map(|i| make_file(src.path(), &format!("f{i}.bin"), 8192))
            .collect();

        let gauge = Gauge::default();
        let app = Router::new()
            .route("/upload", post(gauged_handler))
            .with_state(gauge.clone());
        let addr = start(app).await;

        let uploader = Uploader::new(config(2, 0)).unwrap();
        uploader
            .upload_many(
                &paths,
                &format!("http://{addr}/upload"),
                Arc::new(NullSink),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(
            gauge.peak.load(Ordering::SeqCst) <= 2,
            "peak concurrency {} exceeded the slot capacity",
            gauge.peak.load(Ordering::SeqCst)
        );
    }

    // -----------------------------------------------------------------------
    // Retry
    // -----------------------------------------------------------------------

    #[derive(Clone)]
    struct Flaky {
        attempts: Arc<AtomicU32>,
        failures_before_success: u32,
    }

    async fn flaky_handler(State(flaky): State<Flaky>, _body: Bytes) -> (StatusCode, &'static str) {
        let n = flaky.attempts.fetch_add(1, Ordering::SeqCst);
        if n < flaky.failures_before_success {
            (StatusCode::INTERNAL_SERVER_ERROR, "simulated failure")
        } else {
            (StatusCode::OK, "ok")
        }
    }

    async fn start_flaky(failures_before_success: u32) -> (String, Arc<AtomicU32>) {
        let attempts = Arc::new(AtomicU32::new(0));
        let app = Router::new()
            .route("/upload", post(flaky_handler))
            .with_state(Flaky {
                attempts: Arc::clone(&attempts),
                failures_before_success,
            });
        let addr = start(app).await;
        (format!("http://{addr}/upload"), attempts)
    }

    #[tokio::test]
    async fn transient_failures_retry_until_success() {
        let src = tempfile::TempDir::new().unwrap();
        let path = make_file(src.path(), "f.bin", 4096);
        let (url, attempts) = start_flaky(2).await;

        let uploader = Uploader::new(config(1, 2)).unwrap();
        uploader
            .upload(&path, &url, Arc::new(NullSink), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_name_the_attempt_count() {
        let src = tempfile::TempDir::new().unwrap();
        let path = make_file(src.path(), "f.bin", 4096);
        let (url, attempts) = start_flaky(u32::MAX).await;

        let uploader = Uploader::new(config(1, 2)).unwrap();
        let err = uploader
            .upload(&path, &url, Arc::new(NullSink), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(matches!(err, UploadError::Failed { attempts: 3, .. }));
        assert!(err.to_string().contains('3'));
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    async fn stalling_handler(_body: Bytes) -> StatusCode {
        tokio::time::sleep(Duration::from_secs(30)).await;
        StatusCode::OK
    }

    #[tokio::test]
    async fn cancelling_a_batch_stops_every_sibling() {
        let src = tempfile::TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..4)
            .map(|i| make_file(src.path(), &format!("f{i}.bin"), 8192))
            .collect();

        let app = Router::new().route("/upload", post(stalling_handler));
        let addr = start(app).await;

        // Capacity 2: two uploads stall mid-request, two wait on a slot.
        let uploader = Uploader::new(config(2, 0)).unwrap();
        let cancel = CancellationToken::new();
        let batch = {
            let uploader = uploader.clone();
            let cancel = cancel.clone();
            let url = format!("http://{addr}/upload");
            tokio::spawn(async move {
                uploader
                    .upload_many(&paths, &url, Arc::new(NullSink), &cancel)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();

        // Every sibling must unwind promptly, wherever it was suspended.
        let result = tokio::time::timeout(Duration::from_secs(2), batch)
            .await
            .expect("batch must terminate after cancellation")
            .unwrap();
        assert!(result.unwrap_err().is_cancelled());
    }

    // -----------------------------------------------------------------------
    // Failure aggregation
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn batch_collects_failures_without_aborting_siblings() {
        let src = tempfile::TempDir::new().unwrap();
        let dst = tempfile::TempDir::new().unwrap();
        let url = start_receiver(dst.path()).await;

        let good_a = make_file(src.path(), "good_a.bin", 2048);
        let good_b = make_file(src.path(), "good_b.bin", 2048);
        let missing = src.path().join("missing.bin");

        let uploader = Uploader::new(config(2, 0)).unwrap();
        let err = uploader
            .upload_many(
                &[good_a, missing.clone(), good_b],
                &url,
                Arc::new(NullSink),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        let UploadError::Batch(failures) = err else {
            panic!("expected a batch error, got: {err}");
        };
        assert_eq!(failures.len(), 1);
        assert_eq!(failures.failures()[0].0, missing);

        // The siblings completed despite the failure.
        assert!(dst.path().join("good_a.bin").exists());
        assert!(dst.path().join("good_b.bin").exists());
    }

    // -----------------------------------------------------------------------
    // Progress reporting
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn fast_upload_reports_exactly_once_at_full_completion() {
        let src = tempfile::TempDir::new().unwrap();
        let dst = tempfile::TempDir::new().unwrap();
        let url = start_receiver(dst.path()).await;

        // 1 MiB in 64 KiB chunks against an always-200 server: the throttle
        // swallows everything but the terminal event.
        let path = make_file(src.path(), "fast.bin", 1024 * 1024);
        let inner = Arc::new(CollectingSink::new());
        let sink: Arc<dyn ProgressSink> = Arc::new(ThrottledSink::new(
            Arc::clone(&inner),
            Duration::from_secs(1),
        ));

        let uploader = Uploader::new(config(1, 0)).unwrap();
        uploader
            .upload(&path, &url, sink, &CancellationToken::new())
            .await
            .unwrap();

        let events = inner.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].bytes_transferred, 1024 * 1024);
        assert_eq!(events[0].percentage(), 100.0);
        assert_eq!(inner.completions().len(), 1);
    }
}
