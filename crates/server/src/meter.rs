use std::time::{Duration, Instant};

/// One rate-limited throughput reading.
#[derive(Debug, Clone, Copy)]
pub struct ThroughputReport {
    /// Cumulative bytes received.
    pub bytes_received: u64,
    /// Instantaneous rate since the previous reading, bytes/second.
    pub speed_bps: f64,
    /// Completion percentage; absent when the total size is unknown.
    pub percentage: Option<f64>,
    /// Estimated time remaining; absent when the total is unknown or the
    /// instantaneous speed is zero.
    pub eta: Option<Duration>,
}

/// Final accounting for a finished transfer.
#[derive(Debug, Clone, Copy)]
pub struct TransferSummary {
    pub bytes_received: u64,
    pub duration: Duration,
    /// Average rate over the whole transfer, bytes/second.
    pub average_bps: f64,
}

/// Derives speed and ETA readings from cumulative byte counts, yielding at
/// most one reading per interval.
pub struct ThroughputMeter {
    total: Option<u64>,
    interval: Duration,
    started: Instant,
    last_report: Instant,
    last_bytes: u64,
}

impl ThroughputMeter {
    /// `total` of `None` suppresses percentage and ETA in every reading;
    /// bytes are still counted. Tests pass a zero `interval` to get a
    /// reading per record call.
    pub fn new(total: Option<u64>, interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            total,
            interval,
            started: now,
            last_report: now,
            last_bytes: 0,
        }
    }

    /// Records the cumulative count, returning a reading once per interval.
    pub fn record(&mut self, bytes_received: u64) -> Option<ThroughputReport> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_report);
        if elapsed < self.interval {
            return None;
        }

        let speed_bps = if elapsed.as_secs_f64() > 0.0 {
            bytes_received.saturating_sub(self.last_bytes) as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let percentage = self
            .total
            .map(|total| bytes_received as f64 / total as f64 * 100.0);
        let eta = match self.total {
            Some(total) if speed_bps > 0.0 && total > bytes_received => Some(
                Duration::from_secs_f64((total - bytes_received) as f64 / speed_bps),
            ),
            _ => None,
        };

        self.last_report = now;
        self.last_bytes = bytes_received;
        Some(ThroughputReport {
            bytes_received,
            speed_bps,
            percentage,
            eta,
        })
    }

    /// Final accounting over the whole transfer.
    pub fn finish(&self, bytes_received: u64) -> TransferSummary {
        let duration = self.started.elapsed();
        let average_bps = if duration.as_secs_f64() > 0.0 {
            bytes_received as f64 / duration.as_secs_f64()
        } else {
            0.0
        };
        TransferSummary {
            bytes_received,
            duration,
            average_bps,
        }
    }

    /// Expected total, when known.
    pub fn total(&self) -> Option<u64> {
        self.total
    }
}
