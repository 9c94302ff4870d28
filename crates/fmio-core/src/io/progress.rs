//! Progress and throughput bookkeeping for the running job.

use std::time::{Duration, Instant};

/// Minimum gap between two periodic progress reports.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Window over which throughput is measured.
pub const SPEED_INTERVAL: Duration = Duration::from_millis(1000);

/// Overall percent reported by jobs without a byte measure.
pub const INDETERMINATE: i32 = -1;

/// Tracks processed bytes against the job total.
///
/// The overall percentage never decreases. Periodic ticks cap the per-file
/// percentage at 99 so that `100` is only reported by
/// [`ProgressClock::file_finished`].
#[derive(Debug)]
pub struct ProgressClock {
    total: Option<u64>,
    processed: u64,
    transferred: u64,
    file_size: u64,
    file_done: u64,
    last_overall: i32,
    last_progress: Instant,
    last_speed: Instant,
    speed_base: u64,
}

impl ProgressClock {
    /// `total` of `None` makes every report indeterminate.
    pub fn new(total: Option<u64>, now: Instant) -> Self {
        Self {
            total,
            processed: 0,
            transferred: 0,
            file_size: 0,
            file_done: 0,
            last_overall: if total.is_some() { 0 } else { INDETERMINATE },
            last_progress: now,
            last_speed: now,
            speed_base: 0,
        }
    }

    pub fn begin_file(&mut self, size: u64) {
        self.file_size = size;
        self.file_done = 0;
    }

    /// Bytes actually written to the destination.
    pub fn add_bytes(&mut self, n: u64) {
        self.processed = self.processed.saturating_add(n);
        self.transferred = self.transferred.saturating_add(n);
        self.file_done = self.file_done.saturating_add(n);
    }

    /// Payload accounted for without streaming (skipped or renamed).
    pub fn skip_bytes(&mut self, n: u64) {
        self.processed = self.processed.saturating_add(n);
    }

    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    pub fn overall(&mut self) -> i32 {
        let Some(total) = self.total else {
            return INDETERMINATE;
        };
        let pct = if total == 0 {
            100
        } else {
            (u128::from(self.processed.min(total)) * 100 / u128::from(total)) as i32
        };
        self.last_overall = self.last_overall.max(pct);
        self.last_overall
    }

    fn file_percent(&self) -> i32 {
        if self.total.is_none() {
            return INDETERMINATE;
        }
        if self.file_size == 0 {
            return 100;
        }
        (u128::from(self.file_done.min(self.file_size)) * 100 / u128::from(self.file_size)) as i32
    }

    /// `(overall, file)` if a periodic report is due at `now`.
    pub fn tick(&mut self, now: Instant) -> Option<(i32, i32)> {
        if now.saturating_duration_since(self.last_progress) < PROGRESS_INTERVAL {
            return None;
        }
        self.last_progress = now;
        Some((self.overall(), self.file_percent().min(99)))
    }

    /// `(overall, 100)` for a file that just completed.
    pub fn file_finished(&mut self) -> (i32, i32) {
        self.file_done = self.file_size;
        (self.overall(), 100)
    }

    /// The closing overall percentage, if one is still owed: `Some(100)`
    /// when the last report fell short of it.
    pub fn finish(&mut self) -> Option<i32> {
        self.total?;
        if self.overall() >= 100 {
            return None;
        }
        self.last_overall = 100;
        Some(100)
    }

    /// Formatted throughput if a speed report is due at `now`.
    pub fn speed(&mut self, now: Instant) -> Option<String> {
        let elapsed = now.saturating_duration_since(self.last_speed);
        if elapsed < SPEED_INTERVAL {
            return None;
        }
        let delta = self.transferred - self.speed_base;
        self.speed_base = self.transferred;
        self.last_speed = now;
        let millis = elapsed.as_millis().max(1);
        let rate = u128::from(delta) * 1000 / millis;
        Some(format_rate(u64::try_from(rate).unwrap_or(u64::MAX)))
    }
}

/// Human-readable byte rate, e.g. `"12.5 MB/s"`.
pub fn format_rate(bytes_per_sec: u64) -> String {
    format!("{}/s", format_size(bytes_per_sec))
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
