//! Human-readable sizes, durations and upload progress.

use std::time::{Duration, Instant};

const UNITS: [&str; 9] = ["Bytes", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Minimum time between two progress reports.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

/// `1536.0` -> `"1.5 KB"`. Base 1024, at most two decimals.
pub fn format_bytes(bytes: f64) -> String {
    if bytes <= 0.0 || !bytes.is_finite() {
        return "0 Bytes".into();
    }
    let mut value = bytes;
    let mut exp = 0;
    while value >= 1024.0 && exp < UNITS.len() - 1 {
        value /= 1024.0;
        exp += 1;
    }
    let mut text = format!("{value:.2}");
    if text.contains('.') {
        text = text.trim_end_matches('0').trim_end_matches('.').to_string();
    }
    format!("{} {}", text, UNITS[exp])
}

/// `125s` -> `"2m 5s"`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        0..60 => format!("{secs}s"),
        60..3600 => format!("{}m {}s", secs / 60, secs % 60),
        _ => format!("{}h {}m", secs / 3600, (secs % 3600) / 60),
    }
}

/// A point-in-time view of an upload.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProgressSnapshot {
    pub sent: u64,
    pub total: u64,
    pub percent: f64,
    pub bytes_per_sec: f64,
    /// `None` until a rate can be estimated.
    pub remaining: Option<Duration>,
}

impl ProgressSnapshot {
    pub fn describe(&self) -> String {
        let remaining = self
            .remaining
            .map(format_duration)
            .unwrap_or_else(|| "calculating...".into());
        format!(
            "{:.2}% of {} at {}/s, {} left",
            self.percent,
            format_bytes(self.total as f64),
            format_bytes(self.bytes_per_sec),
            remaining
        )
    }
}

/// Throttles progress events and estimates speed over the last interval.
#[derive(Debug)]
pub struct ProgressTracker {
    total: u64,
    interval: Duration,
    last_update: Instant,
    last_sent: u64,
}

impl ProgressTracker {
    pub fn new(total: u64, started: Instant) -> Self {
        Self::with_interval(total, started, PROGRESS_INTERVAL)
    }

    pub fn with_interval(total: u64, started: Instant, interval: Duration) -> Self {
        Self {
            total,
            interval,
            last_update: started,
            last_sent: 0,
        }
    }

    /// Record that `sent` bytes are out. Returns a snapshot when one is due:
    /// after `interval` has elapsed since the previous one, or on completion.
    pub fn record(&mut self, sent: u64, now: Instant) -> Option<ProgressSnapshot> {
        let elapsed = now.saturating_duration_since(self.last_update);
        let complete = sent >= self.total;
        if elapsed <= self.interval && !complete {
            return None;
        }

        let delta = sent.saturating_sub(self.last_sent) as f64;
        let bytes_per_sec = if elapsed.is_zero() {
            0.0
        } else {
            delta / elapsed.as_secs_f64()
        };
        let remaining = (bytes_per_sec > 0.0).then(|| {
            Duration::from_secs_f64(self.total.saturating_sub(sent) as f64 / bytes_per_sec)
        });
        let percent = if self.total == 0 {
            100.0
        } else {
            sent as f64 / self.total as f64 * 100.0
        };

        self.last_update = now;
        self.last_sent = sent;
        Some(ProgressSnapshot {
            sent,
            total: self.total,
            percent,
            bytes_per_sec,
            remaining,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_byte_counts() {
        assert_eq!(format_bytes(0.0), "0 Bytes");
        assert_eq!(format_bytes(512.0), "512 Bytes");
        assert_eq!(format_bytes(1536.0), "1.5 KB");
        assert_eq!(format_bytes(100.0 * 1024.0 * 1024.0), "100 MB");
        assert_eq!(format_bytes(1234567.0), "1.18 MB");
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m");
    }

    #[test]
    fn throttles_until_interval_or_completion() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(1000, start);

        assert!(tracker.record(100, start + Duration::from_millis(50)).is_none());

        let snap = tracker
            .record(500, start + Duration::from_millis(500))
            .expect("interval elapsed");
        assert_eq!(snap.percent, 50.0);
        assert_eq!(snap.bytes_per_sec, 1000.0);
        assert_eq!(snap.remaining, Some(Duration::from_millis(500)));

        let done = tracker
            .record(1000, start + Duration::from_millis(510))
            .expect("completion always reports");
        assert_eq!(done.percent, 100.0);
    }
}
