use std::{
    io::{Write, stderr},
    sync::atomic::{AtomicUsize, Ordering},
    time::{Duration, Instant},
};
use tracing::info;

/// Measures the wall time of repeated sections.
#[derive(Default, Debug, Clone)]
pub struct Timer {
    start: Option<Instant>,
    duration: Duration,
    cumulative_duration: Duration,
}

impl Timer {
    /// Starts the timer, unless it is already running.
    pub fn record(&mut self) -> Option<()> {
        if self.start.is_none() {
            self.start = Some(Instant::now());
            Some(())
        } else {
            None
        }
    }

    pub fn end(&mut self) -> Option<()> {
        self.duration = Instant::now().checked_duration_since(self.start?)?;
        self.start = None;
        Some(())
    }

    pub fn accumulate(&mut self) -> Option<()> {
        self.cumulative_duration = self.cumulative_duration.checked_add(self.duration)?;
        Some(())
    }

    /// Time since `record`, or the last recorded span if stopped.
    pub fn elapsed(&self) -> Duration {
        self.start.map(|start| start.elapsed()).unwrap_or(self.duration)
    }

    pub fn cumulative(&self) -> Duration {
        self.cumulative_duration
    }
}

/// `" 42%\t00:01:05 remaining\tmsg"`, extrapolating from `elapsed`.
pub fn progress_line(pos: usize, total: usize, msg: &str, elapsed: Duration) -> String {
    let pct = if total == 0 {
        100
    } else {
        (pos.min(total) * 100) / total
    };
    let remaining = if pos == 0 {
        0
    } else {
        let per_sample = elapsed.as_secs_f64() / pos as f64;
        (per_sample * total.saturating_sub(pos) as f64).round() as u64
    };
    format!(
        "{pct:3}%\t{:02}:{:02}:{:02} remaining\t{msg}",
        remaining / 3600,
        (remaining / 60) % 60,
        remaining % 60
    )
}

/// Receives progress reports. Used only for observability.
pub trait ProgressSink: Send + Sync {
    fn report(&self, pos: usize, total: usize, msg: &str, elapsed: Duration);
}

#[derive(Default, Debug, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _: usize, _: usize, _: &str, _: Duration) {}
}

/// Logs a line each time another tenth of the total is passed.
#[derive(Default, Debug)]
pub struct TracingProgress {
    last_decile: AtomicUsize,
}

impl ProgressSink for TracingProgress {
    fn report(&self, pos: usize, total: usize, msg: &str, elapsed: Duration) {
        let decile = if total == 0 {
            10
        } else {
            pos.min(total) * 10 / total
        };
        if decile > self.last_decile.fetch_max(decile, Ordering::Relaxed) {
            info!("{}", progress_line(pos, total, msg, elapsed));
        }
    }
}

/// Rewrites a single status line on stderr.
#[derive(Default, Debug, Clone, Copy)]
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn report(&self, pos: usize, total: usize, msg: &str, elapsed: Duration) {
        let mut err = stderr().lock();
        // Progress output is best effort.
        let _ = write!(err, "\r{}", progress_line(pos, total, msg, elapsed));
        if pos >= total {
            let _ = writeln!(err);
        }
        let _ = err.flush();
    }
}
