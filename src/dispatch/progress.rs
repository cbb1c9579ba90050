//! Live progress reporting for a dispatch run.
//!
//! [`ProgressReporter::update`] is called from every worker, so counters are
//! atomics and the redraw/log timestamps sit behind a mutex. Rendering is
//! best-effort: a worker that finds the render lock taken skips the redraw
//! rather than waiting for it.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::info;

use super::config::{PROGRESS_LOG_EVERY, PROGRESS_LOG_INTERVAL, PROGRESS_REDRAW_INTERVAL};

/// How progress is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    /// Count only, render nothing
    Disabled,
    /// Live terminal bar
    Interactive,
    /// Structured status line every few completions or seconds
    DebugPeriodic,
}

impl ProgressMode {
    /// Pick a mode: verbose runs log periodically, non-terminals stay quiet.
    pub fn detect(verbose: bool, enabled: bool) -> Self {
        if verbose {
            Self::DebugPeriodic
        } else if !enabled || !std::io::stderr().is_terminal() {
            Self::Disabled
        } else {
            Self::Interactive
        }
    }
}

/// Final statistics of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressStats {
    /// Expected completions
    pub total: u64,
    /// Successful completions
    pub sent: u64,
    /// Failed completions
    pub failed: u64,
    /// `sent / (sent + failed) * 100`, 0 with no completions
    pub success_rate: f64,
    /// Time since `start`
    pub duration: Duration,
    /// Completions per second, 0 when `duration` is zero
    pub throughput: f64,
}

impl ProgressStats {
    /// Derive rates from raw counts.
    pub fn compute(total: u64, sent: u64, failed: u64, duration: Duration) -> Self {
        let completed = sent + failed;
        let success_rate = if completed == 0 {
            0.0
        } else {
            sent as f64 / completed as f64 * 100.0
        };
        let secs = duration.as_secs_f64();
        let throughput = if secs > 0.0 {
            completed as f64 / secs
        } else {
            0.0
        };
        Self {
            total,
            sent,
            failed,
            success_rate,
            duration,
            throughput,
        }
    }

    /// One-line summary printed by [`ProgressReporter::finish`].
    pub fn summary_line(&self) -> String {
        format!(
            "Sent {}/{} ({} failed, {:.1}% success) in {} at {:.1}/s",
            self.sent,
            self.total,
            self.failed,
            self.success_rate,
            format_duration(self.duration),
            self.throughput
        )
    }
}

struct RenderState {
    last_redraw: Option<Instant>,
    last_log: Instant,
    bar: Option<ProgressBar>,
}

/// Thread-safe progress counter with optional rendering.
pub struct ProgressReporter {
    mode: ProgressMode,
    total: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
    started: Mutex<Instant>,
    render: Mutex<RenderState>,
}

impl ProgressReporter {
    /// Create a reporter; nothing is shown until [`start`](Self::start).
    pub fn new(mode: ProgressMode) -> Self {
        let now = Instant::now();
        Self {
            mode,
            total: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            started: Mutex::new(now),
            render: Mutex::new(RenderState {
                last_redraw: None,
                last_log: now,
                bar: None,
            }),
        }
    }

    /// Reporter that only counts.
    pub fn disabled() -> Self {
        Self::new(ProgressMode::Disabled)
    }

    /// Rendering mode.
    pub fn mode(&self) -> ProgressMode {
        self.mode
    }

    /// Announce the run and reset counters.
    pub fn start(&self, total: u64) {
        self.total.store(total, Ordering::SeqCst);
        self.sent.store(0, Ordering::SeqCst);
        self.failed.store(0, Ordering::SeqCst);
        let now = Instant::now();
        if let Ok(mut started) = self.started.lock() {
            *started = now;
        }

        info!(total = total, "Starting batch send");

        if let Ok(mut render) = self.render.lock() {
            render.last_redraw = None;
            render.last_log = now;
            if self.mode == ProgressMode::Interactive {
                render.bar = Some(create_progress_bar(total));
            }
        }
    }

    /// Record one completion. Safe to call from many tasks at once.
    pub fn update(&self, success: bool) {
        if success {
            self.sent.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }

        match self.mode {
            ProgressMode::Disabled => {}
            ProgressMode::Interactive => self.redraw(),
            ProgressMode::DebugPeriodic => self.maybe_log(),
        }
    }

    /// Current counts.
    pub fn snapshot(&self) -> ProgressStats {
        ProgressStats::compute(
            self.total.load(Ordering::SeqCst),
            self.sent.load(Ordering::SeqCst),
            self.failed.load(Ordering::SeqCst),
            self.elapsed(),
        )
    }

    /// Stop rendering, print a summary line and return final statistics.
    pub fn finish(&self) -> ProgressStats {
        let stats = self.snapshot();
        if let Ok(mut render) = self.render.lock() {
            if let Some(bar) = render.bar.take() {
                bar.finish_and_clear();
            }
        }
        if self.mode == ProgressMode::Interactive {
            eprintln!("{}", stats.summary_line());
        }
        if self.logs_summary() {
            info!(
                total = stats.total,
                sent = stats.sent,
                failed = stats.failed,
                success_rate = stats.success_rate,
                throughput = stats.throughput,
                duration_ms = stats.duration.as_millis() as u64,
                "{}",
                stats.summary_line()
            );
        }
        stats
    }

    /// The interactive mode prints its summary directly to stderr.
    fn logs_summary(&self) -> bool {
        self.mode != ProgressMode::Interactive
    }

    fn elapsed(&self) -> Duration {
        self.started
            .lock()
            .map(|started| started.elapsed())
            .unwrap_or_default()
    }

    fn redraw(&self) {
        // Another worker is drawing; the next update will catch up.
        let Ok(mut render) = self.render.try_lock() else {
            return;
        };
        let now = Instant::now();
        if render
            .last_redraw
            .is_some_and(|last| now.duration_since(last) < PROGRESS_REDRAW_INTERVAL)
        {
            return;
        }
        render.last_redraw = Some(now);

        let stats = self.snapshot();
        if let Some(bar) = &render.bar {
            bar.set_position(stats.sent + stats.failed);
            bar.set_message(format_status(&stats));
        }
    }

    fn maybe_log(&self) {
        let stats = self.snapshot();
        let completed = stats.sent + stats.failed;
        let Ok(mut render) = self.render.lock() else {
            return;
        };
        let due = completed % PROGRESS_LOG_EVERY == 0
            || render.last_log.elapsed() >= PROGRESS_LOG_INTERVAL;
        if !due {
            return;
        }
        render.last_log = Instant::now();
        info!(
            completed = completed,
            total = stats.total,
            sent = stats.sent,
            failed = stats.failed,
            eta_secs = estimate_remaining(&stats).map(|d| d.as_secs()),
            "Batch progress"
        );
    }
}

/// `(elapsed / completed) * remaining`; `None` until something has completed.
pub fn estimate_remaining(stats: &ProgressStats) -> Option<Duration> {
    let completed = stats.sent + stats.failed;
    if completed == 0 || stats.duration.is_zero() {
        return None;
    }
    let remaining = stats.total.saturating_sub(completed);
    let per_item = stats.duration.as_secs_f64() / completed as f64;
    Some(Duration::from_secs_f64(per_item * remaining as f64))
}

/// Text shown next to the bar: percentage, counts, failures, ETA.
pub fn format_status(stats: &ProgressStats) -> String {
    let completed = stats.sent + stats.failed;
    let pct = if stats.total == 0 {
        100.0
    } else {
        completed as f64 / stats.total as f64 * 100.0
    };
    let mut parts = vec![format!("{pct:.0}%"), format!("{completed}/{}", stats.total)];
    if stats.failed > 0 {
        parts.push(format!("({} failed)", stats.failed));
    }
    if let Some(eta) = estimate_remaining(stats) {
        parts.push(format!("ETA {}", format_duration(eta)));
    }
    parts.join(" ")
}

fn create_progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr());
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {msg}")
            .expect("hardcoded template is valid")
            .progress_chars("#>-"),
    );
    bar
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
