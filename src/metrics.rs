// Session metrics
//
// Lock-free counters for the generation, parse and clipboard flows plus the
// state/UI plumbing. A summary is written to the tracing log at shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters collected over one application session
#[derive(Debug)]
pub struct Metrics {
    /// Calls made to the QR encoder (every retry counts)
    pub encode_attempts: AtomicU64,

    /// Generations that ended with a verified artifact
    pub generations_verified: AtomicU64,

    /// Generations that ended in the failed state (mismatch or hard error)
    pub generations_failed: AtomicU64,

    /// Total time spent in verified generations, in milliseconds
    pub generation_time_ms: AtomicU64,

    pub parses_succeeded: AtomicU64,
    pub parses_failed: AtomicU64,

    /// Individual clipboard mechanisms tried
    pub clipboard_attempts: AtomicU64,

    /// Copies that fell through to manual selection
    pub clipboard_fallbacks: AtomicU64,

    /// State change events delivered to at least one subscriber
    pub state_broadcasts: AtomicU64,

    /// UI updates queued through the event loop bridge
    pub ui_updates: AtomicU64,

    /// UI updates dropped because the bridge channel was full
    pub ui_update_channel_full: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            encode_attempts: AtomicU64::new(0),
            generations_verified: AtomicU64::new(0),
            generations_failed: AtomicU64::new(0),
            generation_time_ms: AtomicU64::new(0),
            parses_succeeded: AtomicU64::new(0),
            parses_failed: AtomicU64::new(0),
            clipboard_attempts: AtomicU64::new(0),
            clipboard_fallbacks: AtomicU64::new(0),
            state_broadcasts: AtomicU64::new(0),
            ui_updates: AtomicU64::new(0),
            ui_update_channel_full: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_encode_attempt(&self) {
        self.encode_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a verified generation and how long it took
    pub fn record_generation_verified(&self, duration: Duration) {
        self.generations_verified.fetch_add(1, Ordering::Relaxed);
        self.generation_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_generation_failed(&self) {
        self.generations_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse(&self, succeeded: bool) {
        if succeeded {
            self.parses_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.parses_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_clipboard_attempt(&self) {
        self.clipboard_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_clipboard_fallback(&self) {
        self.clipboard_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_state_broadcast(&self) {
        self.state_broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ui_update(&self) {
        self.ui_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ui_channel_full(&self) {
        self.ui_update_channel_full.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average wall time of a verified generation in milliseconds
    pub fn avg_generation_time_ms(&self) -> f64 {
        let total = self.generation_time_ms.load(Ordering::Relaxed);
        let count = self.generations_verified.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Session Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Generations: {} verified, {} failed, {} encode attempts (avg: {:.2}ms per verified)",
            self.generations_verified.load(Ordering::Relaxed),
            self.generations_failed.load(Ordering::Relaxed),
            self.encode_attempts.load(Ordering::Relaxed),
            self.avg_generation_time_ms()
        );
        tracing::info!(
            "Parses: {} succeeded, {} failed",
            self.parses_succeeded.load(Ordering::Relaxed),
            self.parses_failed.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Clipboard: {} attempts, {} manual fallbacks",
            self.clipboard_attempts.load(Ordering::Relaxed),
            self.clipboard_fallbacks.load(Ordering::Relaxed)
        );
        tracing::info!(
            "State broadcasts: {}, UI updates: {}, channel full: {}",
            self.state_broadcasts.load(Ordering::Relaxed),
            self.ui_updates.load(Ordering::Relaxed),
            self.ui_update_channel_full.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
