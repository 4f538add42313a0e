//! Metrics collection for stackit.
//!
//! Counters are process-local atomics exported as a JSON snapshot or in
//! Prometheus text format.

use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Global metrics instance.
static METRICS: std::sync::OnceLock<Arc<Metrics>> = std::sync::OnceLock::new();

/// Get the global metrics instance.
pub fn get_metrics() -> &'static Arc<Metrics> {
    METRICS.get_or_init(|| Arc::new(Metrics::new()))
}

/// Application metrics collector.
#[derive(Debug)]
pub struct Metrics {
    // === Request Metrics ===
    /// Total HTTP requests received
    pub http_requests_total: AtomicU64,
    /// Active HTTP requests
    pub http_requests_active: AtomicU64,
    /// HTTP requests answered with a 2xx status
    pub http_requests_2xx: AtomicU64,
    /// HTTP requests answered with a 4xx status
    pub http_requests_4xx: AtomicU64,
    /// HTTP requests answered with a 5xx status
    pub http_requests_5xx: AtomicU64,
    /// Total request latency in microseconds
    pub http_request_latency_us_total: AtomicU64,

    // === Ledger Metrics ===
    /// Transactions committed
    pub txn_committed: AtomicU64,
    /// Attempts retried after a write conflict
    pub txn_conflicts_retried: AtomicU64,
    /// Transactions that ran out of attempts
    pub txn_exhausted: AtomicU64,
    /// Best-effort karma/badge updates that failed after the content commit
    pub bookkeeping_failures: AtomicU64,

    // === Content Metrics ===
    /// Questions created
    pub questions_created: AtomicU64,
    /// Answers posted
    pub answers_posted: AtomicU64,
    /// Answers accepted (including reassignments)
    pub answers_accepted: AtomicU64,
    /// Vote toggles applied
    pub votes_cast: AtomicU64,
    /// Users registered
    pub users_registered: AtomicU64,
    /// Follow relationships created
    pub follows_created: AtomicU64,

    // === Real-time Metrics ===
    /// Active SSE connections
    pub sse_connections_active: AtomicU64,
    /// AI collaborator requests that failed
    pub ai_failures: AtomicU64,
}

impl Metrics {
    /// Create a new metrics instance with all counters at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            http_requests_total: AtomicU64::new(0),
            http_requests_active: AtomicU64::new(0),
            http_requests_2xx: AtomicU64::new(0),
            http_requests_4xx: AtomicU64::new(0),
            http_requests_5xx: AtomicU64::new(0),
            http_request_latency_us_total: AtomicU64::new(0),

            txn_committed: AtomicU64::new(0),
            txn_conflicts_retried: AtomicU64::new(0),
            txn_exhausted: AtomicU64::new(0),
            bookkeeping_failures: AtomicU64::new(0),

            questions_created: AtomicU64::new(0),
            answers_posted: AtomicU64::new(0),
            answers_accepted: AtomicU64::new(0),
            votes_cast: AtomicU64::new(0),
            users_registered: AtomicU64::new(0),
            follows_created: AtomicU64::new(0),

            sse_connections_active: AtomicU64::new(0),
            ai_failures: AtomicU64::new(0),
        }
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, status_code: u16, latency: Duration) {
        self.http_requests_total.fetch_add(1, Ordering::Relaxed);

        match status_code {
            200..=299 => self.http_requests_2xx.fetch_add(1, Ordering::Relaxed),
            400..=499 => self.http_requests_4xx.fetch_add(1, Ordering::Relaxed),
            500..=599 => self.http_requests_5xx.fetch_add(1, Ordering::Relaxed),
            _ => 0,
        };

        self.http_request_latency_us_total
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    /// Start tracking an active request.
    pub fn start_request(&self) {
        self.http_requests_active.fetch_add(1, Ordering::Relaxed);
    }

    /// End tracking an active request.
    pub fn end_request(&self) {
        self.http_requests_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record the outcome of one transaction attempt.
    pub fn record_txn_attempt(&self, committed: bool) {
        if committed {
            self.txn_committed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.txn_conflicts_retried.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a transaction that gave up after its last attempt.
    pub fn record_txn_exhausted(&self) {
        self.txn_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    /// Track an opened event stream.
    pub fn sse_opened(&self) {
        self.sse_connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Track a closed event stream.
    pub fn sse_closed(&self) {
        self.sse_connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a failed best-effort karma, badge or notification write.
    pub fn record_bookkeeping_failure(&self) {
        self.bookkeeping_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment a content counter.
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            http_requests_total: load(&self.http_requests_total),
            http_requests_active: load(&self.http_requests_active),
            http_requests_2xx: load(&self.http_requests_2xx),
            http_requests_4xx: load(&self.http_requests_4xx),
            http_requests_5xx: load(&self.http_requests_5xx),
            http_request_latency_avg_us: self.average_latency_us(),

            txn_committed: load(&self.txn_committed),
            txn_conflicts_retried: load(&self.txn_conflicts_retried),
            txn_exhausted: load(&self.txn_exhausted),
            bookkeeping_failures: load(&self.bookkeeping_failures),

            questions_created: load(&self.questions_created),
            answers_posted: load(&self.answers_posted),
            answers_accepted: load(&self.answers_accepted),
            votes_cast: load(&self.votes_cast),
            users_registered: load(&self.users_registered),
            follows_created: load(&self.follows_created),

            sse_connections_active: load(&self.sse_connections_active),
            ai_failures: load(&self.ai_failures),
        }
    }

    /// Calculate average HTTP request latency.
    fn average_latency_us(&self) -> u64 {
        let total = self.http_request_latency_us_total.load(Ordering::Relaxed);
        let count = self.http_requests_total.load(Ordering::Relaxed);
        if count > 0 { total / count } else { 0 }
    }

    /// Export metrics in Prometheus format.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        let mut output = String::new();

        for (name, kind, help, value) in [
            ("http_requests_total", "counter", "Total HTTP requests", s.http_requests_total),
            ("http_requests_active", "gauge", "Active HTTP requests", s.http_requests_active),
        ] {
            write_metric(&mut output, name, kind, help, value);
        }

        output.push_str("# HELP stackit_http_requests_by_status HTTP requests by status\n");
        output.push_str("# TYPE stackit_http_requests_by_status counter\n");
        for (class, value) in [
            ("2xx", s.http_requests_2xx),
            ("4xx", s.http_requests_4xx),
            ("5xx", s.http_requests_5xx),
        ] {
            let _ = writeln!(
                output,
                "stackit_http_requests_by_status{{status=\"{class}\"}} {value}"
            );
        }

        for (name, kind, help, value) in [
            ("http_request_latency_avg_us", "gauge", "Average request latency", s.http_request_latency_avg_us),
            ("txn_committed", "counter", "Ledger transactions committed", s.txn_committed),
            ("txn_conflicts_retried", "counter", "Attempts retried after a conflict", s.txn_conflicts_retried),
            ("txn_exhausted", "counter", "Transactions out of attempts", s.txn_exhausted),
            ("bookkeeping_failures", "counter", "Failed best-effort karma updates", s.bookkeeping_failures),
            ("questions_created", "counter", "Questions created", s.questions_created),
            ("answers_posted", "counter", "Answers posted", s.answers_posted),
            ("answers_accepted", "counter", "Answers accepted", s.answers_accepted),
            ("votes_cast", "counter", "Votes cast", s.votes_cast),
            ("users_registered", "counter", "Users registered", s.users_registered),
            ("follows_created", "counter", "Follows created", s.follows_created),
            ("sse_connections", "gauge", "Active SSE connections", s.sse_connections_active),
            ("ai_failures", "counter", "Failed AI collaborator requests", s.ai_failures),
        ] {
            write_metric(&mut output, name, kind, help, value);
        }

        output
    }
}

fn write_metric(output: &mut String, name: &str, kind: &str, help: &str, value: u64) {
    let _ = writeln!(output, "# HELP stackit_{name} {help}");
    let _ = writeln!(output, "# TYPE stackit_{name} {kind}");
    let _ = writeln!(output, "stackit_{name} {value}");
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of all metrics at a point in time.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct MetricsSnapshot {
    // HTTP
    pub http_requests_total: u64,
    pub http_requests_active: u64,
    pub http_requests_2xx: u64,
    pub http_requests_4xx: u64,
    pub http_requests_5xx: u64,
    pub http_request_latency_avg_us: u64,

    // Ledger
    pub txn_committed: u64,
    pub txn_conflicts_retried: u64,
    pub txn_exhausted: u64,
    pub bookkeeping_failures: u64,

    // Content
    pub questions_created: u64,
    pub answers_posted: u64,
    pub answers_accepted: u64,
    pub votes_cast: u64,
    pub users_registered: u64,
    pub follows_created: u64,

    // Real-time
    pub sse_connections_active: u64,
    pub ai_failures: u64,
}

/// Timer guard for measuring operation duration.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
