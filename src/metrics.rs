use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Handler latencies recorded per scheduler
const LATENCY_WINDOW: usize = 1000;

/// The most recent handler latencies, oldest evicted first
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: Arc<Mutex<VecDeque<Duration>>>,
    capacity: usize,
}

impl LatencyWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, latency: Duration) {
        let mut samples = self.samples.lock();
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(latency);
    }

    /// Nearest-rank percentiles in microseconds, one per requested rank in
    /// `0.0..=1.0`. An empty window reports zeros.
    pub fn percentiles_us<const N: usize>(&self, ranks: [f64; N]) -> [f64; N] {
        let mut sorted: Vec<Duration> = self.samples.lock().iter().copied().collect();
        sorted.sort_unstable();
        ranks.map(|rank| {
            let nearest = (sorted.len() as f64 * rank).ceil() as usize;
            sorted
                .get(nearest.saturating_sub(1))
                .map_or(0.0, |latency| latency.as_nanos() as f64 / 1000.0)
        })
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-scheduler metrics collector.
///
/// Handler latency is measured on the calling thread, since direct schedulers
/// run handlers wherever data is put, and includes forwarding the results
/// downstream.
#[derive(Debug, Clone)]
pub struct SchedulerMetrics {
    tasks_handled: Arc<AtomicU64>,
    tasks_squelched: Arc<AtomicU64>,
    /// Callers that had to wait for unhandled-task capacity
    held_back: Arc<AtomicU64>,
    /// Offers turned away because the scheduler was full
    offers_rejected: Arc<AtomicU64>,
    latencies: LatencyWindow,
    start_time: Instant,
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        Self {
            tasks_handled: Arc::new(AtomicU64::new(0)),
            tasks_squelched: Arc::new(AtomicU64::new(0)),
            held_back: Arc::new(AtomicU64::new(0)),
            offers_rejected: Arc::new(AtomicU64::new(0)),
            latencies: LatencyWindow::new(LATENCY_WINDOW),
            start_time: Instant::now(),
        }
    }

    /// Count one handled task and its latency, forwarding included
    pub fn record_handled(&self, latency: Duration) {
        self.tasks_handled.fetch_add(1, Ordering::Relaxed);
        self.latencies.record(latency);
    }

    pub fn record_squelched(&self) {
        self.tasks_squelched.fetch_add(1, Ordering::Relaxed);
    }

    /// A `put` had to wait for capacity
    pub fn record_held_back(&self) {
        self.held_back.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_offer_rejected(&self) {
        self.offers_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Tasks whose handler ran to completion
    pub fn total_handled(&self) -> u64 {
        self.tasks_handled.load(Ordering::Relaxed)
    }

    pub fn total_squelched(&self) -> u64 {
        self.tasks_squelched.load(Ordering::Relaxed)
    }

    pub fn total_held_back(&self) -> u64 {
        self.held_back.load(Ordering::Relaxed)
    }

    /// Offers turned away because the scheduler was full
    pub fn total_offers_rejected(&self) -> u64 {
        self.offers_rejected.load(Ordering::Relaxed)
    }

    /// Handled tasks per second since the scheduler was built
    pub fn throughput_tps(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            0.0
        } else {
            self.total_handled() as f64 / elapsed
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let [p50, p95, p99] = self.latencies.percentiles_us([0.50, 0.95, 0.99]);
        MetricsSnapshot {
            total_handled: self.total_handled(),
            total_squelched: self.total_squelched(),
            total_held_back: self.total_held_back(),
            total_offers_rejected: self.total_offers_rejected(),
            throughput_tps: self.throughput_tps(),
            latency_p50_us: p50,
            latency_p95_us: p95,
            latency_p99_us: p99,
            elapsed: self.start_time.elapsed(),
        }
    }
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub total_handled: u64,
    pub total_squelched: u64,
    pub total_held_back: u64,
    pub total_offers_rejected: u64,
    pub throughput_tps: f64,
    pub latency_p50_us: f64,
    pub latency_p95_us: f64,
    pub latency_p99_us: f64,
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Format metrics as a human-readable string
    pub fn format(&self) -> String {
        format!(
            "Handled: {}, Squelched: {}, Held back: {}, Offers rejected: {}, \
             Throughput: {:.2} tasks/s, Latency P50: {:.2}µs, P95: {:.2}µs, P99: {:.2}µs",
            self.total_handled,
            self.total_squelched,
            self.total_held_back,
            self.total_offers_rejected,
            self.throughput_tps,
            self.latency_p50_us,
            self.latency_p95_us,
            self.latency_p99_us,
        )
    }
}
