use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

pub struct Metrics {
    // Counters
    total_runs: AtomicUsize,
    successful_runs: AtomicUsize,
    failed_runs: AtomicUsize,
    cache_hits: AtomicUsize,
    model_calls: AtomicUsize,

    // Timing (in microseconds)
    total_model_time_us: AtomicU64,
    total_assemble_time_us: AtomicU64,
    total_layout_time_us: AtomicU64,

    // Counts
    total_entities: AtomicUsize,
    total_relationships: AtomicUsize,
    total_dropped: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            total_runs: AtomicUsize::new(0),
            successful_runs: AtomicUsize::new(0),
            failed_runs: AtomicUsize::new(0),
            cache_hits: AtomicUsize::new(0),
            model_calls: AtomicUsize::new(0),
            total_model_time_us: AtomicU64::new(0),
            total_assemble_time_us: AtomicU64::new(0),
            total_layout_time_us: AtomicU64::new(0),
            total_entities: AtomicUsize::new(0),
            total_relationships: AtomicUsize::new(0),
            total_dropped: AtomicUsize::new(0),
        })
    }

    pub fn record_run(&self, success: bool) {
        self.total_runs.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_runs.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_runs.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_model_call(&self, duration: Duration) {
        self.model_calls.fetch_add(1, Ordering::Relaxed);
        self.total_model_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_extraction(&self, entities: usize, relationships: usize, dropped: usize) {
        self.total_entities.fetch_add(entities, Ordering::Relaxed);
        self.total_relationships.fetch_add(relationships, Ordering::Relaxed);
        self.total_dropped.fetch_add(dropped, Ordering::Relaxed);
    }

    pub fn record_assemble(&self, duration: Duration) {
        self.total_assemble_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_layout(&self, duration: Duration) {
        self.total_layout_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let successes = self.successful_runs.load(Ordering::Relaxed);
        MetricsSnapshot {
            total_runs: self.total_runs.load(Ordering::Relaxed),
            successful_runs: successes,
            failed_runs: self.failed_runs.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            model_calls: self.model_calls.load(Ordering::Relaxed),
            avg_model_time_ms: avg_time_ms(
                &self.total_model_time_us,
                self.model_calls.load(Ordering::Relaxed),
            ),
            avg_assemble_time_ms: avg_time_ms(&self.total_assemble_time_us, successes),
            avg_layout_time_ms: avg_time_ms(&self.total_layout_time_us, successes),
            total_entities: self.total_entities.load(Ordering::Relaxed),
            total_relationships: self.total_relationships.load(Ordering::Relaxed),
            total_dropped: self.total_dropped.load(Ordering::Relaxed),
        }
    }
}

fn avg_time_ms(total_us: &AtomicU64, count: usize) -> f64 {
    let total = total_us.load(Ordering::Relaxed) as f64;
    if count > 0 {
        total / count as f64 / 1000.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_runs: usize,
    pub successful_runs: usize,
    pub failed_runs: usize,
    pub cache_hits: usize,
    pub model_calls: usize,
    pub avg_model_time_ms: f64,
    pub avg_assemble_time_ms: f64,
    pub avg_layout_time_ms: f64,
    pub total_entities: usize,
    pub total_relationships: usize,
    pub total_dropped: usize,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let metrics = Metrics::new();
        metrics.record_run(true);
        metrics.record_run(false);
        metrics.record_cache_hit();
        metrics.record_model_call(Duration::from_millis(4));
        metrics.record_extraction(3, 2, 1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_runs, 2);
        assert_eq!(snapshot.successful_runs, 1);
        assert_eq!(snapshot.failed_runs, 1);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.avg_model_time_ms, 4.0);
        assert_eq!(snapshot.total_entities, 3);
        assert_eq!(snapshot.total_dropped, 1);
    }

    #[test]
    fn test_averages_are_zero_without_samples() {
        let snapshot = Metrics::new().snapshot();
        assert_eq!(snapshot.avg_model_time_ms, 0.0);
        assert_eq!(snapshot.avg_layout_time_ms, 0.0);
    }
}
