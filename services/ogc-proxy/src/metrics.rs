//! Application metrics collection and reporting.

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::RwLock;

use ogc_protocol::OgcService;

/// Metrics collector for the proxy.
#[derive(Debug)]
pub struct MetricsCollector {
    /// Request counts
    pub wms_requests: AtomicU64,
    pub wfs_requests: AtomicU64,
    pub wmts_requests: AtomicU64,
    pub rejected_requests: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,

    /// Origin stats
    pub upstream_requests: AtomicU64,
    pub upstream_errors: AtomicU64,
    pub cache_clears: AtomicU64,

    /// Timing stats (stored as microseconds for atomic ops)
    upstream_times: RwLock<TimingStats>,

    /// Start time for uptime calculation
    start_time: Instant,
}

#[derive(Debug, Default)]
struct TimingStats {
    count: u64,
    total_us: u64,
    min_us: u64,
    max_us: u64,
    last_us: u64,
}

impl TimingStats {
    fn record(&mut self, duration_us: u64) {
        self.count += 1;
        self.total_us += duration_us;
        self.last_us = duration_us;
        if self.min_us == 0 || duration_us < self.min_us {
            self.min_us = duration_us;
        }
        if duration_us > self.max_us {
            self.max_us = duration_us;
        }
    }

    fn avg_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.total_us as f64 / self.count as f64) / 1000.0
        }
    }

    fn last_ms(&self) -> f64 {
        self.last_us as f64 / 1000.0
    }

    fn max_ms(&self) -> f64 {
        self.max_us as f64 / 1000.0
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            wms_requests: AtomicU64::new(0),
            wfs_requests: AtomicU64::new(0),
            wmts_requests: AtomicU64::new(0),
            rejected_requests: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            upstream_requests: AtomicU64::new(0),
            upstream_errors: AtomicU64::new(0),
            cache_clears: AtomicU64::new(0),
            upstream_times: RwLock::new(TimingStats::default()),
            start_time: Instant::now(),
        }
    }

    /// Record an OGC request
    pub fn record_ows_request(&self, service: OgcService) {
        let counter = match service {
            OgcService::Wms => &self.wms_requests,
            OgcService::Wfs => &self.wfs_requests,
            OgcService::Wmts => &self.wmts_requests,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        counter!("ows_requests_total", "service" => service.as_str()).increment(1);
    }

    /// Record a request that is not an OGC request
    pub fn record_rejected_request(&self) {
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
        counter!("ows_rejected_requests_total").increment(1);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        counter!("cache_hits_total").increment(1);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        counter!("cache_misses_total").increment(1);
    }

    /// Record a call to the origin server
    pub async fn record_upstream(&self, duration_us: u64, status: u16) {
        self.upstream_requests.fetch_add(1, Ordering::Relaxed);
        if status == 0 || status >= 400 {
            self.upstream_errors.fetch_add(1, Ordering::Relaxed);
            counter!("upstream_errors_total").increment(1);
        }
        counter!("upstream_requests_total").increment(1);
        histogram!("upstream_duration_ms").record(duration_us as f64 / 1000.0);

        let mut times = self.upstream_times.write().await;
        times.record(duration_us);
    }

    /// Record a cache invalidation
    pub fn record_cache_clear(&self, scope: &'static str) {
        self.cache_clears.fetch_add(1, Ordering::Relaxed);
        counter!("cache_clears_total", "scope" => scope).increment(1);
    }

    /// Get a snapshot of current metrics
    pub async fn snapshot(&self) -> MetricsSnapshot {
        let upstream_times = self.upstream_times.read().await;

        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let cache_total = cache_hits + cache_misses;
        let cache_hit_rate = if cache_total > 0 {
            (cache_hits as f64 / cache_total as f64) * 100.0
        } else {
            0.0
        };

        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),

            wms_requests: self.wms_requests.load(Ordering::Relaxed),
            wfs_requests: self.wfs_requests.load(Ordering::Relaxed),
            wmts_requests: self.wmts_requests.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),

            cache_hits,
            cache_misses,
            cache_hit_rate,
            cache_clears: self.cache_clears.load(Ordering::Relaxed),

            upstream_requests: self.upstream_requests.load(Ordering::Relaxed),
            upstream_errors: self.upstream_errors.load(Ordering::Relaxed),
            upstream_avg_ms: upstream_times.avg_ms(),
            upstream_last_ms: upstream_times.last_ms(),
            upstream_max_ms: upstream_times.max_ms(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of current metrics for JSON serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,

    // Request counts
    pub wms_requests: u64,
    pub wfs_requests: u64,
    pub wmts_requests: u64,
    pub rejected_requests: u64,

    // Cache stats
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub cache_clears: u64,

    // Origin stats
    pub upstream_requests: u64,
    pub upstream_errors: u64,
    pub upstream_avg_ms: f64,
    pub upstream_last_ms: f64,
    pub upstream_max_ms: f64,
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}
