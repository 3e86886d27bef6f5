use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    items_uploaded: AtomicU64,
    bytes_uploaded: AtomicU64,
    rows_rewritten: AtomicU64,
    chunks_processed: AtomicU64,
    failure_count: AtomicU64,
    retry_count: AtomicU64,
}

/// Process-wide counters, cheap to clone and share between workers.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub items_uploaded: u64,
    pub bytes_uploaded: u64,
    pub rows_rewritten: u64,
    pub chunks_processed: u64,
    pub failure_count: u64,
    pub retry_count: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn increment_uploads(&self, count: u64) {
        self.inner.items_uploaded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_bytes(&self, count: u64) {
        self.inner.bytes_uploaded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_rows(&self, count: u64) {
        self.inner.rows_rewritten.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_chunks(&self, count: u64) {
        self.inner
            .chunks_processed
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_failures(&self, count: u64) {
        self.inner.failure_count.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_retries(&self, count: u64) {
        self.inner.retry_count.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items_uploaded: self.inner.items_uploaded.load(Ordering::Relaxed),
            bytes_uploaded: self.inner.bytes_uploaded.load(Ordering::Relaxed),
            rows_rewritten: self.inner.rows_rewritten.load(Ordering::Relaxed),
            chunks_processed: self.inner.chunks_processed.load(Ordering::Relaxed),
            failure_count: self.inner.failure_count.load(Ordering::Relaxed),
            retry_count: self.inner.retry_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_counters() {
        let metrics = Metrics::new();
        let worker = metrics.clone();
        worker.increment_uploads(2);
        worker.increment_bytes(1024);
        metrics.increment_failures(1);

        let snap = metrics.snapshot();
        assert_eq!(snap.items_uploaded, 2);
        assert_eq!(snap.bytes_uploaded, 1024);
        assert_eq!(snap.failure_count, 1);
        assert_eq!(snap.retry_count, 0);
    }
}
