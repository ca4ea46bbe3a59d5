use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Label set of every HTTP metric.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Labels {
    pub service: String,
    pub path: String,
}

impl Labels {
    pub fn new(service: impl Into<String>, path: impl Into<String>) -> Self {
        Labels {
            service: service.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    Request,
    RequestError,
}

impl Counter {
    pub fn name(&self) -> &'static str {
        match self {
            Counter::Request => "http_requests_total",
            Counter::RequestError => "http_requests_errors_total",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gauge {
    /// Unix timestamp in seconds of the latest request.
    LastRequest,
}

impl Gauge {
    pub fn name(&self) -> &'static str {
        match self {
            Gauge::LastRequest => "http_request_timestamp",
        }
    }
}

/// Sink for handler metrics. Implementations must tolerate concurrent
/// calls.
pub trait Metrics: Send + Sync {
    fn increment(&self, counter: Counter, labels: &Labels);

    fn set(&self, gauge: Gauge, labels: &Labels, value: f64);

    fn request(&self, labels: &Labels) {
        self.increment(Counter::Request, labels);
        self.set(Gauge::LastRequest, labels, now());
    }

    fn request_error(&self, labels: &Labels) {
        self.increment(Counter::RequestError, labels);
        self.set(Gauge::LastRequest, labels, now());
    }
}

fn now() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn increment(&self, _: Counter, _: &Labels) {}

    fn set(&self, _: Gauge, _: &Labels, _: f64) {}
}

/// In-process metrics backed by atomics.
#[derive(Debug, Default)]
pub struct HttpMetrics {
    counters: DashMap<(Counter, Labels), AtomicU64>,
    gauges: DashMap<(Gauge, Labels), AtomicU64>,
}

impl HttpMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, counter: Counter, labels: &Labels) -> u64 {
        self.counters
            .get(&(counter, labels.clone()))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn gauge(&self, gauge: Gauge, labels: &Labels) -> Option<f64> {
        self.gauges
            .get(&(gauge, labels.clone()))
            .map(|g| f64::from_bits(g.load(Ordering::Relaxed)))
    }
}

impl Metrics for HttpMetrics {
    fn increment(&self, counter: Counter, labels: &Labels) {
        if let Some(existing) = self.counters.get(&(counter, labels.clone())) {
            existing.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.counters
            .entry((counter, labels.clone()))
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    fn set(&self, gauge: Gauge, labels: &Labels, value: f64) {
        self.gauges
            .entry((gauge, labels.clone()))
            .or_default()
            .store(value.to_bits(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counters_are_labelled() {
        let metrics = HttpMetrics::new();
        let pets = Labels::new("Petstore", "/pets");
        let users = Labels::new("Petstore", "/users");
        metrics.request(&pets);
        metrics.request(&pets);
        metrics.request_error(&users);
        assert_eq!(metrics.counter(Counter::Request, &pets), 2);
        assert_eq!(metrics.counter(Counter::RequestError, &pets), 0);
        assert_eq!(metrics.counter(Counter::RequestError, &users), 1);
        assert!(metrics.gauge(Gauge::LastRequest, &users).unwrap() > 0.0);
    }

    #[test]
    fn test_concurrent_increments() {
        let metrics = Arc::new(HttpMetrics::new());
        let labels = Labels::new("api", "/");
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                let labels = labels.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        metrics.increment(Counter::Request, &labels);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(metrics.counter(Counter::Request, &labels), 400);
    }
}
