//! Prometheus-backed metrics registry and render helper.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes typed increment/observe/set methods instead of raw collectors.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, Opts, Registry, TextEncoder,
};

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    http_requests_total: IntCounterVec,
    file_operations_total: IntCounterVec,
    index_files: IntGaugeVec,
    index_active_bytes: IntGauge,
    gc_runs_total: IntCounter,
    gc_expired_total: IntCounter,
    gc_purged_total: IntCounter,
    gc_errors_total: IntCounter,
    gc_duration_seconds: Histogram,
    reconcile_runs_total: IntCounter,
    reconcile_issues_total: IntCounterVec,
    reconcile_duration_seconds: Histogram,
    file_sync_duration_seconds: HistogramVec,
    file_sync_files_total: IntCounterVec,
    sa_sync_duration_seconds: Histogram,
    sa_sync_items_total: IntCounterVec,
    dependency_up: IntGaugeVec,
    dependency_latency_seconds: HistogramVec,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests received"),
            &["route", "code"],
        )?;
        let file_operations_total = IntCounterVec::new(
            Opts::new(
                "file_operations_total",
                "File operations executed by the storage element",
            ),
            &["operation"],
        )?;
        let index_files = IntGaugeVec::new(
            Opts::new("index_files", "Files tracked by the in-memory index"),
            &["status"],
        )?;
        let index_active_bytes = IntGauge::with_opts(Opts::new(
            "index_active_bytes",
            "Bytes consumed by active files",
        ))?;
        let gc_runs_total =
            IntCounter::with_opts(Opts::new("gc_runs_total", "Garbage collector runs"))?;
        let gc_expired_total = IntCounter::with_opts(Opts::new(
            "gc_expired_total",
            "Files expired by the garbage collector",
        ))?;
        let gc_purged_total = IntCounter::with_opts(Opts::new(
            "gc_purged_total",
            "Soft-deleted files physically purged",
        ))?;
        let gc_errors_total = IntCounter::with_opts(Opts::new(
            "gc_errors_total",
            "Per-file failures during garbage collection",
        ))?;
        let gc_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "gc_duration_seconds",
            "Garbage collector run duration",
        ))?;
        let reconcile_runs_total =
            IntCounter::with_opts(Opts::new("reconcile_runs_total", "Reconciler passes"))?;
        let reconcile_issues_total = IntCounterVec::new(
            Opts::new(
                "reconcile_issues_total",
                "Consistency issues found by the reconciler",
            ),
            &["kind"],
        )?;
        let reconcile_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "reconcile_duration_seconds",
            "Reconciler pass duration",
        ))?;
        let file_sync_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "file_sync_duration_seconds",
                "Per-element file synchronization duration",
            ),
            &["se_id"],
        )?;
        let file_sync_files_total = IntCounterVec::new(
            Opts::new(
                "file_sync_files_total",
                "Registry rows touched by file synchronization",
            ),
            &["se_id", "action"],
        )?;
        let sa_sync_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "sa_sync_duration_seconds",
            "Service-account synchronization pass duration",
        ))?;
        let sa_sync_items_total = IntCounterVec::new(
            Opts::new(
                "sa_sync_items_total",
                "Service accounts touched by synchronization",
            ),
            &["action"],
        )?;
        let dependency_up = IntGaugeVec::new(
            Opts::new("dependency_up", "Dependency checker health (1 = healthy)"),
            &["checker"],
        )?;
        let dependency_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "dependency_latency_seconds",
                "Dependency checker probe latency",
            ),
            &["checker"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(file_operations_total.clone()))?;
        registry.register(Box::new(index_files.clone()))?;
        registry.register(Box::new(index_active_bytes.clone()))?;
        registry.register(Box::new(gc_runs_total.clone()))?;
        registry.register(Box::new(gc_expired_total.clone()))?;
        registry.register(Box::new(gc_purged_total.clone()))?;
        registry.register(Box::new(gc_errors_total.clone()))?;
        registry.register(Box::new(gc_duration_seconds.clone()))?;
        registry.register(Box::new(reconcile_runs_total.clone()))?;
        registry.register(Box::new(reconcile_issues_total.clone()))?;
        registry.register(Box::new(reconcile_duration_seconds.clone()))?;
        registry.register(Box::new(file_sync_duration_seconds.clone()))?;
        registry.register(Box::new(file_sync_files_total.clone()))?;
        registry.register(Box::new(sa_sync_duration_seconds.clone()))?;
        registry.register(Box::new(sa_sync_items_total.clone()))?;
        registry.register(Box::new(dependency_up.clone()))?;
        registry.register(Box::new(dependency_latency_seconds.clone()))?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                http_requests_total,
                file_operations_total,
                index_files,
                index_active_bytes,
                gc_runs_total,
                gc_expired_total,
                gc_purged_total,
                gc_errors_total,
                gc_duration_seconds,
                reconcile_runs_total,
                reconcile_issues_total,
                reconcile_duration_seconds,
                file_sync_duration_seconds,
                file_sync_files_total,
                sa_sync_duration_seconds,
                sa_sync_items_total,
                dependency_up,
                dependency_latency_seconds,
            }),
        })
    }

    /// Increment the HTTP request counter for the given route and status.
    pub fn inc_http_request(&self, route: &str, status: u16) {
        self.inner
            .http_requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }

    /// Increment the file-operation counter.
    pub fn inc_file_operation(&self, operation: &str) {
        self.inner
            .file_operations_total
            .with_label_values(&[operation])
            .inc();
    }

    /// Set the per-status index file gauge.
    pub fn set_index_files(&self, status: &str, count: i64) {
        self.inner
            .index_files
            .with_label_values(&[status])
            .set(count);
    }

    /// Set the active-bytes gauge.
    pub fn set_index_active_bytes(&self, bytes: i64) {
        self.inner.index_active_bytes.set(bytes);
    }

    /// Record the outcome of one garbage-collector run.
    pub fn observe_gc_run(&self, duration: Duration, expired: u64, purged: u64, errors: u64) {
        self.inner.gc_runs_total.inc();
        self.inner.gc_expired_total.inc_by(expired);
        self.inner.gc_purged_total.inc_by(purged);
        self.inner.gc_errors_total.inc_by(errors);
        self.inner.gc_duration_seconds.observe(duration.as_secs_f64());
    }

    /// Record the outcome of one reconciler pass.
    pub fn observe_reconcile_run(&self, duration: Duration) {
        self.inner.reconcile_runs_total.inc();
        self.inner
            .reconcile_duration_seconds
            .observe(duration.as_secs_f64());
    }

    /// Increment the reconciler issue counter for an issue kind.
    pub fn inc_reconcile_issue(&self, kind: &str) {
        self.inner
            .reconcile_issues_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Record the duration of one per-element file synchronization.
    pub fn observe_file_sync(&self, se_id: &str, duration: Duration) {
        self.inner
            .file_sync_duration_seconds
            .with_label_values(&[se_id])
            .observe(duration.as_secs_f64());
    }

    /// Increment the file synchronization action counter.
    pub fn inc_file_sync_action(&self, se_id: &str, action: &str, count: u64) {
        self.inner
            .file_sync_files_total
            .with_label_values(&[se_id, action])
            .inc_by(count);
    }

    /// Record the duration of one service-account synchronization pass.
    pub fn observe_sa_sync(&self, duration: Duration) {
        self.inner
            .sa_sync_duration_seconds
            .observe(duration.as_secs_f64());
    }

    /// Increment the service-account synchronization action counter.
    pub fn inc_sa_sync_action(&self, action: &str) {
        self.inner
            .sa_sync_items_total
            .with_label_values(&[action])
            .inc();
    }

    /// Set the health gauge for a dependency checker.
    pub fn set_dependency_up(&self, checker: &str, healthy: bool) {
        self.inner
            .dependency_up
            .with_label_values(&[checker])
            .set(i64::from(healthy));
    }

    /// Record a dependency checker probe latency.
    pub fn observe_dependency_latency(&self, checker: &str, duration: Duration) {
        self.inner
            .dependency_latency_seconds
            .with_label_values(&[checker])
            .observe(duration.as_secs_f64());
    }

    /// Render the registry in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
