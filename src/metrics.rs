use std::sync::LazyLock;

use prometheus::*;

static METRIC_CYCLE_COUNT: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!("imwatch_cycle_count", "count of dispatcher cycles").unwrap()
});

static METRIC_DISPATCH_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "imwatch_dispatch_count",
        "count of worker dispatches",
        &["mode", "result"]
    )
    .unwrap()
});

static METRIC_WORKER_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "imwatch_worker_duration",
        "duration of the worker process in seconds",
        &["mode"],
        vec![0.5, 1., 2.5, 5., 10., 30., 60., 120., 300., 600.]
    )
    .unwrap()
});

static METRIC_MANIFEST_ROWS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!("imwatch_manifest_rows", "count of manifest rows by kind", &["kind"])
        .unwrap()
});

pub fn inc_cycle_count() {
    METRIC_CYCLE_COUNT.inc();
}

/// 记录一次 worker 调度及其结果
pub fn inc_dispatch_count(mode: &str, result: &str) {
    METRIC_DISPATCH_COUNT.with_label_values(&[mode, result]).inc();
}

pub fn observe_worker_duration(mode: &str, duration: f32) {
    METRIC_WORKER_DURATION.with_label_values(&[mode]).observe(duration as f64);
}

/// kind: new / seen / malformed
pub fn inc_manifest_rows(kind: &str, count: usize) {
    METRIC_MANIFEST_ROWS.with_label_values(&[kind]).inc_by(count as u64);
}
