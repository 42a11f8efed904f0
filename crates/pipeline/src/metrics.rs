use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use schema::FileState;
use std::time::Duration;

#[derive(Clone)]
pub struct PipelineMetrics {
    files_total: Counter<u64>,
    files_failed: Counter<u64>,
    file_duration: Histogram<f64>,
}

impl PipelineMetrics {
    pub fn new(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 0.75, 1.0, 2.0, 5.0,
        ];
        let file_duration = meter
            .f64_histogram("pipeline_file_duration_seconds")
            .with_description("Time to analyze a single file (decode + color + classify)")
            .with_unit("s")
            .with_boundaries(latency_buckets.to_vec())
            .build();
        let files_total = meter
            .u64_counter("pipeline_files_total")
            .with_description("Total files that reached a terminal state")
            .build();
        let files_failed = meter
            .u64_counter("pipeline_files_failed_total")
            .with_description("Files that failed outright or fell back to placeholders")
            .build();

        Self {
            files_total,
            files_failed,
            file_duration,
        }
    }

    pub fn record(&self, state: FileState, elapsed: Duration) {
        let attributes = [KeyValue::new("state", format!("{state:?}"))];
        self.files_total.add(1, &attributes);
        if matches!(state, FileState::Failed | FileState::PartiallyFailed) {
            self.files_failed.add(1, &attributes);
        }
        self.file_duration.record(elapsed.as_secs_f64(), &attributes);
    }
}
