//! Metric name catalog for the review pipeline.
//!
//! Counters and histograms are emitted through the `metrics` crate macros;
//! this enum keeps the Prometheus-style names in one place instead of magic
//! strings at every call site.

use std::fmt;

/// All metric names used in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Acquisition
    SourceRecordsFetched,
    SourceFetchErrors,
    SourceMalformedLines,

    // Validation
    ValidateRecordsAccepted,
    ValidateRecordsRejected,

    // Deduplication
    DedupDuplicatesDropped,

    // Enrichment
    EnrichRecordsEnriched,
    EnrichConversionFailures,

    // Document store
    StoreDocumentsInserted,
    StoreInsertErrors,
    StorePersistDurationSeconds,

    // Pipeline
    PipelineRuns,
    PipelineDurationSeconds,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::SourceRecordsFetched => "reviews_source_records_fetched_total",
            MetricName::SourceFetchErrors => "reviews_source_fetch_errors_total",
            MetricName::SourceMalformedLines => "reviews_source_malformed_lines_total",
            MetricName::ValidateRecordsAccepted => "reviews_validate_records_accepted_total",
            MetricName::ValidateRecordsRejected => "reviews_validate_records_rejected_total",
            MetricName::DedupDuplicatesDropped => "reviews_dedup_duplicates_dropped_total",
            MetricName::EnrichRecordsEnriched => "reviews_enrich_records_enriched_total",
            MetricName::EnrichConversionFailures => "reviews_enrich_conversion_failures_total",
            MetricName::StoreDocumentsInserted => "reviews_store_documents_inserted_total",
            MetricName::StoreInsertErrors => "reviews_store_insert_errors_total",
            MetricName::StorePersistDurationSeconds => "reviews_store_persist_duration_seconds",
            MetricName::PipelineRuns => "reviews_pipeline_runs_total",
            MetricName::PipelineDurationSeconds => "reviews_pipeline_duration_seconds",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_follow_prometheus_conventions() {
        let counters = [
            MetricName::SourceRecordsFetched,
            MetricName::ValidateRecordsRejected,
            MetricName::DedupDuplicatesDropped,
            MetricName::StoreDocumentsInserted,
            MetricName::PipelineRuns,
        ];
        for name in counters {
            assert!(name.as_str().starts_with("reviews_"));
            assert!(name.as_str().ends_with("_total"));
        }
        assert!(MetricName::PipelineDurationSeconds
            .as_str()
            .ends_with("_seconds"));
    }
}
