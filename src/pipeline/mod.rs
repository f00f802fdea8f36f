use chrono::Utc;
use metrics::{counter, histogram};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::acquisition::{NdjsonFileSource, RecordSource};
use crate::config::Config;
use crate::domain::StoreMetadata;
use crate::error::Result;
use crate::observability::metrics::MetricName;
use crate::pipeline::processing::clean::FieldCleaner;
use crate::pipeline::processing::dedup::Deduplicator;
use crate::pipeline::processing::enrich::{DefaultEnricher, Enricher};
use crate::pipeline::processing::validate::{RecordValidator, RejectReason};
use crate::storage::{Storage, MASTER_TABLE};

pub mod processing;
pub mod sample;

/// Per-run counters. Every dropped record lands in exactly one bucket; drops
/// never abort the batch.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProcessingStats {
    pub total_records: u64,
    pub stored_records: u64,
    pub rejected_missing_field: u64,
    pub rejected_empty_text: u64,
    pub rejected_rating_out_of_range: u64,
    pub rejected_malformed_type: u64,
    pub duplicates_dropped: u64,
    pub conversion_failures: u64,
}

impl ProcessingStats {
    fn record_reject(&mut self, reason: &RejectReason) {
        match reason {
            RejectReason::MissingRequiredField(_) => self.rejected_missing_field += 1,
            RejectReason::EmptyReviewText => self.rejected_empty_text += 1,
            RejectReason::RatingOutOfRange => self.rejected_rating_out_of_range += 1,
            RejectReason::MalformedType(_) => self.rejected_malformed_type += 1,
        }
    }

    pub fn rejected_total(&self) -> u64 {
        self.rejected_missing_field
            + self.rejected_empty_text
            + self.rejected_rating_out_of_range
            + self.rejected_malformed_type
    }
}

/// Per-category record counts for the run summary.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CategoryOutcome {
    pub fetched: u64,
    pub stored: u64,
}

/// Result of a complete pipeline run.
#[derive(Debug, Serialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub stats: ProcessingStats,
    pub per_category: BTreeMap<String, CategoryOutcome>,
    pub errors: Vec<String>,
    pub elapsed_seconds: f64,
    pub store_path: String,
}

/// The preprocessing-and-storage pipeline: validate → clean → dedup → enrich
/// → dual-write into the document store, as one linear batch. The store is
/// rebuilt whole on every run.
pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// One NDJSON source per configured category whose extraction file exists
    /// under the raw data directory.
    pub fn sources_from_raw_dir(&self) -> Vec<Box<dyn RecordSource>> {
        let mut sources: Vec<Box<dyn RecordSource>> = Vec::new();
        for category in self.config.category_names() {
            let path = self
                .config
                .data
                .raw_dir
                .join(format!("reviews_{}.json", category));
            if path.exists() {
                sources.push(Box::new(NdjsonFileSource::new(path, category)));
            } else {
                warn!(category = %category, path = %path.display(), "No raw file for category");
            }
        }
        sources
    }

    /// Runs the full batch over the given sources and persists the rebuilt
    /// store. Per-record failures are counted and skipped; source fetch
    /// failures skip that source; store-level failures abort the run.
    #[instrument(skip(self, sources, storage), fields(sources = sources.len()))]
    pub async fn run(
        &self,
        sources: Vec<Box<dyn RecordSource>>,
        storage: Arc<dyn Storage>,
    ) -> Result<PipelineResult> {
        let run_id = Uuid::new_v4();
        let started = std::time::Instant::now();
        counter!(MetricName::PipelineRuns.as_str()).increment(1);
        info!(%run_id, "Starting pipeline run");

        let validator = RecordValidator::new();
        let cleaner = FieldCleaner::new(self.config.cleaning.clone());
        let enricher = DefaultEnricher::new(&self.config);
        // One deduplicator across all sources keeps the master table free of
        // cross-source duplicates too.
        let mut deduplicator = Deduplicator::new();

        let mut stats = ProcessingStats::default();
        let mut per_category: BTreeMap<String, CategoryOutcome> = BTreeMap::new();
        let mut errors = Vec::new();
        let mut created_tables = BTreeSet::new();
        let mut processed_categories = BTreeSet::new();

        for source in &sources {
            let category = source.category().to_string();
            let table = self.config.table_for_category(&category);

            if created_tables.insert(table.clone()) {
                storage.create_table(&table).await?;
            }

            info!(source = %source.source_id(), "Fetching raw records");
            let raw_records = match source.fetch_raw_records().await {
                Ok(records) => records,
                Err(e) => {
                    error!(source = %source.source_id(), "Source fetch failed: {}", e);
                    errors.push(format!("source {}: {}", source.source_id(), e));
                    continue;
                }
            };
            processed_categories.insert(category.clone());

            let outcome = per_category.entry(category.clone()).or_default();
            outcome.fetched += raw_records.len() as u64;
            stats.total_records += raw_records.len() as u64;

            for raw in &raw_records {
                if let Err(reason) = validator.validate(raw) {
                    stats.record_reject(&reason);
                    counter!(MetricName::ValidateRecordsRejected.as_str()).increment(1);
                    debug!(reason = reason.code(), "Rejected record");
                    continue;
                }
                counter!(MetricName::ValidateRecordsAccepted.as_str()).increment(1);

                let cleaned = cleaner.clean(raw);

                if !deduplicator.observe(&cleaned) {
                    stats.duplicates_dropped += 1;
                    counter!(MetricName::DedupDuplicatesDropped.as_str()).increment(1);
                    continue;
                }

                let document = match enricher.enrich(&cleaned) {
                    Ok(document) => document,
                    Err(e) => {
                        stats.conversion_failures += 1;
                        counter!(MetricName::EnrichConversionFailures.as_str()).increment(1);
                        warn!(reason = e.code(), "Dropping record: {}", e);
                        continue;
                    }
                };
                counter!(MetricName::EnrichRecordsEnriched.as_str()).increment(1);

                // Store-level failures are fatal to the run, not skipped
                if let Err(e) = storage.insert_review(&table, document).await {
                    counter!(MetricName::StoreInsertErrors.as_str()).increment(1);
                    error!(table = %table, "Insert failed: {}", e);
                    return Err(e);
                }
                counter!(MetricName::StoreDocumentsInserted.as_str()).increment(1);
                stats.stored_records += 1;
                outcome.stored += 1;
            }

            info!(
                category = %category,
                fetched = outcome.fetched,
                stored = outcome.stored,
                "Finished category"
            );
        }

        let record_count = storage.count(MASTER_TABLE).await?;
        storage
            .put_metadata(StoreMetadata {
                record_count,
                categories: processed_categories.iter().cloned().collect(),
                built_at: Utc::now(),
                pipeline_run_id: run_id,
            })
            .await?;

        let persist_started = std::time::Instant::now();
        storage.persist().await?;
        histogram!(MetricName::StorePersistDurationSeconds.as_str())
            .record(persist_started.elapsed().as_secs_f64());

        let elapsed_seconds = started.elapsed().as_secs_f64();
        histogram!(MetricName::PipelineDurationSeconds.as_str()).record(elapsed_seconds);

        let result = PipelineResult {
            run_id,
            stats,
            per_category,
            errors,
            elapsed_seconds,
            store_path: self.config.data.store_path.display().to_string(),
        };
        self.write_summary(&result)?;

        info!(
            %run_id,
            stored = result.stats.stored_records,
            rejected = result.stats.rejected_total(),
            duplicates = result.stats.duplicates_dropped,
            conversion_failures = result.stats.conversion_failures,
            "Pipeline run complete"
        );
        Ok(result)
    }

    /// Writes the per-run preprocessing summary next to the store snapshot.
    fn write_summary(&self, result: &PipelineResult) -> Result<()> {
        let path = &self.config.data.summary_path;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(result)?)?;
        debug!(path = %path.display(), "Wrote preprocessing summary");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DocumentStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct StaticSource {
        category: String,
        records: Vec<serde_json::Value>,
    }

    #[async_trait]
    impl RecordSource for StaticSource {
        fn source_id(&self) -> String {
            format!("static:{}", self.category)
        }

        fn category(&self) -> &str {
            &self.category
        }

        async fn fetch_raw_records(&self) -> Result<Vec<serde_json::Value>> {
            Ok(self.records.clone())
        }
    }

    fn record(reviewer: &str, product: &str, rating: i64, text: &str) -> serde_json::Value {
        json!({
            "reviewerID": reviewer,
            "asin": product,
            "overall": rating,
            "reviewText": text,
            "category": "Books",
            "unixReviewTime": 1252800000i64
        })
    }

    fn test_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.data.store_path = dir.join("store.json");
        config.data.summary_path = dir.join("summary.json");
        config.data.raw_dir = dir.join("raw");
        config
    }

    #[tokio::test]
    async fn run_stores_valid_records_and_counts_drops() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let storage: Arc<dyn Storage> = Arc::new(DocumentStore::new(&config.data.store_path));

        let source = StaticSource {
            category: "Books".to_string(),
            records: vec![
                record("A", "P1", 5, "great"),
                record("A", "P1", 1, "dup"),
                json!({ "asin": "P2", "overall": 4, "reviewText": "no reviewer",
                        "category": "Books", "unixReviewTime": 1252800000i64 }),
                record("B", "P2", 9, "out of range"),
            ],
        };

        let pipeline = Pipeline::new(config.clone());
        let result = pipeline.run(vec![Box::new(source)], storage.clone()).await.unwrap();

        assert_eq!(result.stats.total_records, 4);
        assert_eq!(result.stats.stored_records, 1);
        assert_eq!(result.stats.duplicates_dropped, 1);
        assert_eq!(result.stats.rejected_missing_field, 1);
        assert_eq!(result.stats.rejected_rating_out_of_range, 1);
        assert!(result.errors.is_empty());

        // First-encountered duplicate wins
        let master = storage.get_all(MASTER_TABLE).await.unwrap();
        assert_eq!(master.len(), 1);
        assert_eq!(master[0].rating, 5);

        // Snapshot and summary were written
        assert!(config.data.store_path.exists());
        assert!(config.data.summary_path.exists());
    }

    #[tokio::test]
    async fn metadata_reflects_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let storage: Arc<dyn Storage> = Arc::new(DocumentStore::new(&config.data.store_path));

        let source = StaticSource {
            category: "Books".to_string(),
            records: vec![record("A", "P1", 5, "great"), record("B", "P2", 3, "fine")],
        };

        let result = Pipeline::new(config)
            .run(vec![Box::new(source)], storage.clone())
            .await
            .unwrap();

        let metadata = storage.get_metadata().await.unwrap().unwrap();
        assert_eq!(metadata.record_count, 2);
        assert_eq!(metadata.categories, vec!["Books".to_string()]);
        assert_eq!(metadata.pipeline_run_id, result.run_id);
    }

    #[tokio::test]
    async fn failing_source_is_reported_but_does_not_abort() {
        struct FailingSource;

        #[async_trait]
        impl RecordSource for FailingSource {
            fn source_id(&self) -> String {
                "failing".to_string()
            }
            fn category(&self) -> &str {
                "Video_Games"
            }
            async fn fetch_raw_records(&self) -> Result<Vec<serde_json::Value>> {
                Err(crate::error::PipelineError::Config("boom".to_string()))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let storage: Arc<dyn Storage> = Arc::new(DocumentStore::new(&config.data.store_path));

        let good = StaticSource {
            category: "Books".to_string(),
            records: vec![record("A", "P1", 5, "great")],
        };

        let result = Pipeline::new(config)
            .run(vec![Box::new(FailingSource), Box::new(good)], storage)
            .await
            .unwrap();

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.stats.stored_records, 1);
    }
}
