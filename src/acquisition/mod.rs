use async_trait::async_trait;
use metrics::counter;
use std::path::PathBuf;
use tokio::io::AsyncBufReadExt;
use tracing::{info, warn};

use crate::domain::RawRecord;
use crate::error::Result;
use crate::observability::metrics::MetricName;

pub mod downloader;

pub use downloader::ArchiveDownloader;

/// A source of raw review records. The pipeline consumes a finite, ordered
/// sequence of records per source; how they were obtained is the source's
/// business.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Identifier used in logs and provenance.
    fn source_id(&self) -> String;

    /// Source category every record of this source belongs to.
    fn category(&self) -> &str;

    async fn fetch_raw_records(&self) -> Result<Vec<RawRecord>>;
}

/// Reads line-delimited JSON review records from a local file, as produced by
/// archive extraction. Malformed lines are counted and skipped, never fatal.
pub struct NdjsonFileSource {
    path: PathBuf,
    category: String,
}

impl NdjsonFileSource {
    pub fn new(path: impl Into<PathBuf>, category: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            category: category.into(),
        }
    }
}

#[async_trait]
impl RecordSource for NdjsonFileSource {
    fn source_id(&self) -> String {
        format!("ndjson:{}", self.path.display())
    }

    fn category(&self) -> &str {
        &self.category
    }

    async fn fetch_raw_records(&self) -> Result<Vec<RawRecord>> {
        let file = tokio::fs::File::open(&self.path).await?;
        let mut lines = tokio::io::BufReader::new(file).lines();

        let mut records = Vec::new();
        let mut malformed = 0u64;
        let mut line_number = 0u64;

        while let Some(line) = lines.next_line().await? {
            line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RawRecord>(&line) {
                Ok(mut record) => {
                    // Per-category archives carry no category field of their
                    // own; the source knows which one it serves.
                    if let Some(fields) = record.as_object_mut() {
                        fields
                            .entry("category")
                            .or_insert_with(|| serde_json::Value::String(self.category.clone()));
                    }
                    records.push(record);
                }
                Err(e) => {
                    malformed += 1;
                    warn!(
                        source = %self.source_id(),
                        line = line_number,
                        "Skipping malformed record line: {}",
                        e
                    );
                }
            }
        }

        counter!(MetricName::SourceRecordsFetched.as_str()).increment(records.len() as u64);
        if malformed > 0 {
            counter!(MetricName::SourceMalformedLines.as_str()).increment(malformed);
        }
        info!(
            source = %self.source_id(),
            records = records.len(),
            malformed,
            "Fetched raw records"
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[tokio::test]
    async fn reads_records_and_injects_category() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"reviewerID": "A1", "asin": "B1"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"reviewerID": "A2", "asin": "B2", "category": "Other"}}"#).unwrap();

        let source = NdjsonFileSource::new(file.path(), "Books");
        let records = source.fetch_raw_records().await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["category"], json!("Books"));
        // An explicit source category is left alone
        assert_eq!(records[1]["category"], json!("Other"));
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped_not_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"reviewerID": "A1"}}"#).unwrap();
        writeln!(file, "this is not json").unwrap();
        writeln!(file, r#"{{"reviewerID": "A2"}}"#).unwrap();

        let source = NdjsonFileSource::new(file.path(), "Books");
        let records = source.fetch_raw_records().await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let source = NdjsonFileSource::new("definitely/not/here.json", "Books");
        assert!(source.fetch_raw_records().await.is_err());
    }
}
