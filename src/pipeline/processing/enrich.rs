use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::config::{Config, TierConfig};
use crate::domain::{CommercialSegment, RatingTier, ReviewDocument};
use crate::pipeline::processing::clean::CleanedRecord;

/// Source fields consumed into typed document fields; everything else is
/// preserved verbatim in the document's metadata map.
const CONSUMED_FIELDS: [&str; 9] = [
    "reviewerID",
    "asin",
    "overall",
    "reviewText",
    "summary",
    "reviewerName",
    "helpful",
    "unixReviewTime",
    "category",
];

/// Enrichment-stage derivation failure. The affected record is dropped and
/// counted by the pipeline; it never aborts the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// Epoch timestamp was negative, non-numeric, or out of range.
    Timestamp(String),
    /// A field validation guarantees was missing or mistyped anyway.
    Field(String),
}

impl ConversionError {
    pub fn code(&self) -> &'static str {
        match self {
            ConversionError::Timestamp(_) => "timestamp_conversion_error",
            ConversionError::Field(_) => "field_conversion_error",
        }
    }
}

impl std::fmt::Display for ConversionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversionError::Timestamp(detail) => {
                write!(f, "timestamp conversion failed: {}", detail)
            }
            ConversionError::Field(detail) => write!(f, "field conversion failed: {}", detail),
        }
    }
}

/// Trait for turning deduplicated cleaned records into review documents.
pub trait Enricher {
    fn enrich(&self, record: &CleanedRecord) -> Result<ReviewDocument, ConversionError>;
}

/// Default enricher: epoch → ISO date, category → commercial segment via the
/// configured lookup, rating → tier via configured thresholds. Pure; never
/// mutates its input.
pub struct DefaultEnricher {
    segments: BTreeMap<String, String>,
    tiers: TierConfig,
}

impl DefaultEnricher {
    pub fn new(config: &Config) -> Self {
        Self {
            segments: config.categories.clone(),
            tiers: config.tiers.clone(),
        }
    }

    /// Converts epoch seconds into a calendar date. Negative and non-numeric
    /// values are conversion errors, not clamped.
    fn convert_timestamp(&self, value: Option<&Value>) -> Result<(NaiveDate, i64), ConversionError> {
        let value =
            value.ok_or_else(|| ConversionError::Timestamp("timestamp missing".to_string()))?;
        let epoch = match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .ok_or_else(|| {
                    ConversionError::Timestamp(format!("'{}' is not an integer", n))
                })?,
            other => {
                return Err(ConversionError::Timestamp(format!(
                    "'{}' is not numeric",
                    other
                )))
            }
        };
        if epoch < 0 {
            return Err(ConversionError::Timestamp(format!(
                "negative epoch {}",
                epoch
            )));
        }
        let date = DateTime::<Utc>::from_timestamp(epoch, 0)
            .ok_or_else(|| ConversionError::Timestamp(format!("epoch {} out of range", epoch)))?
            .date_naive();
        Ok((date, epoch))
    }

    /// Commercial segment for a category; categories outside the configured
    /// table map to `Other` rather than failing.
    fn segment_for(&self, category: &str) -> CommercialSegment {
        self.segments
            .get(category)
            .map(|name| CommercialSegment::from_name(name))
            .unwrap_or(CommercialSegment::Other)
    }

    fn tier_for(&self, rating: u8) -> RatingTier {
        let rating = f64::from(rating);
        if rating >= self.tiers.excellent {
            RatingTier::Excellent
        } else if rating >= self.tiers.good {
            RatingTier::Good
        } else {
            RatingTier::NeedsImprovement
        }
    }

    fn required_str(record: &CleanedRecord, name: &str) -> Result<String, ConversionError> {
        record
            .str_field(name)
            .map(|s| s.to_string())
            .ok_or_else(|| ConversionError::Field(format!("'{}' missing or not a string", name)))
    }

    fn rating_of(record: &CleanedRecord) -> Result<u8, ConversionError> {
        let value = record
            .get("overall")
            .ok_or_else(|| ConversionError::Field("'overall' missing".to_string()))?;
        let rating = value
            .as_i64()
            .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .ok_or_else(|| ConversionError::Field("'overall' is not an integer".to_string()))?;
        u8::try_from(rating)
            .map_err(|_| ConversionError::Field(format!("rating {} out of range", rating)))
    }

    fn helpful_votes_of(record: &CleanedRecord) -> Option<(u32, u32)> {
        let pair = record.get("helpful")?.as_array()?;
        let up = u32::try_from(pair.first()?.as_u64()?).ok()?;
        let total = u32::try_from(pair.get(1)?.as_u64()?).ok()?;
        Some((up, total))
    }
}

impl Enricher for DefaultEnricher {
    fn enrich(&self, record: &CleanedRecord) -> Result<ReviewDocument, ConversionError> {
        let (review_date, unix_review_time) =
            self.convert_timestamp(record.get("unixReviewTime"))?;

        let reviewer_id = Self::required_str(record, "reviewerID")?;
        let product_id = Self::required_str(record, "asin")?;
        let review_text = Self::required_str(record, "reviewText")?;
        let category = Self::required_str(record, "category")?;
        let rating = Self::rating_of(record)?;

        let commercial_segment = self.segment_for(&category);
        let rating_tier = self.tier_for(rating);

        let extra: BTreeMap<String, Value> = record
            .fields()
            .iter()
            .filter(|(name, _)| !CONSUMED_FIELDS.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Ok(ReviewDocument {
            reviewer_id,
            product_id,
            rating,
            review_text,
            summary: record.str_field("summary").map(|s| s.to_string()),
            reviewer_name: record.str_field("reviewerName").map(|s| s.to_string()),
            helpful_votes: Self::helpful_votes_of(record),
            review_date,
            unix_review_time,
            category,
            commercial_segment,
            analysis_type: commercial_segment.analysis_type().to_string(),
            rating_tier,
            extra,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::clean::FieldCleaner;
    use serde_json::json;

    fn enricher() -> DefaultEnricher {
        DefaultEnricher::new(&Config::default())
    }

    fn cleaned(record: serde_json::Value) -> CleanedRecord {
        FieldCleaner::new(Config::default().cleaning).clean(&record)
    }

    fn base_record() -> serde_json::Value {
        json!({
            "reviewerID": "A2SUAM1J3GNN3B",
            "asin": "0000013714",
            "overall": 5,
            "reviewText": "A classic, can't put it down.",
            "summary": "Classic",
            "reviewerName": "J. Reader",
            "helpful": [2, 3],
            "unixReviewTime": 1252800000i64,
            "reviewTime": "09 13, 2009",
            "category": "Books"
        })
    }

    #[test]
    fn enriches_complete_record() {
        let doc = enricher().enrich(&cleaned(base_record())).unwrap();

        assert_eq!(doc.reviewer_id, "A2SUAM1J3GNN3B");
        assert_eq!(doc.rating, 5);
        assert_eq!(
            doc.review_date,
            NaiveDate::from_ymd_opt(2009, 9, 13).unwrap()
        );
        assert_eq!(doc.unix_review_time, 1252800000);
        assert_eq!(doc.commercial_segment, CommercialSegment::Entertainment);
        assert_eq!(doc.analysis_type, "Leisure/Personal");
        assert_eq!(doc.rating_tier, RatingTier::Excellent);
        assert_eq!(doc.helpful_votes, Some((2, 3)));
        // Unconsumed source fields survive verbatim
        assert_eq!(doc.extra.get("reviewTime"), Some(&json!("09 13, 2009")));
    }

    #[test]
    fn negative_timestamp_is_a_conversion_error() {
        let mut record = base_record();
        record["unixReviewTime"] = json!(-5);
        let err = enricher().enrich(&cleaned(record)).unwrap_err();
        assert_eq!(err.code(), "timestamp_conversion_error");
    }

    #[test]
    fn non_numeric_timestamp_is_a_conversion_error() {
        let mut record = base_record();
        record["unixReviewTime"] = json!("next tuesday");
        let err = enricher().enrich(&cleaned(record)).unwrap_err();
        assert_eq!(err.code(), "timestamp_conversion_error");
    }

    #[test]
    fn unknown_category_maps_to_other_segment() {
        let mut record = base_record();
        record["category"] = json!("Automotive");
        let doc = enricher().enrich(&cleaned(record)).unwrap();
        assert_eq!(doc.commercial_segment, CommercialSegment::Other);
        assert_eq!(doc.analysis_type, "General");
    }

    #[test]
    fn rating_tiers_follow_thresholds() {
        let cases = [
            (5, RatingTier::Excellent),
            (4, RatingTier::Good),
            (3, RatingTier::NeedsImprovement),
            (1, RatingTier::NeedsImprovement),
        ];
        for (rating, expected) in cases {
            let mut record = base_record();
            record["overall"] = json!(rating);
            let doc = enricher().enrich(&cleaned(record)).unwrap();
            assert_eq!(doc.rating_tier, expected, "rating {}", rating);
        }
    }

    #[test]
    fn custom_thresholds_shift_tiers() {
        let mut config = Config::default();
        config.tiers.excellent = 4.0;
        config.tiers.good = 2.0;
        let enricher = DefaultEnricher::new(&config);

        let mut record = base_record();
        record["overall"] = json!(4);
        let doc = enricher.enrich(&cleaned(record)).unwrap();
        assert_eq!(doc.rating_tier, RatingTier::Excellent);
    }

    #[test]
    fn absent_optional_fields_become_none() {
        let mut record = base_record();
        record["summary"] = json!("   ");
        record.as_object_mut().unwrap().remove("reviewerName");
        record["helpful"] = json!("not a pair");
        let doc = enricher().enrich(&cleaned(record)).unwrap();
        assert_eq!(doc.summary, None);
        assert_eq!(doc.reviewer_name, None);
        assert_eq!(doc.helpful_votes, None);
    }
}
