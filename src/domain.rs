use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Raw review data as returned from acquisition sources, one object per
/// line-delimited JSON record. No invariants hold yet.
pub type RawRecord = serde_json::Value;

/// Commercial segment derived from the source category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommercialSegment {
    Entertainment,
    Home,
    Other,
}

impl CommercialSegment {
    /// Maps a configured segment name onto the closed segment set. Unknown
    /// names collapse into `Other` rather than failing.
    pub fn from_name(name: &str) -> Self {
        match name {
            "Entertainment" => Self::Entertainment,
            "Home" => Self::Home,
            _ => Self::Other,
        }
    }

    pub fn analysis_type(&self) -> &'static str {
        match self {
            Self::Entertainment => "Leisure/Personal",
            Self::Home => "Practical/Utility",
            Self::Other => "General",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entertainment => "Entertainment",
            Self::Home => "Home",
            Self::Other => "Other",
        }
    }
}

/// Categorical bucket derived from the numeric rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingTier {
    Excellent,
    Good,
    NeedsImprovement,
}

impl RatingTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::NeedsImprovement => "needs_improvement",
        }
    }
}

/// A fully processed review ready for storage. Created by the enricher,
/// inserted once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewDocument {
    pub reviewer_id: String,
    pub product_id: String,
    pub rating: u8,
    pub review_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer_name: Option<String>,
    /// (helpful votes, total votes) as reported by the source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helpful_votes: Option<(u32, u32)>,
    /// ISO-8601 date derived from the source epoch timestamp.
    pub review_date: NaiveDate,
    /// Source epoch timestamp, preserved for traceability.
    pub unix_review_time: i64,
    pub category: String,
    pub commercial_segment: CommercialSegment,
    pub analysis_type: String,
    pub rating_tier: RatingTier,
    /// Remaining source fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ReviewDocument {
    /// Composite natural key used for deduplication.
    pub fn dedup_key(&self) -> (String, String) {
        (self.reviewer_id.clone(), self.product_id.clone())
    }

    /// Single field dispatcher used by the query layer. Known typed fields
    /// resolve to their JSON projection; anything else falls through to the
    /// preserved metadata map.
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            "reviewer_id" => Some(json!(self.reviewer_id)),
            "product_id" => Some(json!(self.product_id)),
            "rating" => Some(json!(self.rating)),
            "review_text" => Some(json!(self.review_text)),
            "summary" => self.summary.as_ref().map(|s| json!(s)),
            "reviewer_name" => self.reviewer_name.as_ref().map(|s| json!(s)),
            "helpful_votes" => self.helpful_votes.map(|(up, total)| json!([up, total])),
            "review_date" => Some(json!(self.review_date.format("%Y-%m-%d").to_string())),
            "unix_review_time" => Some(json!(self.unix_review_time)),
            "category" => Some(json!(self.category)),
            "commercial_segment" => Some(json!(self.commercial_segment.as_str())),
            "analysis_type" => Some(json!(self.analysis_type)),
            "rating_tier" => Some(json!(self.rating_tier.as_str())),
            other => self.extra.get(other).cloned(),
        }
    }
}

/// Dataset-level facts, one record per store, overwritten on rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMetadata {
    pub record_count: usize,
    pub categories: Vec<String>,
    pub built_at: DateTime<Utc>,
    pub pipeline_run_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> ReviewDocument {
        ReviewDocument {
            reviewer_id: "A1".to_string(),
            product_id: "B001".to_string(),
            rating: 5,
            review_text: "Great read".to_string(),
            summary: Some("Great".to_string()),
            reviewer_name: None,
            helpful_votes: Some((3, 4)),
            review_date: NaiveDate::from_ymd_opt(2013, 6, 1).unwrap(),
            unix_review_time: 1370044800,
            category: "Books".to_string(),
            commercial_segment: CommercialSegment::Entertainment,
            analysis_type: "Leisure/Personal".to_string(),
            rating_tier: RatingTier::Excellent,
            extra: BTreeMap::from([("reviewTime".to_string(), json!("06 1, 2013"))]),
        }
    }

    #[test]
    fn field_dispatcher_covers_typed_and_extra_fields() {
        let doc = sample_document();
        assert_eq!(doc.field("rating"), Some(json!(5)));
        assert_eq!(doc.field("rating_tier"), Some(json!("excellent")));
        assert_eq!(doc.field("commercial_segment"), Some(json!("Entertainment")));
        assert_eq!(doc.field("review_date"), Some(json!("2013-06-01")));
        assert_eq!(doc.field("reviewTime"), Some(json!("06 1, 2013")));
        assert_eq!(doc.field("no_such_field"), None);
    }

    #[test]
    fn document_round_trips_through_json() {
        let doc = sample_document();
        let value = serde_json::to_value(&doc).unwrap();
        // Preserved metadata is flattened into the document object
        assert_eq!(value.get("reviewTime"), Some(&json!("06 1, 2013")));
        let back: ReviewDocument = serde_json::from_value(value).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn segments_map_unknown_names_to_other() {
        assert_eq!(
            CommercialSegment::from_name("Entertainment"),
            CommercialSegment::Entertainment
        );
        assert_eq!(
            CommercialSegment::from_name("Garden"),
            CommercialSegment::Other
        );
        assert_eq!(CommercialSegment::Other.analysis_type(), "General");
    }
}
