use serde_json::{Map, Value};

use crate::config::CleaningConfig;
use crate::domain::RawRecord;

/// Source fields that are semantically optional; empty strings become an
/// explicit JSON null so downstream stages see one representation of absence.
const OPTIONAL_STRING_FIELDS: [&str; 3] = ["reviewerName", "summary", "reviewTime"];

/// An accepted record with normalized field representation. Field names are
/// still the source names; the enricher turns this into a `ReviewDocument`.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedRecord {
    fields: Map<String, Value>,
}

impl CleanedRecord {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn reviewer_id(&self) -> Option<&str> {
        self.str_field("reviewerID")
    }

    pub fn product_id(&self) -> Option<&str> {
        self.str_field("asin")
    }

    /// Composite natural key for deduplication; `None` only if key fields are
    /// absent, which validation rules out.
    pub fn dedup_key(&self) -> Option<(String, String)> {
        Some((
            self.reviewer_id()?.to_string(),
            self.product_id()?.to_string(),
        ))
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// Normalizes accepted records: trims strings, truncates free text, marks
/// absent optional fields, and coerces numeric-looking strings. Never
/// rejects; rejection is the validator's job. Idempotent by construction.
pub struct FieldCleaner {
    config: CleaningConfig,
}

impl FieldCleaner {
    pub fn new(config: CleaningConfig) -> Self {
        Self { config }
    }

    pub fn clean(&self, record: &RawRecord) -> CleanedRecord {
        let source = match record.as_object() {
            Some(fields) => fields.clone(),
            // Validation guarantees an object; anything else cleans to empty.
            None => Map::new(),
        };

        let mut fields = Map::with_capacity(source.len());
        for (name, value) in source {
            let cleaned = match name.as_str() {
                "reviewText" => self.clean_text(value, self.config.max_text_length),
                "summary" => self.clean_text(value, self.config.max_summary_length),
                "overall" | "unixReviewTime" => coerce_numeric(value),
                "helpful" => clean_helpful(value),
                _ => clean_scalar(value),
            };
            let cleaned = if OPTIONAL_STRING_FIELDS.contains(&name.as_str()) {
                absent_if_empty(cleaned)
            } else {
                cleaned
            };
            fields.insert(name, cleaned);
        }

        CleanedRecord { fields }
    }

    fn clean_text(&self, value: Value, max_chars: usize) -> Value {
        match value {
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.chars().count() > max_chars {
                    // Trim again after the cut so a boundary space cannot make
                    // a second cleaning pass produce a different result
                    let truncated: String = trimmed.chars().take(max_chars).collect();
                    Value::String(truncated.trim_end().to_string())
                } else {
                    Value::String(trimmed.to_string())
                }
            }
            other => other,
        }
    }
}

/// Trims string values; everything else passes through untouched.
fn clean_scalar(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().to_string()),
        other => other,
    }
}

/// Empty-after-trim optional strings collapse to null.
fn absent_if_empty(value: Value) -> Value {
    match value {
        Value::String(s) if s.trim().is_empty() => Value::Null,
        other => other,
    }
}

/// Numeric-looking strings become numbers, and integral floats (the source
/// delivers ratings as `5.0`) collapse to integers. Already-normalized
/// values pass through, so a second cleaning pass is a no-op.
fn coerce_numeric(value: Value) -> Value {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                Value::from(i)
            } else if let Ok(f) = trimmed.parse::<f64>() {
                integral_or_float(f)
            } else {
                Value::String(trimmed.to_string())
            }
        }
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.as_i64().is_none() && n.as_u64().is_none() => integral_or_float(f),
            _ => Value::Number(n),
        },
        other => other,
    }
}

fn integral_or_float(f: f64) -> Value {
    let i = f as i64;
    // The cast round-trip check guards against floats outside i64 range
    if f.fract() == 0.0 && i as f64 == f {
        Value::from(i)
    } else {
        Value::from(f)
    }
}

/// The source `helpful` pair is `[helpful votes, total votes]`; anything not
/// shaped like two non-negative integers becomes null.
fn clean_helpful(value: Value) -> Value {
    match &value {
        Value::Array(items) if items.len() >= 2 => {
            let up = items[0].as_u64();
            let total = items[1].as_u64();
            match (up, total) {
                (Some(up), Some(total)) => Value::Array(vec![Value::from(up), Value::from(total)]),
                _ => Value::Null,
            }
        }
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;

    fn cleaner() -> FieldCleaner {
        FieldCleaner::new(Config::default().cleaning)
    }

    #[test]
    fn trims_whitespace_from_string_fields() {
        let record = json!({
            "reviewerID": "  A1  ",
            "asin": " B002 ",
            "reviewText": "  solid product  ",
            "category": "Books"
        });
        let cleaned = cleaner().clean(&record);
        assert_eq!(cleaned.reviewer_id(), Some("A1"));
        assert_eq!(cleaned.product_id(), Some("B002"));
        assert_eq!(cleaned.str_field("reviewText"), Some("solid product"));
    }

    #[test]
    fn empty_optional_fields_become_null() {
        let record = json!({
            "reviewerID": "A1",
            "summary": "   ",
            "reviewerName": ""
        });
        let cleaned = cleaner().clean(&record);
        assert_eq!(cleaned.get("summary"), Some(&Value::Null));
        assert_eq!(cleaned.get("reviewerName"), Some(&Value::Null));
    }

    #[test]
    fn coerces_numeric_strings() {
        let record = json!({
            "overall": "5",
            "unixReviewTime": "1252800000"
        });
        let cleaned = cleaner().clean(&record);
        assert_eq!(cleaned.get("overall"), Some(&json!(5)));
        assert_eq!(cleaned.get("unixReviewTime"), Some(&json!(1252800000i64)));
    }

    #[test]
    fn integral_float_ratings_collapse_to_integers() {
        let record = json!({ "overall": 5.0, "unixReviewTime": 1252800000.0 });
        let cleaned = cleaner().clean(&record);
        assert_eq!(cleaned.get("overall"), Some(&json!(5)));
        assert_eq!(cleaned.get("unixReviewTime"), Some(&json!(1252800000i64)));
    }

    #[test]
    fn truncates_long_text_fields() {
        let long_text: String = "x".repeat(5000);
        let record = json!({ "reviewText": long_text, "summary": "y".repeat(500) });
        let cleaned = cleaner().clean(&record);
        assert_eq!(
            cleaned.str_field("reviewText").unwrap().chars().count(),
            1000
        );
        assert_eq!(cleaned.str_field("summary").unwrap().chars().count(), 200);
    }

    #[test]
    fn normalizes_helpful_pair() {
        let cases = [
            (json!([3, 5]), json!([3, 5])),
            (json!([3, 5, 9]), json!([3, 5])),
            (json!([3]), Value::Null),
            (json!("3 of 5"), Value::Null),
            (json!([-1, 5]), Value::Null),
        ];
        for (input, expected) in cases {
            let record = json!({ "helpful": input });
            let cleaned = cleaner().clean(&record);
            assert_eq!(cleaned.get("helpful"), Some(&expected));
        }
    }

    #[test]
    fn cleaning_is_idempotent() {
        // The review text is built so the truncation cut lands on a space
        let record = json!({
            "reviewerID": "  A1 ",
            "asin": "B002",
            "overall": "4",
            "reviewText": format!("  {} {}  ", "z".repeat(999), "w".repeat(2000)),
            "summary": "  ",
            "reviewerName": " Pat ",
            "helpful": [1, 2, 3],
            "unixReviewTime": "1252800000",
            "category": " Books ",
            "reviewTime": "09 13, 2009"
        });
        let cleaner = cleaner();
        let once = cleaner.clean(&record);
        let twice = cleaner.clean(&Value::Object(once.fields().clone()));
        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_fields_are_preserved() {
        let record = json!({ "reviewerID": "A1", "vine": true, "marketplace": " US " });
        let cleaned = cleaner().clean(&record);
        assert_eq!(cleaned.get("vine"), Some(&json!(true)));
        // Unknown string fields still get trimmed
        assert_eq!(cleaned.get("marketplace"), Some(&json!("US")));
    }
}
