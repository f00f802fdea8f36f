use serde_json::Value;

use crate::domain::RawRecord;

/// Source field names required on every raw record.
pub const REQUIRED_FIELDS: [&str; 6] = [
    "reviewerID",
    "asin",
    "overall",
    "reviewText",
    "category",
    "unixReviewTime",
];

/// Reason a raw record was rejected by the validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    MissingRequiredField(String),
    EmptyReviewText,
    RatingOutOfRange,
    MalformedType(String),
}

impl RejectReason {
    /// Stable reason code used in counters and logs.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::MissingRequiredField(_) => "missing_required_field",
            RejectReason::EmptyReviewText => "empty_review_text",
            RejectReason::RatingOutOfRange => "rating_out_of_range",
            RejectReason::MalformedType(_) => "malformed_type",
        }
    }
}

/// Pure accept/reject check of a raw record against the required-field and
/// type rules. Rejected records are counted by the caller, never persisted.
pub struct RecordValidator;

impl RecordValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, record: &RawRecord) -> Result<(), RejectReason> {
        let fields = record
            .as_object()
            .ok_or_else(|| RejectReason::MalformedType("record is not a JSON object".into()))?;

        for name in REQUIRED_FIELDS {
            match fields.get(name) {
                None | Some(Value::Null) => {
                    return Err(RejectReason::MissingRequiredField(name.to_string()))
                }
                Some(_) => {}
            }
        }

        // Identifier fields must be non-empty strings; an all-whitespace id is
        // as useless as a missing one.
        for name in ["reviewerID", "asin", "category"] {
            match fields.get(name) {
                Some(Value::String(s)) if !s.trim().is_empty() => {}
                Some(Value::String(_)) => {
                    return Err(RejectReason::MissingRequiredField(name.to_string()))
                }
                Some(_) => {
                    return Err(RejectReason::MalformedType(format!(
                        "field '{}' is not a string",
                        name
                    )))
                }
                None => return Err(RejectReason::MissingRequiredField(name.to_string())),
            }
        }

        match fields.get("reviewText") {
            Some(Value::String(text)) => {
                if text.trim().is_empty() {
                    return Err(RejectReason::EmptyReviewText);
                }
            }
            Some(_) => {
                return Err(RejectReason::MalformedType(
                    "field 'reviewText' is not a string".into(),
                ))
            }
            None => {
                return Err(RejectReason::MissingRequiredField("reviewText".to_string()))
            }
        }

        let overall = fields
            .get("overall")
            .ok_or_else(|| RejectReason::MissingRequiredField("overall".to_string()))?;
        let rating = rating_as_integer(overall)?;
        if !(1..=5).contains(&rating) {
            return Err(RejectReason::RatingOutOfRange);
        }

        Ok(())
    }
}

impl Default for RecordValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts the source rating into an integer. Sources deliver integral
/// floats (`5.0`) or occasionally numeric strings; anything non-integral or
/// non-numeric is malformed, never clamped or rounded.
pub fn rating_as_integer(value: &Value) -> Result<i64, RejectReason> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 {
                    Ok(f as i64)
                } else {
                    Err(RejectReason::MalformedType(format!(
                        "rating {} is not an integer",
                        f
                    )))
                }
            } else {
                Err(RejectReason::MalformedType("rating is not representable".into()))
            }
        }
        Value::String(s) => {
            let parsed: f64 = s.trim().parse().map_err(|_| {
                RejectReason::MalformedType(format!("rating '{}' is not numeric", s))
            })?;
            if parsed.fract() == 0.0 {
                Ok(parsed as i64)
            } else {
                Err(RejectReason::MalformedType(format!(
                    "rating '{}' is not an integer",
                    s
                )))
            }
        }
        other => Err(RejectReason::MalformedType(format!(
            "rating has unsupported type: {}",
            other
        ))),
    }
}
