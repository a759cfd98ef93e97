// crates/core/src/raw.rs
//! Extraction of denormalized fields from the verbatim upstream payload.
//!
//! Every metric follows the same two-level fallback chain, applied
//! independently: the raw payload's `result.<metric>` wins, the previously
//! computed score is the fallback, and anything unparseable drops to `None`.

use crate::types::{MetricScores, Provenance};
use serde_json::Value;

/// Denormalized fields pulled out of one upstream payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedFields {
    pub overall: Option<f64>,
    pub pronunciation: Option<f64>,
    pub fluency: Option<f64>,
    pub rhythm: Option<f64>,
    pub integrity: Option<f64>,
    pub speed_wpm: Option<f64>,
    pub pause_count: Option<i64>,
    pub rear_tone: Option<String>,
    pub transcription: Option<String>,
    pub duration_seconds: Option<f64>,
    pub provenance: Provenance,
    pub dt_last_response_raw: Option<String>,
}

/// Convert a JSON value to a number, accepting numeric strings. Anything
/// else is dropped to `None` rather than coerced.
pub fn to_num(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn metric(result: &Value, key: &str, fallback: Option<f64>) -> Option<f64> {
    match result.get(key) {
        Some(v) => to_num(v),
        None => fallback,
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_owned)
}

/// Extract all denormalized item fields from a raw upstream payload,
/// falling back to the already-normalized `scores` / `transcription` /
/// `duration_seconds` where the payload is silent.
pub fn extract_item_fields(
    raw: &Value,
    scores: &MetricScores,
    transcription: Option<&str>,
    duration_seconds: Option<f64>,
) -> ExtractedFields {
    static EMPTY: Value = Value::Null;
    let result = raw.get("result").unwrap_or(&EMPTY);

    ExtractedFields {
        overall: metric(result, "overall", scores.overall),
        pronunciation: metric(result, "pronunciation", scores.pronunciation),
        fluency: metric(result, "fluency", scores.fluency),
        rhythm: metric(result, "rhythm", scores.rhythm),
        integrity: metric(result, "integrity", scores.integrity),
        // Optional scalar metrics are strictly type-checked, never coerced.
        speed_wpm: result.get("speed").and_then(Value::as_f64),
        pause_count: result
            .get("pause_count")
            .and_then(Value::as_i64),
        rear_tone: str_field(result, "rear_tone"),
        transcription: transcription
            .map(str::to_owned)
            .or_else(|| str_field(result, "recognition")),
        duration_seconds: duration_seconds
            .or_else(|| result.get("numeric_duration").and_then(to_num)),
        provenance: Provenance {
            application_id: str_field(raw, "applicationId"),
            token_id: str_field(raw, "tokenId"),
            record_id: str_field(raw, "recordId"),
            kernel_version: str_field(result, "kernel_version"),
            resource_version: str_field(result, "resource_version"),
        },
        dt_last_response_raw: str_field(raw, "dtLastResponse"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_payload() -> Value {
        json!({
            "applicationId": "app_123",
            "tokenId": "tok_456",
            "recordId": "rec_789",
            "dtLastResponse": "2024-01-01T00:00:00Z",
            "result": {
                "overall": 85.5,
                "pronunciation": 80.0,
                "speed": 120,
                "pause_count": 3,
                "rear_tone": "rise",
                "recognition": "spoken answer text",
                "numeric_duration": 30.5,
                "kernel_version": "1.0.0",
                "resource_version": "2.0.0"
            }
        })
    }

    #[test]
    fn prefers_raw_payload_over_scores() {
        let scores = MetricScores {
            overall: Some(70.0),
            pronunciation: Some(60.0),
            fluency: Some(90.0),
            ..MetricScores::default()
        };
        let fields = extract_item_fields(&sample_payload(), &scores, None, None);

        // Raw fields win where present; scores fill the gaps.
        assert_eq!(fields.overall, Some(85.5));
        assert_eq!(fields.pronunciation, Some(80.0));
        assert_eq!(fields.fluency, Some(90.0));
        assert_eq!(fields.rhythm, None);
    }

    #[test]
    fn type_checked_scalars_drop_to_none() {
        let raw = json!({
            "result": {
                "speed": "fast",
                "pause_count": 2.5,
                "rear_tone": 7
            }
        });
        let fields = extract_item_fields(&raw, &MetricScores::default(), None, None);
        assert_eq!(fields.speed_wpm, None);
        assert_eq!(fields.pause_count, None);
        assert_eq!(fields.rear_tone, None);
    }

    #[test]
    fn numeric_strings_parse_for_metrics() {
        let raw = json!({ "result": { "overall": "88.5" } });
        let fields = extract_item_fields(&raw, &MetricScores::default(), None, None);
        assert_eq!(fields.overall, Some(88.5));
    }

    #[test]
    fn unparseable_raw_metric_does_not_fall_back() {
        // A present-but-garbage raw value means None, not the scores value.
        let raw = json!({ "result": { "overall": {"nested": true} } });
        let scores = MetricScores::with_overall(70.0);
        let fields = extract_item_fields(&raw, &scores, None, None);
        assert_eq!(fields.overall, None);
    }

    #[test]
    fn transcription_and_duration_fallbacks() {
        let fields =
            extract_item_fields(&sample_payload(), &MetricScores::default(), None, None);
        assert_eq!(fields.transcription.as_deref(), Some("spoken answer text"));
        assert_eq!(fields.duration_seconds, Some(30.5));

        let fields = extract_item_fields(
            &sample_payload(),
            &MetricScores::default(),
            Some("explicit"),
            Some(12.0),
        );
        assert_eq!(fields.transcription.as_deref(), Some("explicit"));
        assert_eq!(fields.duration_seconds, Some(12.0));
    }

    #[test]
    fn provenance_copied_through() {
        let fields =
            extract_item_fields(&sample_payload(), &MetricScores::default(), None, None);
        assert_eq!(fields.provenance.application_id.as_deref(), Some("app_123"));
        assert_eq!(fields.provenance.token_id.as_deref(), Some("tok_456"));
        assert_eq!(fields.provenance.record_id.as_deref(), Some("rec_789"));
        assert_eq!(fields.provenance.kernel_version.as_deref(), Some("1.0.0"));
        assert_eq!(
            fields.dt_last_response_raw.as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
    }
}
