// crates/core/src/types.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Every assessment session holds exactly this many questions.
pub const TOTAL_QUESTIONS: u32 = 3;

/// Per-question metric scores as normalized by the upstream evaluator.
/// Absent metrics stay `None`; they are never coerced to zero here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricScores {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pronunciation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fluency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rhythm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity: Option<f64>,
}

impl MetricScores {
    pub fn with_overall(overall: f64) -> Self {
        Self {
            overall: Some(overall),
            ..Self::default()
        }
    }
}

/// Upstream call provenance carried through for audit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub application_id: Option<String>,
    pub token_id: Option<String>,
    pub record_id: Option<String>,
    pub kernel_version: Option<String>,
    pub resource_version: Option<String>,
}

/// One normalized evaluation result for a single recorded answer, as handed
/// over by the upstream scoring collaborator. `raw_response` is the complete
/// unmodified upstream payload, retained verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub scores: MetricScores,
    pub speed_wpm: Option<f64>,
    pub pause_count: Option<i64>,
    pub rear_tone: Option<String>,
    pub transcription: Option<String>,
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub raw_response: Value,
    #[serde(default)]
    pub provenance: Provenance,
}

impl EvaluationResult {
    pub fn with_scores(scores: MetricScores) -> Self {
        Self {
            scores,
            ..Self::default()
        }
    }
}

/// Entry embedded in a nested-schema session's question-result map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub completed: bool,
    pub scores: MetricScores,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Unix seconds at which the result was recorded.
    pub recorded_at: i64,
}

/// Map from question identifier to its embedded record. `BTreeMap` keeps
/// serialization order stable across rewrites of the same session row.
pub type QuestionResultMap = BTreeMap<String, QuestionRecord>;

/// One flattened per-question item, exactly as persisted in the
/// `assessment_items` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Deterministic: `"{assessment_id}_{question_id}"`. Makes repeated
    /// submissions and migration re-runs overwrite instead of duplicate.
    pub id: String,
    pub user_id: String,
    pub assessment_id: String,
    pub question_id: String,
    pub question_index: Option<u32>,
    /// Unix seconds at which this row was written.
    pub created_at: i64,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub transcription: Option<String>,
    pub duration_seconds: Option<f64>,

    // Denormalized key metrics for fast reads.
    pub overall: Option<f64>,
    pub pronunciation: Option<f64>,
    pub fluency: Option<f64>,
    pub rhythm: Option<f64>,
    pub integrity: Option<f64>,
    pub speed_wpm: Option<f64>,
    pub pause_count: Option<i64>,
    pub rear_tone: Option<String>,

    // Provenance / versions.
    pub application_id: Option<String>,
    pub token_id: Option<String>,
    pub record_id: Option<String>,
    pub kernel_version: Option<String>,
    pub resource_version: Option<String>,
    pub dt_last_response_raw: Option<String>,

    /// The whole upstream payload, unchanged.
    pub raw_response: Value,
    /// Free-form caller metadata.
    pub metadata: Value,
}

impl ItemRecord {
    /// Deterministic item identifier for a (session, question) pair.
    pub fn item_id(assessment_id: &str, question_id: &str) -> String {
        format!("{assessment_id}_{question_id}")
    }
}

/// Session status. Always derived from how many questions are recorded;
/// see `mark_session_status` for the one legacy exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Completed,
    InProgress,
}

impl SessionStatus {
    pub fn derive(completed_questions: u32) -> Self {
        if completed_questions >= TOTAL_QUESTIONS {
            Self::Completed
        } else {
            Self::InProgress
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::InProgress => "in_progress",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            _ => Self::InProgress,
        }
    }
}

/// Aggregate view of one session, recomputed on demand in the flattened
/// schema and cached on the session row in the nested schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentSummary {
    pub assessment_id: String,
    pub user_id: String,
    pub total_questions: u32,
    pub completed_questions: u32,
    pub progress_percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_score: Option<f64>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub status: SessionStatus,
}
