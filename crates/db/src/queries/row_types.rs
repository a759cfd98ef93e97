// crates/db/src/queries/row_types.rs
// Internal row types bridging SQLite rows and core domain values.

use crate::DbResult;
use sqlx::Row;
use verbal_assess_core::{
    AssessmentSummary, ItemRecord, QuestionResultMap, SessionStatus, TOTAL_QUESTIONS,
};

/// One `assessments` row (nested schema).
#[derive(Debug)]
pub(crate) struct SessionRow {
    pub(crate) id: String,
    pub(crate) user_id: Option<String>,
    pub(crate) status: String,
    pub(crate) created_at: i64,
    pub(crate) assessment_start_time: Option<String>,
    pub(crate) assessment_end_time: Option<String>,
    pub(crate) total_questions: i64,
    pub(crate) completed_questions: i64,
    pub(crate) progress_percentage: f64,
    pub(crate) overall_score: Option<f64>,
    pub(crate) question_results: String,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for SessionRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            assessment_start_time: row.try_get("assessment_start_time")?,
            assessment_end_time: row.try_get("assessment_end_time")?,
            total_questions: row.try_get("total_questions")?,
            completed_questions: row.try_get("completed_questions")?,
            progress_percentage: row.try_get("progress_percentage")?,
            overall_score: row.try_get("overall_score")?,
            question_results: row.try_get("question_results")?,
        })
    }
}

impl SessionRow {
    /// Decode the embedded question-result map.
    pub(crate) fn results_map(&self) -> DbResult<QuestionResultMap> {
        Ok(serde_json::from_str(&self.question_results)?)
    }

    /// Build a summary from the cached aggregate fields (nested schema reads
    /// the session document directly instead of recomputing from items).
    pub(crate) fn into_summary(self) -> AssessmentSummary {
        AssessmentSummary {
            user_id: self.user_id.unwrap_or_default(),
            assessment_id: self.id,
            total_questions: self.total_questions.max(0) as u32,
            completed_questions: self.completed_questions.clamp(0, i64::from(TOTAL_QUESTIONS))
                as u32,
            progress_percentage: self.progress_percentage,
            overall_score: self.overall_score,
            start_time: self.assessment_start_time,
            end_time: self.assessment_end_time,
            status: SessionStatus::from_db_str(&self.status),
        }
    }
}

/// One `assessment_items` row (flattened schema).
#[derive(Debug)]
pub(crate) struct ItemRow {
    id: String,
    user_id: String,
    assessment_id: String,
    question_id: String,
    question_index: Option<i64>,
    created_at: i64,
    start_time: Option<String>,
    end_time: Option<String>,
    transcription: Option<String>,
    duration_seconds: Option<f64>,
    overall: Option<f64>,
    pronunciation: Option<f64>,
    fluency: Option<f64>,
    rhythm: Option<f64>,
    integrity: Option<f64>,
    speed_wpm: Option<f64>,
    pause_count: Option<i64>,
    rear_tone: Option<String>,
    application_id: Option<String>,
    token_id: Option<String>,
    record_id: Option<String>,
    kernel_version: Option<String>,
    resource_version: Option<String>,
    dt_last_response_raw: Option<String>,
    raw_response: String,
    metadata: String,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for ItemRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            assessment_id: row.try_get("assessment_id")?,
            question_id: row.try_get("question_id")?,
            question_index: row.try_get("question_index")?,
            created_at: row.try_get("created_at")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            transcription: row.try_get("transcription")?,
            duration_seconds: row.try_get("duration_seconds")?,
            overall: row.try_get("overall")?,
            pronunciation: row.try_get("pronunciation")?,
            fluency: row.try_get("fluency")?,
            rhythm: row.try_get("rhythm")?,
            integrity: row.try_get("integrity")?,
            speed_wpm: row.try_get("speed_wpm")?,
            pause_count: row.try_get("pause_count")?,
            rear_tone: row.try_get("rear_tone")?,
            application_id: row.try_get("application_id")?,
            token_id: row.try_get("token_id")?,
            record_id: row.try_get("record_id")?,
            kernel_version: row.try_get("kernel_version")?,
            resource_version: row.try_get("resource_version")?,
            dt_last_response_raw: row.try_get("dt_last_response_raw")?,
            raw_response: row.try_get("raw_response")?,
            metadata: row.try_get("metadata")?,
        })
    }
}

impl ItemRow {
    pub(crate) fn into_item_record(self) -> ItemRecord {
        // Stored JSON was written by us; a corrupt column degrades to null
        // rather than failing the whole read.
        let raw_response = serde_json::from_str(&self.raw_response)
            .unwrap_or(serde_json::Value::Null);
        let metadata = serde_json::from_str(&self.metadata).unwrap_or(serde_json::Value::Null);

        ItemRecord {
            id: self.id,
            user_id: self.user_id,
            assessment_id: self.assessment_id,
            question_id: self.question_id,
            question_index: self.question_index.and_then(|i| u32::try_from(i).ok()),
            created_at: self.created_at,
            start_time: self.start_time,
            end_time: self.end_time,
            transcription: self.transcription,
            duration_seconds: self.duration_seconds,
            overall: self.overall,
            pronunciation: self.pronunciation,
            fluency: self.fluency,
            rhythm: self.rhythm,
            integrity: self.integrity,
            speed_wpm: self.speed_wpm,
            pause_count: self.pause_count,
            rear_tone: self.rear_tone,
            application_id: self.application_id,
            token_id: self.token_id,
            record_id: self.record_id,
            kernel_version: self.kernel_version,
            resource_version: self.resource_version,
            dt_last_response_raw: self.dt_last_response_raw,
            raw_response,
            metadata,
        }
    }
}
