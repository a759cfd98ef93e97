// crates/db/src/queries/sessions.rs
// Nested-schema session operations: the locator, the merge write, and the
// legacy status override. Functions suffixed `_tx` run on a write
// transaction's connection so locate→merge→persist stays atomic.

use crate::{Database, DbResult};
use chrono::Utc;
use sqlx::SqliteConnection;
use verbal_assess_core::{AssessmentSummary, QuestionResultMap, SessionStatus};

use super::row_types::SessionRow;

/// Find the user's open session: the earliest-created one that is not
/// (status completed AND all questions recorded). Returns `None` when every
/// session for the user is fully completed, or none exist.
pub(crate) async fn find_open_session_tx(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> DbResult<Option<SessionRow>> {
    let row: Option<SessionRow> = sqlx::query_as(
        r#"
        SELECT id, user_id, status, created_at,
               assessment_start_time, assessment_end_time,
               total_questions, completed_questions, progress_percentage,
               overall_score, question_results
        FROM assessments
        WHERE user_id = ?1
          AND NOT (status = 'completed' AND completed_questions >= total_questions)
        ORDER BY created_at ASC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await?;

    Ok(row)
}

pub(crate) async fn get_session_tx(
    conn: &mut SqliteConnection,
    session_id: &str,
) -> DbResult<Option<SessionRow>> {
    let row: Option<SessionRow> = sqlx::query_as(
        r#"
        SELECT id, user_id, status, created_at,
               assessment_start_time, assessment_end_time,
               total_questions, completed_questions, progress_percentage,
               overall_score, question_results
        FROM assessments
        WHERE id = ?1
        "#,
    )
    .bind(session_id)
    .fetch_optional(conn)
    .await?;

    Ok(row)
}

/// Write-back arguments for one merged nested session.
pub(crate) struct NestedWrite<'a> {
    pub(crate) session_id: &'a str,
    pub(crate) user_id: &'a str,
    pub(crate) status: SessionStatus,
    pub(crate) completed_questions: u32,
    pub(crate) progress_percentage: f64,
    pub(crate) overall_score: Option<f64>,
    pub(crate) assessment_start_time: Option<&'a str>,
    pub(crate) assessment_end_time: Option<&'a str>,
    pub(crate) question_results: &'a QuestionResultMap,
    pub(crate) created_at: i64,
}

/// Persist the merged session document. Insert-or-update keyed on the
/// session id; set-once timestamps are only overwritten when currently NULL.
pub(crate) async fn upsert_session_tx(
    conn: &mut SqliteConnection,
    write: &NestedWrite<'_>,
) -> DbResult<()> {
    let results_json = serde_json::to_string(write.question_results)?;
    let now = Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO assessments (
            id, user_id, status, created_at, last_updated,
            assessment_start_time, assessment_end_time,
            total_questions, completed_questions, progress_percentage,
            overall_score, question_results
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 3, ?8, ?9, ?10, ?11)
        ON CONFLICT(id) DO UPDATE SET
            user_id = excluded.user_id,
            status = excluded.status,
            last_updated = excluded.last_updated,
            assessment_start_time = COALESCE(assessments.assessment_start_time, excluded.assessment_start_time),
            assessment_end_time = COALESCE(assessments.assessment_end_time, excluded.assessment_end_time),
            completed_questions = excluded.completed_questions,
            progress_percentage = excluded.progress_percentage,
            overall_score = excluded.overall_score,
            question_results = excluded.question_results
        "#,
    )
    .bind(write.session_id)
    .bind(write.user_id)
    .bind(write.status.as_str())
    .bind(write.created_at)
    .bind(now)
    .bind(write.assessment_start_time)
    .bind(write.assessment_end_time)
    .bind(write.completed_questions as i64)
    .bind(write.progress_percentage)
    .bind(write.overall_score)
    .bind(&results_json)
    .execute(conn)
    .await?;

    Ok(())
}

/// Full per-question sub-record, the nested schema's equivalent of the
/// legacy results subcollection. Overwrites on resubmission of the same
/// question id.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn upsert_result_record_tx(
    conn: &mut SqliteConnection,
    session_id: &str,
    user_id: &str,
    question_id: &str,
    question_index: Option<u32>,
    start_time: Option<&str>,
    end_time: Option<&str>,
    scores_json: &str,
    transcription: Option<&str>,
    duration_seconds: Option<f64>,
    raw_response_json: &str,
    metadata_json: &str,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO assessment_results (
            assessment_id, question_id, user_id, question_index, created_at,
            start_time, end_time, scores, transcription, duration_seconds,
            raw_response, metadata
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        ON CONFLICT(assessment_id, question_id) DO UPDATE SET
            user_id = excluded.user_id,
            question_index = excluded.question_index,
            start_time = excluded.start_time,
            end_time = excluded.end_time,
            scores = excluded.scores,
            transcription = excluded.transcription,
            duration_seconds = excluded.duration_seconds,
            raw_response = excluded.raw_response,
            metadata = excluded.metadata
        "#,
    )
    .bind(session_id)
    .bind(question_id)
    .bind(user_id)
    .bind(question_index.map(i64::from))
    .bind(Utc::now().timestamp())
    .bind(start_time)
    .bind(end_time)
    .bind(scores_json)
    .bind(transcription)
    .bind(duration_seconds)
    .bind(raw_response_json)
    .bind(metadata_json)
    .execute(conn)
    .await?;

    Ok(())
}

impl Database {
    /// Read a nested session's cached summary fields.
    pub async fn get_nested_summary(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> DbResult<Option<AssessmentSummary>> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, status, created_at,
                   assessment_start_time, assessment_end_time,
                   total_questions, completed_questions, progress_percentage,
                   overall_score, question_results
            FROM assessments
            WHERE id = ?1 AND user_id = ?2
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(SessionRow::into_summary))
    }

    /// Count session documents for a user (all of them, open or completed).
    pub async fn count_sessions(&self, user_id: &str) -> DbResult<u64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM assessments WHERE user_id = ?1")
                .bind(user_id)
                .fetch_one(self.pool())
                .await?;
        Ok(row.0 as u64)
    }

    /// Legacy explicit status override (nested schema only; the flattened
    /// schema derives status and has nothing to force-set).
    /// Returns false when the session does not exist.
    pub async fn mark_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE assessments SET status = ?1, last_updated = ?2 WHERE id = ?3",
        )
        .bind(status.as_str())
        .bind(Utc::now().timestamp())
        .bind(session_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
