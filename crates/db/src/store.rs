// crates/db/src/store.rs
//! Caller-facing store facade.
//!
//! One stable interface over both storage layouts: the legacy nested schema
//! (session document with an embedded question-result map plus sub-records)
//! and the flattened schema (independent per-item rows, summaries recomputed
//! on read). The handle is constructed explicitly and passed around; there
//! is no process-global client.
//!
//! When the backing database cannot be opened the store degrades to a
//! non-persisting mock: submissions are acknowledged with a syntactically
//! valid `"{user_id}_mock_{timestamp}"` identifier and logged, reads come
//! back empty, and nothing is written.

use crate::migrator::MigrationReport;
use crate::queries::{items, sessions};
use crate::{Database, DbError, DbResult};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use std::path::Path;
use tracing::{info, warn};
use verbal_assess_core::{
    aggregate_question_results, extract_item_fields, question_index, summarize_items,
    AssessmentSummary, EvaluationResult, ItemRecord, QuestionRecord, SessionStatus,
};

/// Which storage layout this store reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    /// Legacy: embedded question-result map + per-question sub-records.
    Nested,
    /// Current: independent per-item rows, aggregates recomputed on read.
    Flattened,
}

/// One incoming per-question submission.
#[derive(Debug)]
pub struct Submission<'a> {
    pub user_id: &'a str,
    pub question_id: &'a str,
    pub result: &'a EvaluationResult,
    pub metadata: Value,
    pub start_time: Option<&'a str>,
    pub end_time: Option<&'a str>,
    /// Caller-supplied session hint. Ignored whenever an open session
    /// exists; callers must use the returned identifier, not their own.
    pub hint_session_id: Option<&'a str>,
}

impl<'a> Submission<'a> {
    pub fn new(user_id: &'a str, question_id: &'a str, result: &'a EvaluationResult) -> Self {
        Self {
            user_id,
            question_id,
            result,
            metadata: Value::Null,
            start_time: None,
            end_time: None,
            hint_session_id: None,
        }
    }

    pub fn with_times(mut self, start: &'a str, end: &'a str) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    pub fn with_hint(mut self, hint: &'a str) -> Self {
        self.hint_session_id = Some(hint);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone)]
enum Backing {
    Live(Database),
    Unavailable,
}

/// Process-scoped store handle.
#[derive(Debug, Clone)]
pub struct Store {
    backing: Backing,
    schema: SchemaVersion,
}

/// Attempts for the bounded SQLITE_BUSY retry around one merge.
const BUSY_RETRIES: u32 = 5;

impl Store {
    /// Open the store at the given path. An unreachable backing store is
    /// not an error: the store comes up in mock mode so callers can proceed.
    pub async fn open(path: &Path, schema: SchemaVersion) -> Self {
        match Database::new(path).await {
            Ok(db) => Self::new(db, schema),
            Err(e) => {
                warn!("Backing store unavailable ({e}); degrading to mock mode");
                Self::unavailable(schema)
            }
        }
    }

    /// Wrap an already-open database.
    pub fn new(db: Database, schema: SchemaVersion) -> Self {
        Self {
            backing: Backing::Live(db),
            schema,
        }
    }

    /// A store with no backing database: acknowledges writes without
    /// persisting anything.
    pub fn unavailable(schema: SchemaVersion) -> Self {
        Self {
            backing: Backing::Unavailable,
            schema,
        }
    }

    pub fn schema(&self) -> SchemaVersion {
        self.schema
    }

    pub fn database(&self) -> Option<&Database> {
        match &self.backing {
            Backing::Live(db) => Some(db),
            Backing::Unavailable => None,
        }
    }

    /// Merge one per-question result into the user's session, creating the
    /// session if none is open, and return the resolved session identifier.
    ///
    /// The locate→read→merge→write sequence runs in a single immediate
    /// transaction and is retried a bounded number of times on write
    /// contention. Resubmitting a question id overwrites its previous
    /// result; it never duplicates.
    pub async fn submit_question_result(&self, submission: Submission<'_>) -> DbResult<String> {
        let db = match &self.backing {
            Backing::Live(db) => db,
            Backing::Unavailable => {
                let id = format!("{}_mock_{}", submission.user_id, Utc::now().timestamp());
                warn!(
                    user_id = submission.user_id,
                    question_id = submission.question_id,
                    "Store unavailable; acknowledging submission without persisting as {id}"
                );
                return Ok(id);
            }
        };

        let mut attempt = 0;
        loop {
            let outcome = match self.schema {
                SchemaVersion::Nested => Self::submit_nested(db, &submission).await,
                SchemaVersion::Flattened => Self::submit_flattened(db, &submission).await,
            };
            match outcome {
                Err(e) if e.is_busy() && attempt < BUSY_RETRIES => {
                    attempt += 1;
                    tokio::time::sleep(std::time::Duration::from_millis(20 * u64::from(attempt)))
                        .await;
                }
                Err(e) => {
                    warn!(
                        user_id = submission.user_id,
                        question_id = submission.question_id,
                        "Failed to store question result: {e}"
                    );
                    return Err(e);
                }
                Ok(session_id) => {
                    info!(
                        user_id = submission.user_id,
                        question_id = submission.question_id,
                        session_id = session_id.as_str(),
                        "Stored question result"
                    );
                    return Ok(session_id);
                }
            }
        }
    }

    async fn submit_nested(db: &Database, sub: &Submission<'_>) -> DbResult<String> {
        let mut tx = db.begin_immediate().await?;
        // A dropped transaction rolls back.
        let session_id = Self::merge_nested(&mut tx, sub).await?;
        tx.commit().await?;
        Ok(session_id)
    }

    async fn merge_nested(
        conn: &mut sqlx::SqliteConnection,
        sub: &Submission<'_>,
    ) -> DbResult<String> {
        let now = Utc::now().timestamp();

        // Locate first; an open session always wins over the caller's hint.
        let located = sessions::find_open_session_tx(conn, sub.user_id).await?;
        let (session_id, created_at, existing) = match located {
            Some(row) => (row.id.clone(), row.created_at, Some(row)),
            None => match sub.hint_session_id {
                Some(hint) => match sessions::get_session_tx(conn, hint).await? {
                    Some(row) => (row.id.clone(), row.created_at, Some(row)),
                    None => (mint_session_id(sub.user_id), now, None),
                },
                None => (mint_session_id(sub.user_id), now, None),
            },
        };

        let mut results = match &existing {
            Some(row) => row.results_map()?,
            None => Default::default(),
        };
        // Overwrite, never append: same question id replaces prior content.
        results.insert(
            sub.question_id.to_owned(),
            QuestionRecord {
                completed: true,
                scores: sub.result.scores.clone(),
                duration_seconds: sub.result.duration_seconds,
                recorded_at: now,
            },
        );

        let agg = aggregate_question_results(&results);
        let status = SessionStatus::derive(agg.completed_questions);

        // Set-once timestamps: start on the first question, end on
        // completion. The upsert SQL keeps any already-set value.
        let q_index = question_index(sub.question_id).unwrap_or(1);
        let start_value;
        let start_time = if q_index == 1
            && existing
                .as_ref()
                .map_or(true, |r| r.assessment_start_time.is_none())
        {
            start_value = sub.start_time.map(str::to_owned).unwrap_or_else(now_rfc3339);
            Some(start_value.as_str())
        } else {
            None
        };
        let end_value;
        let end_time = if status == SessionStatus::Completed {
            end_value = sub.end_time.map(str::to_owned).unwrap_or_else(now_rfc3339);
            Some(end_value.as_str())
        } else {
            None
        };

        sessions::upsert_session_tx(
            conn,
            &sessions::NestedWrite {
                session_id: &session_id,
                user_id: sub.user_id,
                status,
                completed_questions: agg.completed_questions,
                progress_percentage: agg.progress_percentage,
                overall_score: agg.overall_score,
                assessment_start_time: start_time,
                assessment_end_time: end_time,
                question_results: &results,
                created_at,
            },
        )
        .await?;

        // Full sub-record (what the migrator later flattens).
        let scores_json = serde_json::to_string(&sub.result.scores)?;
        let raw_json = serde_json::to_string(&sub.result.raw_response)?;
        let metadata_json = serde_json::to_string(&normalized_metadata(&sub.metadata))?;
        sessions::upsert_result_record_tx(
            conn,
            &session_id,
            sub.user_id,
            sub.question_id,
            question_index(sub.question_id),
            sub.start_time,
            sub.end_time,
            &scores_json,
            sub.result.transcription.as_deref(),
            sub.result.duration_seconds,
            &raw_json,
            &metadata_json,
        )
        .await?;

        Ok(session_id)
    }

    async fn submit_flattened(db: &Database, sub: &Submission<'_>) -> DbResult<String> {
        let mut tx = db.begin_immediate().await?;
        let session_id = Self::merge_flattened(&mut tx, sub).await?;
        tx.commit().await?;
        Ok(session_id)
    }

    async fn merge_flattened(
        conn: &mut sqlx::SqliteConnection,
        sub: &Submission<'_>,
    ) -> DbResult<String> {
        let located = items::find_open_item_group_tx(conn, sub.user_id).await?;
        let session_id = if let Some(group) = located {
            group.assessment_id
        } else {
            let mut reused = None;
            if let Some(hint) = sub.hint_session_id {
                if items::item_session_exists_tx(conn, sub.user_id, hint).await? {
                    reused = Some(hint.to_owned());
                }
            }
            reused.unwrap_or_else(|| mint_session_id(sub.user_id))
        };

        let item = build_item(
            sub.user_id,
            &session_id,
            sub.question_id,
            sub.result,
            &sub.metadata,
            sub.start_time,
            sub.end_time,
        );
        items::upsert_item_tx(conn, &item).await?;

        Ok(session_id)
    }

    /// On-demand session summary.
    ///
    /// Flattened: recomputed from the persisted items. Nested: read from the
    /// session document's cached aggregate fields. Read failures are logged
    /// and surface as `None`, never as an error.
    pub async fn get_session_summary(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Option<AssessmentSummary> {
        let db = match &self.backing {
            Backing::Live(db) => db,
            Backing::Unavailable => {
                warn!("Store unavailable; no summary for session {session_id}");
                return None;
            }
        };

        match self.schema {
            SchemaVersion::Flattened => match db.list_items(user_id, Some(session_id)).await {
                Ok(items) => summarize_items(user_id, session_id, &items),
                Err(e) => {
                    warn!("Failed to read items for session {session_id}: {e}");
                    None
                }
            },
            SchemaVersion::Nested => match db.get_nested_summary(user_id, session_id).await {
                Ok(summary) => summary,
                Err(e) => {
                    warn!("Failed to read session {session_id}: {e}");
                    None
                }
            },
        }
    }

    /// List a user's flattened items, newest first, optionally filtered to
    /// one session. Read failures are logged and return an empty list.
    pub async fn list_items(&self, user_id: &str, session_id: Option<&str>) -> Vec<ItemRecord> {
        let db = match &self.backing {
            Backing::Live(db) => db,
            Backing::Unavailable => {
                warn!("Store unavailable; returning no items for user {user_id}");
                return Vec::new();
            }
        };

        match db.list_items(user_id, session_id).await {
            Ok(items) => items,
            Err(e) => {
                warn!("Failed to list items for user {user_id}: {e}");
                Vec::new()
            }
        }
    }

    /// Legacy explicit status override (nested schema only). Returns whether
    /// the update was acknowledged; in mock mode it always is.
    pub async fn mark_session_status(&self, session_id: &str, status: SessionStatus) -> bool {
        let db = match &self.backing {
            Backing::Live(db) => db,
            Backing::Unavailable => {
                warn!("Store unavailable; mock status update for {session_id}");
                return true;
            }
        };

        match db.mark_session_status(session_id, status).await {
            Ok(updated) => updated,
            Err(e) => {
                warn!("Failed to update status for session {session_id}: {e}");
                false
            }
        }
    }

    /// Bulk-migrate every nested session into flattened items.
    pub async fn migrate_all(&self) -> DbResult<MigrationReport> {
        match &self.backing {
            Backing::Live(db) => db.migrate_nested_to_items().await,
            Backing::Unavailable => Err(DbError::Unavailable),
        }
    }
}

/// Serialize a summary for a caller, defensively: a summary that fails to
/// encode yields a minimal error-shaped value instead of propagating.
pub fn summary_json(summary: &AssessmentSummary) -> Value {
    match serde_json::to_value(summary) {
        Ok(value) => value,
        Err(e) => {
            warn!(
                "Failed to serialize summary for session {}: {e}",
                summary.assessment_id
            );
            json!({ "error": "serialization_failed", "assessment_id": summary.assessment_id })
        }
    }
}

/// Build one flattened item from a normalized evaluation result, preferring
/// the raw upstream payload's fields and falling back to the normalized
/// values per metric.
pub(crate) fn build_item(
    user_id: &str,
    assessment_id: &str,
    question_id: &str,
    result: &EvaluationResult,
    metadata: &Value,
    start_time: Option<&str>,
    end_time: Option<&str>,
) -> ItemRecord {
    let fields = extract_item_fields(
        &result.raw_response,
        &result.scores,
        result.transcription.as_deref(),
        result.duration_seconds,
    );
    let prov = &result.provenance;

    ItemRecord {
        id: ItemRecord::item_id(assessment_id, question_id),
        user_id: user_id.to_owned(),
        assessment_id: assessment_id.to_owned(),
        question_id: question_id.to_owned(),
        question_index: question_index(question_id),
        created_at: Utc::now().timestamp(),
        start_time: start_time.map(str::to_owned),
        end_time: end_time.map(str::to_owned),
        transcription: fields.transcription,
        duration_seconds: fields.duration_seconds,
        overall: fields.overall,
        pronunciation: fields.pronunciation,
        fluency: fields.fluency,
        rhythm: fields.rhythm,
        integrity: fields.integrity,
        speed_wpm: fields.speed_wpm.or(result.speed_wpm),
        pause_count: fields.pause_count.or(result.pause_count),
        rear_tone: fields.rear_tone.or_else(|| result.rear_tone.clone()),
        application_id: fields
            .provenance
            .application_id
            .or_else(|| prov.application_id.clone()),
        token_id: fields.provenance.token_id.or_else(|| prov.token_id.clone()),
        record_id: fields
            .provenance
            .record_id
            .or_else(|| prov.record_id.clone()),
        kernel_version: fields
            .provenance
            .kernel_version
            .or_else(|| prov.kernel_version.clone()),
        resource_version: fields
            .provenance
            .resource_version
            .or_else(|| prov.resource_version.clone()),
        dt_last_response_raw: fields.dt_last_response_raw,
        raw_response: result.raw_response.clone(),
        metadata: normalized_metadata(metadata),
    }
}

/// Mint `"{user_id}_{unix_timestamp_ms}"`. The stamp is kept strictly
/// monotonic within the process so two sessions minted back-to-back never
/// share an identifier.
fn mint_session_id(user_id: &str) -> String {
    use std::sync::atomic::{AtomicI64, Ordering};
    static CLOCK: AtomicI64 = AtomicI64::new(0);

    let now = Utc::now().timestamp_millis();
    let mut last = CLOCK.load(Ordering::Relaxed);
    let stamp = loop {
        let next = now.max(last + 1);
        match CLOCK.compare_exchange(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break next,
            Err(observed) => last = observed,
        }
    };
    format!("{user_id}_{stamp}")
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn normalized_metadata(metadata: &Value) -> Value {
    if metadata.is_null() {
        json!({})
    } else {
        metadata.clone()
    }
}
