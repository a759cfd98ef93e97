// crates/db/src/migrator.rs
//! Bulk migration from the nested layout (session documents + per-question
//! sub-records) to the flattened per-item layout.
//!
//! Every session is processed exactly once, in enumeration order. Items are
//! queued and committed in size-bounded batches; one bad session is logged
//! and skipped, never aborting the run. Source records are neither deleted
//! nor modified. Item identifiers are deterministic, so re-running the
//! migration writes nothing new.

use crate::queries::items;
use crate::store::build_item;
use crate::{Database, DbResult};
use serde_json::Value;
use tracing::{info, warn};
use verbal_assess_core::{EvaluationResult, ItemRecord, MetricScores};

/// Queue threshold per committed batch, safely under the backing store's
/// hard 500-operation batch ceiling.
const MAX_BATCH_OPS: usize = 450;

/// Outcome of one migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Sessions read and flattened.
    pub sessions_processed: usize,
    /// Sessions skipped (missing user id, or unreadable).
    pub sessions_skipped: usize,
    /// Item rows actually written. Re-runs leave existing rows untouched,
    /// so this counts only new items.
    pub items_written: u64,
    /// Batches committed, including the final partial one.
    pub batches_committed: u32,
}

impl Database {
    /// Transform every nested session's sub-records into flattened items.
    pub async fn migrate_nested_to_items(&self) -> DbResult<MigrationReport> {
        info!("Starting migration from nested layout to flattened items");

        let sessions: Vec<(String, Option<String>)> =
            sqlx::query_as("SELECT id, user_id FROM assessments ORDER BY created_at ASC")
                .fetch_all(self.pool())
                .await?;

        let mut report = MigrationReport::default();
        let mut batch: Vec<ItemRecord> = Vec::new();

        for (session_id, user_id) in sessions {
            let user_id = match user_id.filter(|u| !u.is_empty()) {
                Some(u) => u,
                None => {
                    warn!("Skipping session {session_id}: no user_id");
                    report.sessions_skipped += 1;
                    continue;
                }
            };

            let records = match self.fetch_result_records(&session_id).await {
                Ok(records) => records,
                Err(e) => {
                    warn!("Skipping session {session_id}: failed to read sub-records: {e}");
                    report.sessions_skipped += 1;
                    continue;
                }
            };

            for record in records {
                batch.push(record.into_item(&user_id, &session_id));
                if batch.len() >= MAX_BATCH_OPS {
                    self.commit_batch(&mut batch, &mut report).await;
                }
            }
            report.sessions_processed += 1;
        }

        // Final partial batch.
        if !batch.is_empty() {
            self.commit_batch(&mut batch, &mut report).await;
        }

        info!(
            "Migration finished: {} items written across {} batches ({} sessions, {} skipped)",
            report.items_written,
            report.batches_committed,
            report.sessions_processed,
            report.sessions_skipped
        );
        Ok(report)
    }

    /// Commit one queued batch in a single transaction. A failed commit is
    /// fatal to this batch only: it is logged and the run moves on.
    async fn commit_batch(&self, batch: &mut Vec<ItemRecord>, report: &mut MigrationReport) {
        let queued = std::mem::take(batch);
        match self.write_batch(&queued).await {
            Ok(written) => {
                report.items_written += written;
                report.batches_committed += 1;
                info!(
                    "Committed batch of {} ({} new); {} items migrated so far",
                    queued.len(),
                    written,
                    report.items_written
                );
            }
            Err(e) => {
                warn!("Batch commit of {} items failed: {e}", queued.len());
            }
        }
    }

    async fn write_batch(&self, queued: &[ItemRecord]) -> DbResult<u64> {
        let mut tx = self.begin_immediate().await?;
        let mut written = 0u64;
        for item in queued {
            if items::insert_item_if_absent_tx(&mut tx, item).await? {
                written += 1;
            }
        }
        tx.commit().await?;
        Ok(written)
    }

    async fn fetch_result_records(&self, session_id: &str) -> DbResult<Vec<ResultRecord>> {
        type Row = (
            String,         // question_id
            Option<String>, // start_time
            Option<String>, // end_time
            String,         // scores (JSON)
            Option<String>, // transcription
            Option<f64>,    // duration_seconds
            String,         // raw_response (JSON)
            String,         // metadata (JSON)
        );
        let rows: Vec<Row> = sqlx::query_as(
            r#"
            SELECT question_id, start_time, end_time, scores, transcription,
                   duration_seconds, raw_response, metadata
            FROM assessment_results
            WHERE assessment_id = ?1
            ORDER BY question_id ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| {
                let (
                    question_id,
                    start_time,
                    end_time,
                    scores,
                    transcription,
                    duration_seconds,
                    raw_response,
                    metadata,
                ) = row;
                Ok(ResultRecord {
                    question_id,
                    start_time,
                    end_time,
                    scores: serde_json::from_str(&scores)?,
                    transcription,
                    duration_seconds,
                    raw_response: serde_json::from_str(&raw_response)?,
                    metadata: serde_json::from_str(&metadata)?,
                })
            })
            .collect()
    }
}

/// One nested sub-record as read back for flattening.
struct ResultRecord {
    question_id: String,
    start_time: Option<String>,
    end_time: Option<String>,
    scores: MetricScores,
    transcription: Option<String>,
    duration_seconds: Option<f64>,
    raw_response: Value,
    metadata: Value,
}

impl ResultRecord {
    /// Flatten into one item: denormalized metrics prefer the raw payload,
    /// falling back per metric to the stored scores; timestamps, provenance,
    /// and the verbatim payload copy through.
    fn into_item(self, user_id: &str, session_id: &str) -> ItemRecord {
        let result = EvaluationResult {
            scores: self.scores,
            transcription: self.transcription,
            duration_seconds: self.duration_seconds,
            raw_response: self.raw_response,
            ..EvaluationResult::default()
        };
        build_item(
            user_id,
            session_id,
            &self.question_id,
            &result,
            &self.metadata,
            self.start_time.as_deref(),
            self.end_time.as_deref(),
        )
    }
}
