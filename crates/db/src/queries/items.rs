// crates/db/src/queries/items.rs
// Flattened-schema item operations: upsert, listing, and the open-session
// lookup used by the locator when sessions exist only as item groupings.

use crate::{Database, DbResult};
use sqlx::SqliteConnection;
use verbal_assess_core::{ItemRecord, TOTAL_QUESTIONS};

use super::row_types::ItemRow;

/// An in-progress session as seen through the flattened schema: a group of
/// items sharing an `assessment_id` with fewer than the full question count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenItemGroup {
    pub assessment_id: String,
    pub recorded_questions: u32,
    /// Creation time of the group's earliest item (locator tie-break key).
    pub first_created_at: i64,
}

/// Locate the user's open session among item groups: earliest-created group
/// with fewer than the full question count recorded.
pub(crate) async fn find_open_item_group_tx(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> DbResult<Option<OpenItemGroup>> {
    let row: Option<(String, i64, i64)> = sqlx::query_as(
        r#"
        SELECT assessment_id,
               COUNT(DISTINCT question_id) AS recorded,
               MIN(created_at) AS first_created_at
        FROM assessment_items
        WHERE user_id = ?1
        GROUP BY assessment_id
        HAVING recorded < ?2
        ORDER BY first_created_at ASC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(i64::from(TOTAL_QUESTIONS))
    .fetch_optional(conn)
    .await?;

    Ok(row.map(|(assessment_id, recorded, first_created_at)| OpenItemGroup {
        assessment_id,
        recorded_questions: recorded.max(0) as u32,
        first_created_at,
    }))
}

/// Whether any item already references this session id for the user.
pub(crate) async fn item_session_exists_tx(
    conn: &mut SqliteConnection,
    user_id: &str,
    assessment_id: &str,
) -> DbResult<bool> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM assessment_items WHERE user_id = ?1 AND assessment_id = ?2",
    )
    .bind(user_id)
    .bind(assessment_id)
    .fetch_one(conn)
    .await?;

    Ok(row.0 > 0)
}

const INSERT_ITEM_SQL: &str = r#"
    INSERT INTO assessment_items (
        id, user_id, assessment_id, question_id, question_index, created_at,
        start_time, end_time, transcription, duration_seconds,
        overall, pronunciation, fluency, rhythm, integrity,
        speed_wpm, pause_count, rear_tone,
        application_id, token_id, record_id, kernel_version, resource_version,
        dt_last_response_raw, raw_response, metadata
    ) VALUES (
        ?1, ?2, ?3, ?4, ?5, ?6,
        ?7, ?8, ?9, ?10,
        ?11, ?12, ?13, ?14, ?15,
        ?16, ?17, ?18,
        ?19, ?20, ?21, ?22, ?23,
        ?24, ?25, ?26
    )
"#;

const UPSERT_ITEM_CLAUSE: &str = r#"
    ON CONFLICT(id) DO UPDATE SET
        question_index = excluded.question_index,
        created_at = excluded.created_at,
        start_time = excluded.start_time,
        end_time = excluded.end_time,
        transcription = excluded.transcription,
        duration_seconds = excluded.duration_seconds,
        overall = excluded.overall,
        pronunciation = excluded.pronunciation,
        fluency = excluded.fluency,
        rhythm = excluded.rhythm,
        integrity = excluded.integrity,
        speed_wpm = excluded.speed_wpm,
        pause_count = excluded.pause_count,
        rear_tone = excluded.rear_tone,
        application_id = excluded.application_id,
        token_id = excluded.token_id,
        record_id = excluded.record_id,
        kernel_version = excluded.kernel_version,
        resource_version = excluded.resource_version,
        dt_last_response_raw = excluded.dt_last_response_raw,
        raw_response = excluded.raw_response,
        metadata = excluded.metadata
"#;

fn bind_item<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    item: &'q ItemRecord,
    raw_json: &'q str,
    metadata_json: &'q str,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(&item.id)
        .bind(&item.user_id)
        .bind(&item.assessment_id)
        .bind(&item.question_id)
        .bind(item.question_index.map(i64::from))
        .bind(item.created_at)
        .bind(&item.start_time)
        .bind(&item.end_time)
        .bind(&item.transcription)
        .bind(item.duration_seconds)
        .bind(item.overall)
        .bind(item.pronunciation)
        .bind(item.fluency)
        .bind(item.rhythm)
        .bind(item.integrity)
        .bind(item.speed_wpm)
        .bind(item.pause_count)
        .bind(&item.rear_tone)
        .bind(&item.application_id)
        .bind(&item.token_id)
        .bind(&item.record_id)
        .bind(&item.kernel_version)
        .bind(&item.resource_version)
        .bind(&item.dt_last_response_raw)
        .bind(raw_json)
        .bind(metadata_json)
}

/// Upsert one flattened item: a resubmitted question id overwrites its
/// previous row via the deterministic primary key.
pub(crate) async fn upsert_item_tx(
    conn: &mut SqliteConnection,
    item: &ItemRecord,
) -> DbResult<()> {
    let raw_json = serde_json::to_string(&item.raw_response)?;
    let metadata_json = serde_json::to_string(&item.metadata)?;
    let sql = format!("{INSERT_ITEM_SQL}{UPSERT_ITEM_CLAUSE}");

    bind_item(sqlx::query(&sql), item, &raw_json, &metadata_json)
        .execute(conn)
        .await?;

    Ok(())
}

/// Insert-if-absent used by the migrator: an item already written by a
/// previous run is left untouched. Returns true when a row was inserted.
pub(crate) async fn insert_item_if_absent_tx(
    conn: &mut SqliteConnection,
    item: &ItemRecord,
) -> DbResult<bool> {
    let raw_json = serde_json::to_string(&item.raw_response)?;
    let metadata_json = serde_json::to_string(&item.metadata)?;
    let sql = INSERT_ITEM_SQL.replacen("INSERT", "INSERT OR IGNORE", 1);

    let result = bind_item(sqlx::query(&sql), item, &raw_json, &metadata_json)
        .execute(conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

impl Database {
    /// List a user's flattened items, newest first, optionally filtered to
    /// one session.
    pub async fn list_items(
        &self,
        user_id: &str,
        assessment_id: Option<&str>,
    ) -> DbResult<Vec<ItemRecord>> {
        let rows: Vec<ItemRow> = match assessment_id {
            Some(aid) => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM assessment_items
                    WHERE user_id = ?1 AND assessment_id = ?2
                    ORDER BY created_at DESC
                    "#,
                )
                .bind(user_id)
                .bind(aid)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM assessment_items
                    WHERE user_id = ?1
                    ORDER BY created_at DESC
                    "#,
                )
                .bind(user_id)
                .fetch_all(self.pool())
                .await?
            }
        };

        Ok(rows.into_iter().map(ItemRow::into_item_record).collect())
    }

    /// Count distinct sessions represented in the flattened collection for
    /// a user.
    pub async fn count_item_sessions(&self, user_id: &str) -> DbResult<u64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(DISTINCT assessment_id) FROM assessment_items WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_one(self.pool())
        .await?;
        Ok(row.0 as u64)
    }
}
