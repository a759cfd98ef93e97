/// Inline SQL migrations for the verbal-assess database schema.
///
/// We use simple inline migrations rather than sqlx migration files
/// because the schema is small and self-contained.

pub const MIGRATIONS: &[&str] = &[
    // Migration 1: nested-schema session documents.
    // `user_id` is nullable on purpose: the legacy corpus contains session
    // rows without one, and the migrator must be able to see and skip them.
    r#"
CREATE TABLE IF NOT EXISTS assessments (
    id TEXT PRIMARY KEY,
    user_id TEXT,
    status TEXT NOT NULL DEFAULT 'in_progress',
    created_at INTEGER NOT NULL,
    last_updated INTEGER NOT NULL,
    assessment_start_time TEXT,
    assessment_end_time TEXT,
    total_questions INTEGER NOT NULL DEFAULT 3,
    completed_questions INTEGER NOT NULL DEFAULT 0 CHECK (completed_questions >= 0),
    progress_percentage REAL NOT NULL DEFAULT 0,
    overall_score REAL,
    question_results TEXT NOT NULL DEFAULT '{}'
);
"#,
    // Migration 2: nested-schema per-question sub-records (the legacy
    // "results subcollection"): full result payloads keyed by session.
    r#"
CREATE TABLE IF NOT EXISTS assessment_results (
    assessment_id TEXT NOT NULL,
    question_id TEXT NOT NULL,
    user_id TEXT,
    question_index INTEGER,
    created_at INTEGER NOT NULL,
    start_time TEXT,
    end_time TEXT,
    scores TEXT NOT NULL DEFAULT '{}',
    transcription TEXT,
    duration_seconds REAL,
    raw_response TEXT NOT NULL DEFAULT 'null',
    metadata TEXT NOT NULL DEFAULT '{}',
    PRIMARY KEY (assessment_id, question_id)
);
"#,
    // Migration 3: flattened per-item records. `id` is deterministic
    // ("{assessment_id}_{question_id}") so resubmission and migration
    // re-runs overwrite or no-op instead of duplicating.
    r#"
CREATE TABLE IF NOT EXISTS assessment_items (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    assessment_id TEXT NOT NULL,
    question_id TEXT NOT NULL,
    question_index INTEGER,
    created_at INTEGER NOT NULL,
    start_time TEXT,
    end_time TEXT,
    transcription TEXT,
    duration_seconds REAL,
    overall REAL,
    pronunciation REAL,
    fluency REAL,
    rhythm REAL,
    integrity REAL,
    speed_wpm REAL,
    pause_count INTEGER,
    rear_tone TEXT,
    application_id TEXT,
    token_id TEXT,
    record_id TEXT,
    kernel_version TEXT,
    resource_version TEXT,
    dt_last_response_raw TEXT,
    raw_response TEXT NOT NULL DEFAULT 'null',
    metadata TEXT NOT NULL DEFAULT '{}'
);
"#,
    // Migration 4: indexes for the locator and item listings.
    r#"CREATE INDEX IF NOT EXISTS idx_assessments_user ON assessments(user_id, created_at);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_items_user_session ON assessment_items(user_id, assessment_id);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_items_created ON assessment_items(created_at DESC);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_results_assessment ON assessment_results(assessment_id);"#,
];
