// crates/core/src/lib.rs
//! Pure domain logic for the verbal assessment engine: value types,
//! question-identifier parsing, raw-payload metric extraction, and the
//! progress aggregator. No I/O lives here.

pub mod paths;
pub mod progress;
pub mod question;
pub mod raw;
pub mod types;

pub use progress::{aggregate_question_results, summarize_items, NestedAggregate};
pub use question::question_index;
pub use raw::{extract_item_fields, to_num, ExtractedFields};
pub use types::{
    AssessmentSummary, EvaluationResult, ItemRecord, MetricScores, Provenance, QuestionRecord,
    QuestionResultMap, SessionStatus, TOTAL_QUESTIONS,
};
