// crates/core/src/progress.rs
//! Progress aggregation: pure functions over already-persisted results.

use crate::types::{
    AssessmentSummary, ItemRecord, QuestionResultMap, SessionStatus, TOTAL_QUESTIONS,
};

/// Aggregate fields recomputed for a nested-schema session row after a merge.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedAggregate {
    pub completed_questions: u32,
    pub progress_percentage: f64,
    /// Present only once all questions are recorded.
    pub overall_score: Option<f64>,
}

/// Recompute a nested session's cached aggregates from its embedded
/// question-result map. Distinct question identifiers count once, however
/// many times they were resubmitted; a missing per-question overall counts
/// as zero in the final mean (legacy behavior, kept).
pub fn aggregate_question_results(results: &QuestionResultMap) -> NestedAggregate {
    let completed_questions = results.values().filter(|q| q.completed).count() as u32;
    let progress_percentage = f64::from(completed_questions) / f64::from(TOTAL_QUESTIONS) * 100.0;

    let overall_score = if completed_questions == TOTAL_QUESTIONS {
        let total: f64 = results
            .values()
            .map(|q| q.scores.overall.unwrap_or(0.0))
            .sum();
        Some(total / f64::from(TOTAL_QUESTIONS))
    } else {
        None
    };

    NestedAggregate {
        completed_questions,
        progress_percentage,
        overall_score,
    }
}

/// Summarize a flattened session from its persisted items.
///
/// Returns `None` when no items exist. Both question counts report the
/// items actually present; progress is still measured against the fixed
/// session length. The overall score is the mean of the
/// items that actually carry an `overall` metric; items without one are
/// ignored rather than counted as zero. Start and end times are the min and
/// max of the recorded RFC 3339 strings (lexicographic order matches
/// chronological order for that format).
pub fn summarize_items(
    user_id: &str,
    assessment_id: &str,
    items: &[ItemRecord],
) -> Option<AssessmentSummary> {
    if items.is_empty() {
        return None;
    }

    let count = items.len() as u32;
    let overalls: Vec<f64> = items.iter().filter_map(|i| i.overall).collect();
    let overall_score = if overalls.is_empty() {
        None
    } else {
        Some(overalls.iter().sum::<f64>() / overalls.len() as f64)
    };

    let start_time = items
        .iter()
        .filter_map(|i| i.start_time.as_deref())
        .min()
        .map(str::to_owned);
    let end_time = items
        .iter()
        .filter_map(|i| i.end_time.as_deref())
        .max()
        .map(str::to_owned);

    Some(AssessmentSummary {
        assessment_id: assessment_id.to_owned(),
        user_id: user_id.to_owned(),
        total_questions: count,
        completed_questions: count,
        progress_percentage: f64::from(count) / f64::from(TOTAL_QUESTIONS) * 100.0,
        overall_score,
        start_time,
        end_time,
        status: SessionStatus::derive(count),
    })
}
