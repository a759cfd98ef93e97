//! Integration tests for the legacy nested-schema store path.

use pretty_assertions::{assert_eq, assert_ne};
use verbal_assess_core::SessionStatus;
use verbal_assess_db::store::Submission;
use verbal_assess_db::{Database, SchemaVersion, Store};

use store_shared::eval_result;

async fn nested_store() -> Store {
    let db = Database::new_in_memory().await.unwrap();
    Store::new(db, SchemaVersion::Nested)
}

#[tokio::test]
async fn three_submissions_complete_one_session() {
    let store = nested_store().await;

    let r1 = eval_result(80.0);
    let r2 = eval_result(85.0);
    let r3 = eval_result(90.0);

    let s1 = store
        .submit_question_result(
            Submission::new("u1", "q1", &r1)
                .with_times("2024-01-01T00:01:00Z", "2024-01-01T00:01:30Z"),
        )
        .await
        .unwrap();
    let s2 = store
        .submit_question_result(Submission::new("u1", "q2", &r2))
        .await
        .unwrap();
    let s3 = store
        .submit_question_result(
            Submission::new("u1", "q3", &r3)
                .with_times("2024-01-01T00:03:00Z", "2024-01-01T00:03:30Z"),
        )
        .await
        .unwrap();

    assert_eq!(s1, s2);
    assert_eq!(s2, s3);

    let db = store.database().unwrap();
    assert_eq!(db.count_sessions("u1").await.unwrap(), 1);

    let summary = store.get_session_summary("u1", &s1).await.unwrap();
    assert_eq!(summary.total_questions, 3);
    assert_eq!(summary.completed_questions, 3);
    assert_eq!(summary.overall_score, Some(85.0));
    assert_eq!(summary.progress_percentage, 100.0);
    assert_eq!(summary.status, SessionStatus::Completed);
    // Start was set by q1 and never overwritten; end set on completion.
    assert_eq!(summary.start_time.as_deref(), Some("2024-01-01T00:01:00Z"));
    assert_eq!(summary.end_time.as_deref(), Some("2024-01-01T00:03:30Z"));
}

#[tokio::test]
async fn partial_session_has_no_overall_score() {
    let store = nested_store().await;
    let r = eval_result(80.0);

    let sid = store
        .submit_question_result(Submission::new("u1", "q1", &r))
        .await
        .unwrap();
    store
        .submit_question_result(Submission::new("u1", "q2", &r))
        .await
        .unwrap();

    let summary = store.get_session_summary("u1", &sid).await.unwrap();
    assert_eq!(summary.completed_questions, 2);
    assert_eq!(summary.overall_score, None);
    assert_eq!(summary.status, SessionStatus::InProgress);
    assert_eq!(summary.end_time, None);
}

#[tokio::test]
async fn resubmitting_a_question_never_double_counts() {
    let store = nested_store().await;
    let r = eval_result(80.0);

    let sid = store
        .submit_question_result(Submission::new("u1", "q1", &r))
        .await
        .unwrap();
    for _ in 0..3 {
        let again = store
            .submit_question_result(Submission::new("u1", "q1", &r))
            .await
            .unwrap();
        assert_eq!(again, sid);
    }

    let summary = store.get_session_summary("u1", &sid).await.unwrap();
    assert_eq!(summary.completed_questions, 1);

    let db = store.database().unwrap();
    assert_eq!(db.count_sessions("u1").await.unwrap(), 1);
}

#[tokio::test]
async fn hint_is_ignored_while_a_session_is_open() {
    let store = nested_store().await;
    let r = eval_result(80.0);

    let open = store
        .submit_question_result(Submission::new("u1", "q1", &r))
        .await
        .unwrap();
    let resolved = store
        .submit_question_result(Submission::new("u1", "q2", &r).with_hint("fabricated"))
        .await
        .unwrap();

    assert_eq!(resolved, open);
    let db = store.database().unwrap();
    assert_eq!(db.count_sessions("u1").await.unwrap(), 1);
}

#[tokio::test]
async fn completing_a_session_closes_it_to_the_locator() {
    let store = nested_store().await;
    let r = eval_result(85.0);

    let first = store
        .submit_question_result(Submission::new("u1", "q1", &r))
        .await
        .unwrap();
    for qid in ["q2", "q3"] {
        store
            .submit_question_result(Submission::new("u1", qid, &r))
            .await
            .unwrap();
    }

    let second = store
        .submit_question_result(Submission::new("u1", "q1", &r))
        .await
        .unwrap();
    assert_ne!(second, first, "a completed session must not be reopened");

    let db = store.database().unwrap();
    assert_eq!(db.count_sessions("u1").await.unwrap(), 2);
}

#[tokio::test]
async fn reopened_status_makes_a_session_locatable_again() {
    let store = nested_store().await;
    let r = eval_result(85.0);

    let sid = store
        .submit_question_result(Submission::new("u1", "q1", &r))
        .await
        .unwrap();
    for qid in ["q2", "q3"] {
        store
            .submit_question_result(Submission::new("u1", qid, &r))
            .await
            .unwrap();
    }

    // Legacy override: force the session out of completed state.
    assert!(store.mark_session_status(&sid, SessionStatus::InProgress).await);

    let resolved = store
        .submit_question_result(Submission::new("u1", "q2", &r))
        .await
        .unwrap();
    assert_eq!(resolved, sid);
}

#[tokio::test]
async fn mark_status_reports_missing_sessions() {
    let store = nested_store().await;
    assert!(
        !store
            .mark_session_status("missing", SessionStatus::Completed)
            .await
    );
}

#[tokio::test]
async fn unavailable_store_mocks_the_nested_path_too() {
    let store = Store::unavailable(SchemaVersion::Nested);
    let r = eval_result(80.0);

    let id = store
        .submit_question_result(Submission::new("u9", "q1", &r))
        .await
        .unwrap();
    assert!(id.starts_with("u9_mock_"));
    assert!(store.get_session_summary("u9", &id).await.is_none());
}
