//! End-to-end behaviour of the progress engine against a real sqlite file.

use learnpath::{
    config::RecalculationConfig,
    curriculum::{document::WeekSource, lifecycle::PathStatus},
    db::init_database,
    ledger::{ContentType, NewCompletion},
    tracker::ProgressTracker,
};
use serde_json::json;
use sqlx::SqlitePool;

async fn setup() -> (tempfile::TempDir, SqlitePool, ProgressTracker) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("scenarios.db").display());
    let pool = init_database(&url).await.unwrap();
    let tracker = ProgressTracker::new(pool.clone(), RecalculationConfig::default());
    (dir, pool, tracker)
}

fn six_week_document() -> serde_json::Value {
    let weeks: Vec<serde_json::Value> = [4, 4, 3, 4, 5, 4]
        .iter()
        .enumerate()
        .map(|(i, n)| {
            json!({
                "title": format!("Week {}", i + 1),
                "subtitle": "",
                "description": "",
                "moduleCount": n,
            })
        })
        .collect();
    json!({
        "title": "Backend fundamentals",
        "totalModules": 24,
        "weeks": weeks,
    })
}

fn completion(learner_id: i64, n: usize, content_type: ContentType) -> NewCompletion {
    NewCompletion {
        learner_id,
        content_id: format!("content-{n}"),
        content_type,
        score: 8,
        total_questions: 10,
        percentage: 80,
        time_spent: 300,
        completed_at: None,
    }
}

#[tokio::test]
async fn scenario_a_sequential_allocation() {
    let (_dir, _pool, tracker) = setup().await;
    tracker
        .create_curriculum_path(1, &six_week_document())
        .await
        .unwrap();
    for n in 0..6 {
        let content_type = if n % 2 == 0 {
            ContentType::Quiz
        } else {
            ContentType::CodingChallenge
        };
        tracker
            .submit_completion(completion(1, n, content_type))
            .await
            .unwrap();
    }
    let path = tracker.get_curriculum_path(1).await.unwrap();
    let completed: Vec<i64> = path.weeks.iter().map(|w| w.completed_modules).collect();
    let percents: Vec<i64> = path.weeks.iter().map(|w| w.progress_percent).collect();
    assert_eq!(completed, vec![4, 2, 0, 0, 0, 0]);
    assert_eq!(percents, vec![100, 50, 0, 0, 0, 0]);
    assert_eq!(path.completed_modules, 6);
    assert_eq!(path.progress_percent, 25);
    assert_eq!(path.total_modules, 24);
}

#[tokio::test]
async fn scenario_b_fresh_path_stays_planned() {
    let (_dir, _pool, tracker) = setup().await;
    tracker
        .create_curriculum_path(2, &six_week_document())
        .await
        .unwrap();
    tracker.recalculate(2).await.unwrap();
    let path = tracker.get_curriculum_path(2).await.unwrap();
    assert_eq!(path.status, PathStatus::Planned);
    assert_eq!(path.progress_percent, 0);
    assert_eq!(path.completed_modules, 0);
}

#[tokio::test]
async fn scenario_c_started_path_never_reverts() {
    let (_dir, pool, tracker) = setup().await;
    tracker
        .create_curriculum_path(3, &six_week_document())
        .await
        .unwrap();
    tracker
        .submit_completion(completion(3, 0, ContentType::Quiz))
        .await
        .unwrap();
    assert_eq!(
        tracker.get_curriculum_path(3).await.unwrap().status,
        PathStatus::InProgress
    );

    // ledger anomaly: the completion disappears
    sqlx::query("DELETE FROM completion_record WHERE learner_id = 3")
        .execute(&pool)
        .await
        .unwrap();
    tracker.recalculate(3).await.unwrap();
    let path = tracker.get_curriculum_path(3).await.unwrap();
    assert_eq!(path.completed_modules, 1);
    assert_eq!(path.weeks[0].completed_modules, 1);
    assert_eq!(path.status, PathStatus::InProgress);
}

#[tokio::test]
async fn scenario_d_malformed_weeks_use_fallback() {
    let (_dir, _pool, tracker) = setup().await;
    let created = tracker
        .create_curriculum_path(4, &json!({"title": "broken", "weeks": {"week1": 3}}))
        .await
        .unwrap();
    assert!(matches!(created.week_source, WeekSource::Fallback(_)));
    assert_eq!(created.total_modules, 24);
    for n in 0..9 {
        tracker
            .submit_completion(completion(4, n, ContentType::Quiz))
            .await
            .unwrap();
    }
    let path = tracker.get_curriculum_path(4).await.unwrap();
    let completed: Vec<i64> = path.weeks.iter().map(|w| w.completed_modules).collect();
    assert_eq!(completed, vec![4, 4, 1, 0, 0, 0]);
    assert_eq!(path.progress_percent, 38);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenario_e_concurrent_submissions_keep_the_fresher_count() {
    let (_dir, _pool, tracker) = setup().await;
    tracker
        .create_curriculum_path(5, &six_week_document())
        .await
        .unwrap();
    for n in 0..3 {
        tracker
            .submit_completion(completion(5, n, ContentType::Quiz))
            .await
            .unwrap();
    }

    let a = tokio::spawn({
        let tracker = tracker.clone();
        async move {
            tracker
                .submit_completion(completion(5, 10, ContentType::Quiz))
                .await
        }
    });
    let b = tokio::spawn({
        let tracker = tracker.clone();
        async move {
            tracker
                .submit_completion(completion(5, 11, ContentType::CodingChallenge))
                .await
        }
    });
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let count = tracker.ledger().count_completions(5, &[]).await.unwrap();
    assert_eq!(count, 5);
    let path = tracker.get_curriculum_path(5).await.unwrap();
    assert_eq!(path.completed_modules, 5);
}

#[tokio::test]
async fn completions_beyond_total_are_capped() {
    let (_dir, _pool, tracker) = setup().await;
    tracker
        .create_curriculum_path(6, &json!({"weeks": [{"moduleCount": 1}, {"moduleCount": 1}]}))
        .await
        .unwrap();
    // retries of the same quiz each count
    for _ in 0..4 {
        tracker
            .submit_completion(completion(6, 0, ContentType::Quiz))
            .await
            .unwrap();
    }
    let path = tracker.get_curriculum_path(6).await.unwrap();
    assert_eq!(path.completed_modules, 2);
    assert_eq!(path.progress_percent, 100);
    assert_eq!(tracker.ledger().count_completions(6, &[]).await.unwrap(), 4);
}

#[tokio::test]
async fn learners_are_independent() {
    let (_dir, _pool, tracker) = setup().await;
    for learner in [7, 8] {
        tracker
            .create_curriculum_path(learner, &six_week_document())
            .await
            .unwrap();
    }
    tracker
        .submit_completion(completion(7, 0, ContentType::Quiz))
        .await
        .unwrap();
    assert_eq!(tracker.get_curriculum_path(7).await.unwrap().completed_modules, 1);
    let other = tracker.get_curriculum_path(8).await.unwrap();
    assert_eq!(other.completed_modules, 0);
    assert_eq!(other.status, PathStatus::Planned);
}
