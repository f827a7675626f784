// tests/quiz_tests.rs

use std::sync::Arc;

use classroom::{
    config::Config,
    error::AppError,
    models::{
        attempt::{Answer, QuizAttempt},
        class::Role,
        paths,
        question::QuizQuestion,
    },
    services::{Services, authoring::NewQuiz},
    store::{DocumentStore, MemoryStore, Write},
};
use serde_json::json;

fn setup(batch_limit: usize) -> (Services, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::with_batch_limit(batch_limit));
    let mut config = Config::for_tests("test_secret");
    config.tx_max_attempts = 50;
    config.tx_backoff_ms = 1;
    let services = Services::new(store.clone(), &config);
    (services, store)
}

fn question(value: serde_json::Value) -> QuizQuestion {
    serde_json::from_value(value).expect("invalid question fixture")
}

fn geography_pool() -> Vec<QuizQuestion> {
    vec![
        question(json!({
            "id": "q1", "prompt": "Largest ocean?", "kind": "mcq-single",
            "choices": ["Pacific", "Atlantic"], "correct": 0
        })),
        question(json!({
            "id": "q2", "prompt": "Capital of France?", "kind": "text",
            "correctText": "Paris"
        })),
    ]
}

/// Class with a teacher, one student and a quiz built from `pool`.
async fn class_with_quiz(services: &Services, pool: Vec<QuizQuestion>, num_questions: Option<u32>) -> (String, String) {
    let class = services
        .membership
        .create_class("course-1", "Geography", "teacher")
        .await
        .unwrap();
    services
        .membership
        .add_or_update_member(&class.id, "student", Role::Student)
        .await
        .unwrap();

    let quiz = services
        .authoring
        .create_quiz(
            &class.id,
            "teacher",
            NewQuiz {
                title: "Week 1".to_string(),
                instructions: None,
                pool,
                num_questions,
                points: None,
            },
        )
        .await
        .unwrap();
    (class.id, quiz.id)
}

fn slot_of(attempt: &QuizAttempt, id: &str) -> usize {
    attempt
        .selected_ids
        .iter()
        .position(|selected| selected == id)
        .expect("question not drawn")
}

#[tokio::test]
async fn create_quiz_defaults_and_validation() {
    let (services, _) = setup(500);
    let (class_id, quiz_id) = class_with_quiz(&services, geography_pool(), Some(10)).await;

    let quiz = services.authoring.assignment(&class_id, &quiz_id).await.unwrap();
    assert_eq!(quiz.num_questions, 2);
    assert_eq!(quiz.points, 2);
    assert_eq!(quiz.assignment_type, "quiz");

    let empty = services
        .authoring
        .create_quiz(
            &class_id,
            "teacher",
            NewQuiz {
                title: "Empty".to_string(),
                instructions: None,
                pool: vec![],
                num_questions: None,
                points: None,
            },
        )
        .await;
    assert!(matches!(empty, Err(AppError::BadRequest(_))));

    let no_class = services
        .authoring
        .create_quiz(
            "missing",
            "teacher",
            NewQuiz {
                title: "Orphan".to_string(),
                instructions: None,
                pool: geography_pool(),
                num_questions: None,
                points: None,
            },
        )
        .await;
    assert!(matches!(no_class, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn start_attempt_is_idempotent() {
    let (services, store) = setup(500);
    let pool: Vec<QuizQuestion> = (0..8)
        .map(|i| question(json!({ "id": format!("q{i}"), "prompt": "p", "kind": "text", "correctText": "x" })))
        .collect();
    let (class_id, quiz_id) = class_with_quiz(&services, pool, Some(3)).await;

    let first = services
        .quiz
        .start_attempt_if_needed(&class_id, &quiz_id, "student")
        .await
        .unwrap();
    assert_eq!(first.selected_ids.len(), 3);
    assert_eq!(first.answers, vec![Answer::Unanswered; 3]);
    assert_eq!(first.score, None);

    let second = services
        .quiz
        .start_attempt_if_needed(&class_id, &quiz_id, "student")
        .await
        .unwrap();
    assert_eq!(second.selected_ids, first.selected_ids);

    let attempts = store
        .query(&classroom::store::Query::collection(paths::attempts(&class_id, &quiz_id)))
        .await
        .unwrap();
    assert_eq!(attempts.len(), 1);
}

#[tokio::test]
async fn start_attempt_for_missing_assignment_is_not_found() {
    let (services, _) = setup(500);
    let (class_id, _) = class_with_quiz(&services, geography_pool(), None).await;
    let result = services
        .quiz
        .start_attempt_if_needed(&class_id, "nope", "student")
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_draw_once() {
    let (services, _) = setup(500);
    let pool: Vec<QuizQuestion> = (0..20)
        .map(|i| question(json!({ "id": format!("q{i}"), "prompt": "p", "kind": "text", "correctText": "x" })))
        .collect();
    let (class_id, quiz_id) = class_with_quiz(&services, pool, Some(5)).await;

    let mut handles = Vec::new();
    for _ in 0..6 {
        let services = services.clone();
        let (class_id, quiz_id) = (class_id.clone(), quiz_id.clone());
        handles.push(tokio::spawn(async move {
            services
                .quiz
                .start_attempt_if_needed(&class_id, &quiz_id, "student")
                .await
        }));
    }

    let mut draws = Vec::new();
    for handle in handles {
        draws.push(handle.await.unwrap().unwrap().selected_ids);
    }
    assert!(draws.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test]
async fn submit_grades_single_and_text_questions() {
    let (services, _) = setup(500);
    let (class_id, quiz_id) = class_with_quiz(&services, geography_pool(), None).await;
    let attempt = services
        .quiz
        .start_attempt_if_needed(&class_id, &quiz_id, "student")
        .await
        .unwrap();

    services
        .quiz
        .save_answer_single(&class_id, &quiz_id, "student", slot_of(&attempt, "q1"), 0)
        .await
        .unwrap();
    services
        .quiz
        .save_answer_text(&class_id, &quiz_id, "student", slot_of(&attempt, "q2"), "  PÂRIS ")
        .await
        .unwrap();

    let graded = services
        .quiz
        .submit_and_grade(&class_id, &quiz_id, "student")
        .await
        .unwrap();
    assert_eq!(graded.score, Some(2));
    assert!(graded.submitted_at.is_some());
    assert!(graded.graded_at.is_some());
    assert_eq!(graded.selected_ids, attempt.selected_ids);
}

#[tokio::test]
async fn graded_attempt_is_immutable() {
    let (services, _) = setup(500);
    let (class_id, quiz_id) = class_with_quiz(&services, geography_pool(), None).await;
    services
        .quiz
        .start_attempt_if_needed(&class_id, &quiz_id, "student")
        .await
        .unwrap();
    services
        .quiz
        .submit_and_grade(&class_id, &quiz_id, "student")
        .await
        .unwrap();

    let again = services.quiz.submit_and_grade(&class_id, &quiz_id, "student").await;
    assert!(matches!(again, Err(AppError::Conflict(_))));

    let save = services
        .quiz
        .save_answer_text(&class_id, &quiz_id, "student", 0, "late")
        .await;
    assert!(matches!(save, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn submit_without_attempt_is_not_found() {
    let (services, _) = setup(500);
    let (class_id, quiz_id) = class_with_quiz(&services, geography_pool(), None).await;
    let result = services.quiz.submit_and_grade(&class_id, &quiz_id, "student").await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn answers_saved_before_start_cannot_be_graded_or_redrawn() {
    let (services, store) = setup(500);
    let (class_id, quiz_id) = class_with_quiz(&services, geography_pool(), None).await;

    let early = services
        .quiz
        .save_answer_text(&class_id, &quiz_id, "student", 0, "paris")
        .await
        .unwrap();
    assert!(early.selected_ids.is_empty());

    let submit = services.quiz.submit_and_grade(&class_id, &quiz_id, "student").await;
    assert!(matches!(submit, Err(AppError::Conflict(_))));

    let started = services
        .quiz
        .start_attempt_if_needed(&class_id, &quiz_id, "student")
        .await
        .unwrap();
    assert_eq!(started.selected_ids.len(), 2);
    assert_eq!(started.answers.len(), 2);

    let graded = services
        .quiz
        .submit_and_grade(&class_id, &quiz_id, "student")
        .await
        .unwrap();
    let score = graded.score;
    assert!(score.is_some());

    // A start after grading leaves the graded attempt as it was.
    let after = services
        .quiz
        .start_attempt_if_needed(&class_id, &quiz_id, "student")
        .await
        .unwrap();
    assert_eq!(after.score, score);
    assert_eq!(after.selected_ids, graded.selected_ids);
    assert_eq!(after.graded_at, graded.graded_at);

    let stored = store
        .get(&paths::attempt(&class_id, &quiz_id, "student"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.data["score"], json!(score));
}

#[tokio::test]
async fn start_after_grading_keeps_graded_attempt() {
    let (services, store) = setup(500);
    let (class_id, quiz_id) = class_with_quiz(&services, geography_pool(), None).await;
    let attempt_path = paths::attempt(&class_id, &quiz_id, "student");

    // Graded record written without a draw, as older clients left them.
    store
        .commit(
            &[],
            &[Write::Set {
                path: attempt_path.clone(),
                data: json!({ "uid": "student", "answers": ["paris"], "score": 0 }),
                merge: false,
                transforms: vec![],
            }],
        )
        .await
        .unwrap();

    let after = services
        .quiz
        .start_attempt_if_needed(&class_id, &quiz_id, "student")
        .await
        .unwrap();
    assert_eq!(after.score, Some(0));
    assert!(after.selected_ids.is_empty());
}

#[tokio::test]
async fn multi_toggle_round_trips_and_grades_as_set() {
    let (services, _) = setup(500);
    let pool = vec![question(json!({
        "id": "m1", "prompt": "Pick primes", "kind": "mcq-multi",
        "choices": ["1", "2", "4", "5"], "correctMulti": [1, 3]
    }))];
    let (class_id, quiz_id) = class_with_quiz(&services, pool, None).await;
    services
        .quiz
        .start_attempt_if_needed(&class_id, &quiz_id, "student")
        .await
        .unwrap();

    let steps = [(3, vec![3]), (2, vec![2, 3]), (2, vec![3]), (1, vec![1, 3])];
    for (choice, expected) in steps {
        let attempt = services
            .quiz
            .toggle_answer_multi(&class_id, &quiz_id, "student", 0, choice)
            .await
            .unwrap();
        assert_eq!(attempt.answers[0], Answer::Multi(expected));
    }

    let graded = services
        .quiz
        .submit_and_grade(&class_id, &quiz_id, "student")
        .await
        .unwrap();
    assert_eq!(graded.score, Some(1));
}

#[tokio::test]
async fn saves_check_index_and_question_kind() {
    let (services, _) = setup(500);
    let (class_id, quiz_id) = class_with_quiz(&services, geography_pool(), None).await;
    let attempt = services
        .quiz
        .start_attempt_if_needed(&class_id, &quiz_id, "student")
        .await
        .unwrap();

    let out_of_range = services
        .quiz
        .save_answer_single(&class_id, &quiz_id, "student", 2, 0)
        .await;
    assert!(matches!(out_of_range, Err(AppError::BadRequest(_))));

    let wrong_kind = services
        .quiz
        .save_answer_text(&class_id, &quiz_id, "student", slot_of(&attempt, "q1"), "Pacific")
        .await;
    assert!(matches!(wrong_kind, Err(AppError::BadRequest(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_saves_to_different_slots_both_land() {
    let (services, _) = setup(500);
    let pool: Vec<QuizQuestion> = (0..6)
        .map(|i| question(json!({ "id": format!("q{i}"), "prompt": "p", "kind": "text", "correctText": "x" })))
        .collect();
    let (class_id, quiz_id) = class_with_quiz(&services, pool, None).await;
    services
        .quiz
        .start_attempt_if_needed(&class_id, &quiz_id, "student")
        .await
        .unwrap();

    let mut handles = Vec::new();
    for slot in 0..6 {
        let services = services.clone();
        let (class_id, quiz_id) = (class_id.clone(), quiz_id.clone());
        handles.push(tokio::spawn(async move {
            services
                .quiz
                .save_answer_text(&class_id, &quiz_id, "student", slot, &format!("answer {slot}"))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let view = services.quiz.attempt_view(&class_id, &quiz_id, "student").await.unwrap();
    let expected: Vec<Answer> = (0..6).map(|slot| Answer::Text(format!("answer {slot}"))).collect();
    assert_eq!(view.attempt.answers, expected);
    assert_eq!(view.questions.len(), 6);
}

#[tokio::test]
async fn aggregations_skip_placeholder_attempts() {
    let (services, _) = setup(500);
    let (class_id, quiz_id) = class_with_quiz(&services, geography_pool(), None).await;
    services
        .membership
        .add_or_update_member(&class_id, "idle", Role::Student)
        .await
        .unwrap();

    let attempt = services
        .quiz
        .start_attempt_if_needed(&class_id, &quiz_id, "student")
        .await
        .unwrap();
    services
        .quiz
        .start_attempt_if_needed(&class_id, &quiz_id, "idle")
        .await
        .unwrap();
    services
        .quiz
        .save_answer_single(&class_id, &quiz_id, "student", slot_of(&attempt, "q1"), 1)
        .await
        .unwrap();

    let attempts = services
        .quiz
        .attempts_for_assignment(&class_id, &quiz_id)
        .await
        .unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].uid, "student");

    let counts = services.quiz.attempt_counts(&class_id).await.unwrap();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].count, 1);

    let rows = services.quiz.attempts_with_members(&class_id, &quiz_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].member.as_ref().map(|m| m.role), Some(Role::Student));
}

#[tokio::test]
async fn attempt_view_hides_answer_keys() {
    let (services, _) = setup(500);
    let (class_id, quiz_id) = class_with_quiz(&services, geography_pool(), None).await;
    services
        .quiz
        .start_attempt_if_needed(&class_id, &quiz_id, "student")
        .await
        .unwrap();

    let view = services.quiz.attempt_view(&class_id, &quiz_id, "student").await.unwrap();
    let body = serde_json::to_value(&view).unwrap();
    let text = body.to_string();
    assert!(!text.contains("correct"));
    assert!(!text.contains("Paris"));
}

#[tokio::test]
async fn question_pool_edits_track_num_questions() {
    let (services, _) = setup(500);
    let (class_id, quiz_id) = class_with_quiz(&services, geography_pool(), None).await;

    let added = services
        .authoring
        .add_question(
            &class_id,
            &quiz_id,
            question(json!({ "id": "q3", "prompt": "2+2?", "kind": "mcq-single", "choices": ["3", "4"], "correct": 1 })),
        )
        .await
        .unwrap();
    assert_eq!(added.pool.len(), 3);
    assert_eq!(added.num_questions, 3);

    let duplicate = services
        .authoring
        .add_question(
            &class_id,
            &quiz_id,
            question(json!({ "id": "q3", "prompt": "again", "kind": "text", "correctText": "x" })),
        )
        .await;
    assert!(matches!(duplicate, Err(AppError::BadRequest(_))));

    let removed = services
        .authoring
        .remove_question(&class_id, &quiz_id, "q1")
        .await
        .unwrap();
    assert_eq!(removed.pool.len(), 2);
    assert_eq!(removed.num_questions, 2);
    assert!(removed.question("q1").is_none());

    let missing = services.authoring.remove_question(&class_id, &quiz_id, "q1").await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn delete_assignment_removes_attempts_in_batches() {
    let (services, store) = setup(4);
    let (class_id, quiz_id) = class_with_quiz(&services, geography_pool(), None).await;
    for i in 0..9 {
        let uid = format!("s{i}");
        services
            .membership
            .add_or_update_member(&class_id, &uid, Role::Student)
            .await
            .unwrap();
        services
            .quiz
            .start_attempt_if_needed(&class_id, &quiz_id, &uid)
            .await
            .unwrap();
    }

    let deleted = services.quiz.delete_assignment(&class_id, &quiz_id).await.unwrap();
    assert_eq!(deleted, 9);
    assert!(matches!(
        services.authoring.assignment(&class_id, &quiz_id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(store.get(&paths::class(&class_id)).await.unwrap().is_some());
}
