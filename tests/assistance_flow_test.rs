use std::env;

use sqlx::PgPool;
use uuid::Uuid;

use classroom_backend::dto::student_dto::{
    AnswerInput, CompleteLevel3Request, RecapAnswerInput, SubmitLevel1Request, SubmitQuizRequest,
};
use classroom_backend::dto::teacher_dto::{
    CreateClassPayload, CreateLevel1Payload, CreateLevel3Payload, CreateQuestionPayload,
    CreateQuizPayload, CreateRecapQuestionPayload,
};
use classroom_backend::error::Error;
use classroom_backend::models::progress::NextStep;
use classroom_backend::models::user::{AuthContext, UserRole};
use classroom_backend::services::assistance_service::AssistanceService;
use classroom_backend::services::attempt_service::AttemptService;
use classroom_backend::services::class_service::ClassService;
use classroom_backend::services::progress_service::ProgressService;
use classroom_backend::services::quiz_service::QuizService;

/// These tests need a live Postgres; they skip (not fail) without one.
async fn setup() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    if env::var("DATABASE_URL").is_err() {
        eprintln!("DATABASE_URL not set; skipping database test");
        return None;
    }
    env::set_var("SERVER_ADDRESS", "127.0.0.1:0");
    if env::var("JWT_SECRET").is_err() {
        env::set_var("JWT_SECRET", "test_secret_key");
    }
    env::set_var("JWT_EXPIRY_HOURS", "24");
    env::set_var("STUDENT_RPS", "1000");
    env::set_var("TEACHER_RPS", "1000");
    let _ = classroom_backend::config::init_config();

    let pool = classroom_backend::database::pool::create_pool()
        .await
        .expect("pool");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    Some(pool)
}

async fn seed_user(pool: &PgPool, role: &str) -> AuthContext {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO users (id, name, email, password_hash, role)
        VALUES ($1, $2, $3, 'x', $4)
        "#,
    )
    .bind(id)
    .bind(format!("{} {}", role, id))
    .bind(format!("{}_{}@example.com", role, id))
    .bind(role)
    .execute(pool)
    .await
    .expect("seed user");
    AuthContext {
        user_id: id,
        role: UserRole::parse(role).unwrap(),
    }
}

struct Fixture {
    teacher: AuthContext,
    student: AuthContext,
    quiz_id: Uuid,
}

async fn seed_quiz(pool: &PgPool) -> Fixture {
    let teacher = seed_user(pool, "teacher").await;
    let student = seed_user(pool, "student").await;

    let class_service = ClassService::new(pool.clone());
    let class = class_service
        .create_class(
            &teacher,
            CreateClassPayload {
                name: "Grade 7 Science".into(),
                description: None,
            },
        )
        .await
        .expect("class");
    class_service
        .enroll_student(&teacher, class.id, student.user_id)
        .await
        .expect("enroll");

    let quiz_service = QuizService::new(pool.clone());
    let quiz = quiz_service
        .create_quiz(
            &teacher,
            CreateQuizPayload {
                class_id: class.id,
                title: "Planets".into(),
                description: None,
                questions: vec![
                    CreateQuestionPayload {
                        text: "2 + 2?".into(),
                        expected_answer: Some("4".into()),
                        image_url: None,
                    },
                    CreateQuestionPayload {
                        text: "Capital of France?".into(),
                        expected_answer: Some("Paris".into()),
                        image_url: None,
                    },
                    CreateQuestionPayload {
                        text: "Closest planet to the sun?".into(),
                        expected_answer: Some("Mercury".into()),
                        image_url: None,
                    },
                ],
            },
        )
        .await
        .expect("quiz");

    Fixture {
        teacher,
        student,
        quiz_id: quiz.quiz.id,
    }
}

async fn submit(
    pool: &PgPool,
    auth: &AuthContext,
    quiz_id: Uuid,
    texts: &[&str],
) -> classroom_backend::error::Result<classroom_backend::dto::student_dto::SubmitQuizResponse> {
    let questions = sqlx::query_as::<_, classroom_backend::models::question::Question>(
        r#"SELECT * FROM questions WHERE quiz_id = $1 ORDER BY ordinal, id"#,
    )
    .bind(quiz_id)
    .fetch_all(pool)
    .await
    .expect("questions");

    let answers = questions
        .iter()
        .zip(texts.iter())
        .map(|(q, t)| AnswerInput {
            question_id: q.id,
            answer_text: t.to_string(),
        })
        .collect();
    AttemptService::new(pool.clone())
        .submit_main_quiz(auth, quiz_id, SubmitQuizRequest { answers })
        .await
}

#[tokio::test]
async fn failing_submission_unlocks_level1() {
    let Some(pool) = setup().await else { return };
    let fx = seed_quiz(&pool).await;

    // Scenario A: 2/3 correct is 67%, below the 70% bar and not perfect.
    let resp = submit(&pool, &fx.student, fx.quiz_id, &["4", "Paris", "Venus"])
        .await
        .expect("submission");
    assert_eq!(resp.score, 67);
    assert!(!resp.passed);
    assert_eq!(resp.next_action, Some(NextStep::CompleteAssistanceLevel1));

    let progress = ProgressService::new(pool.clone())
        .get(fx.student.user_id, fx.quiz_id)
        .await
        .expect("progress")
        .expect("progress row");
    assert_eq!(progress.failed_attempts, 1);
    assert!(progress.level1_accessible);
}

#[tokio::test]
async fn perfect_submission_passes_terminally() {
    let Some(pool) = setup().await else { return };
    let fx = seed_quiz(&pool).await;

    // Scenario B: all correct passes regardless of rounding.
    let resp = submit(&pool, &fx.student, fx.quiz_id, &["4", "paris", " MERCURY "])
        .await
        .expect("submission");
    assert!(resp.passed);
    assert_eq!(resp.score, 100);

    // Scenario D-ish for the passed case: any further attempt is rejected
    // and leaves the counters alone (P2).
    let err = submit(&pool, &fx.student, fx.quiz_id, &["4", "Paris", "Mercury"])
        .await
        .expect_err("should be rejected");
    assert!(matches!(err, Error::AttemptLimitExceeded(_)));

    let progress = ProgressService::new(pool.clone())
        .get(fx.student.user_id, fx.quiz_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(progress.failed_attempts, 0);
    assert_eq!(progress.current_attempt, 1);
}

#[tokio::test]
async fn four_failures_are_terminal_without_new_rows() {
    let Some(pool) = setup().await else { return };
    let fx = seed_quiz(&pool).await;
    let assistance = AssistanceService::new(pool.clone());
    let quiz_service = QuizService::new(pool.clone());

    // Ladder: fail, complete the unlocked level, repeat.
    let wrong = ["1", "London", "Venus"];

    // Fail #1 -> level 1.
    submit(&pool, &fx.student, fx.quiz_id, &wrong).await.unwrap();
    let level1 = quiz_service
        .create_level1(
            &fx.teacher,
            fx.quiz_id,
            CreateLevel1Payload {
                title: "Recap".into(),
                questions: vec![CreateRecapQuestionPayload {
                    text: "2 + 2?".into(),
                    options: vec!["3".into(), "4".into()],
                    correct_option: 1,
                }],
            },
        )
        .await
        .unwrap();
    let recap_question_id: Uuid = sqlx::query_scalar(
        r#"SELECT id FROM assistance_level1_questions WHERE assistance_id = $1"#,
    )
    .bind(level1.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    let recap = assistance
        .submit_level1(
            &fx.student,
            level1.id,
            SubmitLevel1Request {
                answers: vec![RecapAnswerInput {
                    question_id: recap_question_id,
                    selected_option: 1,
                }],
            },
        )
        .await
        .unwrap();
    assert!(recap.passed);

    // Fail #2 -> level 2; teacher approves the essay.
    submit(&pool, &fx.student, fx.quiz_id, &wrong).await.unwrap();
    let level2 = quiz_service
        .create_level2(
            &fx.teacher,
            fx.quiz_id,
            classroom_backend::dto::teacher_dto::CreateLevel2Payload {
                prompt: "Explain planetary order".into(),
                material_url: None,
            },
        )
        .await
        .unwrap();
    let essay = assistance
        .submit_level2(
            &fx.student,
            level2.id,
            classroom_backend::dto::student_dto::SubmitLevel2Request {
                essay_text: "Because gravity.".into(),
                file_url: None,
            },
        )
        .await
        .unwrap();
    assistance
        .approve_level2(
            &fx.teacher,
            essay.submission_id,
            classroom_backend::dto::teacher_dto::ApproveLevel2Request {
                approved: true,
                feedback: Some("ok".into()),
            },
        )
        .await
        .unwrap();

    // Fail #3 -> level 3 reading (Scenario C).
    submit(&pool, &fx.student, fx.quiz_id, &wrong).await.unwrap();
    let level3 = quiz_service
        .create_level3(
            &fx.teacher,
            fx.quiz_id,
            CreateLevel3Payload {
                title: "Reading".into(),
                material_url: "https://example.com/planets.pdf".into(),
            },
        )
        .await
        .unwrap();
    let done = assistance
        .complete_level3(&fx.student, level3.id, CompleteLevel3Request {
            reading_time_seconds: Some(90),
        })
        .await
        .unwrap();
    assert_eq!(done.next_action, Some(NextStep::TryMainQuizAgain));

    // P5: repeating the confirmation neither fails nor duplicates.
    assistance
        .complete_level3(&fx.student, level3.id, CompleteLevel3Request {
            reading_time_seconds: Some(120),
        })
        .await
        .unwrap();
    let completions: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM assistance_level3_completions WHERE assistance_id = $1 AND student_id = $2"#,
    )
    .bind(level3.id)
    .bind(fx.student.user_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(completions, 1);

    // Fail #4 -> terminal.
    let resp = submit(&pool, &fx.student, fx.quiz_id, &wrong).await.unwrap();
    assert_eq!(resp.next_action, Some(NextStep::QuizFailedMaxAttempts));

    // Scenario D: the fifth attempt is rejected before any row is written.
    let before: i64 =
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM quiz_submissions WHERE quiz_id = $1"#)
            .bind(fx.quiz_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    let err = submit(&pool, &fx.student, fx.quiz_id, &wrong)
        .await
        .expect_err("terminal");
    assert!(matches!(err, Error::AttemptLimitExceeded(_)));
    let after: i64 =
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM quiz_submissions WHERE quiz_id = $1"#)
            .bind(fx.quiz_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(before, after);
}
