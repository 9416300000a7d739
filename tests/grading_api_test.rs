use std::env;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value as JsonValue};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

use classroom_backend::dto::teacher_dto::{
    CreateClassPayload, CreateQuestionPayload, CreateQuizPayload,
};
use classroom_backend::models::user::{AuthContext, UserRole};
use classroom_backend::services::class_service::ClassService;
use classroom_backend::services::quiz_service::QuizService;

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

async fn seed_user(pool: &PgPool, role: &str) -> (AuthContext, String) {
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

    let token = classroom_backend::utils::jwt::issue_token(id, role).expect("token");
    (
        AuthContext {
            user_id: id,
            role: UserRole::parse(role).unwrap(),
        },
        token,
    )
}

fn app(pool: PgPool) -> Router {
    let state = classroom_backend::AppState::new(pool);
    let student_api = Router::new()
        .route(
            "/api/student/quizzes/:quiz_id/status",
            get(classroom_backend::routes::student::get_quiz_status),
        )
        .route(
            "/api/student/quizzes/:quiz_id/submit",
            post(classroom_backend::routes::student::submit_main_quiz),
        )
        .layer(axum::middleware::from_fn(
            classroom_backend::middleware::auth::require_student,
        ));
    let teacher_api = Router::new()
        .route(
            "/api/teacher/submissions/:submission_id/grade",
            post(classroom_backend::routes::teacher::grade_submission),
        )
        .layer(axum::middleware::from_fn(
            classroom_backend::middleware::auth::require_teacher,
        ));
    student_api.merge(teacher_api).with_state(state)
}

#[tokio::test]
async fn teacher_grading_passes_a_pending_submission() {
    let Some(pool) = setup().await else { return };

    let (teacher, teacher_token) = seed_user(&pool, "teacher").await;
    let (student, student_token) = seed_user(&pool, "student").await;

    let class_service = ClassService::new(pool.clone());
    let class = class_service
        .create_class(
            &teacher,
            CreateClassPayload {
                name: "History".into(),
                description: None,
            },
        )
        .await
        .unwrap();
    class_service
        .enroll_student(&teacher, class.id, student.user_id)
        .await
        .unwrap();

    // One exact-match question plus one with no expected answer, so the
    // auto-grader cannot settle the submission on its own.
    let quiz = QuizService::new(pool.clone())
        .create_quiz(
            &teacher,
            CreateQuizPayload {
                class_id: class.id,
                title: "Essay quiz".into(),
                description: None,
                questions: vec![
                    CreateQuestionPayload {
                        text: "2 + 2?".into(),
                        expected_answer: Some("4".into()),
                        image_url: None,
                    },
                    CreateQuestionPayload {
                        text: "Discuss the causes of WW1".into(),
                        expected_answer: None,
                        image_url: None,
                    },
                ],
            },
        )
        .await
        .unwrap();

    let app = app(pool.clone());

    let submit_body = json!({
        "answers": [
            { "question_id": quiz.questions[0].id, "answer_text": "4" },
            { "question_id": quiz.questions[1].id, "answer_text": "Alliances and assassination." },
        ]
    });
    let req = Request::builder()
        .method("POST")
        .uri(format!("/api/student/quizzes/{}/submit", quiz.quiz.id))
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", student_token))
        .body(Body::from(submit_body.to_string()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let body: JsonValue = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["passed"], false);
    let submission_id = body["submission_id"].as_str().unwrap().to_string();

    // Scenario E: auto-correct is 50%, teacher awards an average of 75%.
    let grade_body = json!({
        "grades": [
            { "question_id": quiz.questions[0].id, "score": 100, "feedback": "ok" },
            { "question_id": quiz.questions[1].id, "score": 50, "feedback": "thin" },
        ]
    });
    let req = Request::builder()
        .method("POST")
        .uri(format!("/api/teacher/submissions/{}/grade", submission_id))
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", teacher_token))
        .body(Body::from(grade_body.to_string()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let body: JsonValue = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["passed"], true);
    assert_eq!(body["teacher_percentage"], 75);
    assert_eq!(body["auto_correct_percentage"], 50);
    assert_eq!(body["status"], "PASSED");

    // P3: the auto-grade verdicts survived the teacher's pass untouched.
    let verdicts: Vec<Option<bool>> = sqlx::query_scalar(
        r#"
        SELECT a.is_correct
        FROM submission_answers a
        JOIN questions q ON q.id = a.question_id
        WHERE a.submission_id = $1
        ORDER BY q.ordinal
        "#,
    )
    .bind(Uuid::parse_str(&submission_id).unwrap())
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(verdicts, vec![Some(true), None]);

    // The progress record followed the retroactive pass.
    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/student/quizzes/{}/status", quiz.quiz.id))
        .header("authorization", format!("Bearer {}", student_token))
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let body: JsonValue = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["final_status"], "PASSED");
    assert!(body["next_action"].is_null());
    assert_eq!(body["failed_attempts"], 0);
}
