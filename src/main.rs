use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use classroom_backend::{
    config::{get_config, init_config},
    database::pool::create_pool,
    routes, AppState,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    init_config()?;
    let config = get_config();

    let pool = create_pool().await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let app_state = AppState::new(pool);

    let base_routes = Router::new().route("/health", get(routes::health::health));

    let auth_api = Router::new()
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/login", post(routes::auth::login))
        .layer(axum::middleware::from_fn_with_state(
            classroom_backend::middleware::rate_limit::new_rps_state(config.student_rps),
            classroom_backend::middleware::rate_limit::rps_middleware,
        ));

    let student_api = Router::new()
        .route(
            "/api/student/quizzes/:quiz_id",
            get(routes::student::get_quiz),
        )
        .route(
            "/api/student/quizzes/:quiz_id/status",
            get(routes::student::get_quiz_status),
        )
        .route(
            "/api/student/quizzes/:quiz_id/gate",
            get(routes::student::can_take_main_quiz),
        )
        .route(
            "/api/student/quizzes/:quiz_id/submit",
            post(routes::student::submit_main_quiz),
        )
        .route(
            "/api/student/quizzes/:quiz_id/assistance/:level",
            get(routes::student::get_assistance_level),
        )
        .route(
            "/api/student/assistance/level1/:assistance_id/submit",
            post(routes::student::submit_level1),
        )
        .route(
            "/api/student/assistance/level2/:assistance_id/submit",
            post(routes::student::submit_level2),
        )
        .route(
            "/api/student/assistance/level3/:assistance_id/complete",
            post(routes::student::complete_level3),
        )
        .route(
            "/api/student/submissions/:submission_id",
            get(routes::student::get_my_submission),
        )
        .layer(axum::middleware::from_fn(
            classroom_backend::middleware::auth::require_student,
        ))
        .layer(axum::middleware::from_fn_with_state(
            classroom_backend::middleware::rate_limit::new_rps_state(config.student_rps),
            classroom_backend::middleware::rate_limit::rps_middleware,
        ));

    let teacher_api = Router::new()
        .route(
            "/api/teacher/classes",
            get(routes::teacher::list_classes).post(routes::teacher::create_class),
        )
        .route(
            "/api/teacher/classes/:class_id/students",
            post(routes::teacher::enroll_student),
        )
        .route(
            "/api/teacher/classes/:class_id/quizzes",
            get(routes::teacher::list_quizzes),
        )
        .route("/api/teacher/quizzes", post(routes::teacher::create_quiz))
        .route(
            "/api/teacher/quizzes/:quiz_id",
            get(routes::teacher::get_quiz)
                .patch(routes::teacher::update_quiz)
                .delete(routes::teacher::delete_quiz),
        )
        .route(
            "/api/teacher/quizzes/:quiz_id/assistance/level1",
            post(routes::teacher::create_level1),
        )
        .route(
            "/api/teacher/quizzes/:quiz_id/assistance/level2",
            post(routes::teacher::create_level2),
        )
        .route(
            "/api/teacher/quizzes/:quiz_id/assistance/level3",
            post(routes::teacher::create_level3),
        )
        .route(
            "/api/teacher/submissions",
            get(routes::teacher::list_pending_submissions),
        )
        .route(
            "/api/teacher/submissions/:submission_id",
            get(routes::teacher::get_submission),
        )
        .route(
            "/api/teacher/submissions/:submission_id/grade",
            post(routes::teacher::grade_submission),
        )
        .route(
            "/api/teacher/essays/:submission_id/review",
            post(routes::teacher::review_essay),
        )
        .route(
            "/api/teacher/students/:student_id/quizzes/:quiz_id/override",
            post(routes::teacher::override_student_status),
        )
        .route(
            "/api/teacher/students/:student_id/quizzes/:quiz_id/assign-level",
            post(routes::teacher::assign_assistance_level),
        )
        .route("/api/teacher/uploads", post(routes::teacher::upload_material))
        .layer(axum::middleware::from_fn(
            classroom_backend::middleware::auth::require_teacher,
        ))
        .layer(axum::middleware::from_fn_with_state(
            classroom_backend::middleware::rate_limit::new_rps_state(config.teacher_rps),
            classroom_backend::middleware::rate_limit::rps_middleware,
        ));

    info!("Serving uploads from: {}", config.uploads_dir);

    let app = base_routes
        .merge(auth_api)
        .merge(student_api)
        .merge(teacher_api)
        .nest_service(
            "/uploads",
            tower_http::services::ServeDir::new(config.uploads_dir.clone()),
        )
        .with_state(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024));

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
