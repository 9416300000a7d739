use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use serde_json::json;
use uuid::Uuid;

use crate::dto::teacher_dto::{
    ApproveLevel2Request, AssignLevelRequest, CreateClassPayload, CreateLevel1Payload,
    CreateLevel2Payload, CreateLevel3Payload, CreateQuizPayload, EnrollStudentPayload,
    GradeSubmissionRequest, OverrideStatusRequest, PageQuery, UpdateQuizPayload,
};
use crate::models::user::AuthContext;
use crate::services::assistance_service::AssistanceService;
use crate::AppState;

#[axum::debug_handler]
pub async fn create_class(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<CreateClassPayload>,
) -> crate::error::Result<Response> {
    let class = state.class_service.create_class(&auth, payload).await?;
    Ok((StatusCode::CREATED, Json(class)).into_response())
}

#[axum::debug_handler]
pub async fn list_classes(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> crate::error::Result<Response> {
    let classes = state.class_service.list_classes(&auth).await?;
    Ok(Json(classes).into_response())
}

#[axum::debug_handler]
pub async fn enroll_student(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(class_id): Path<Uuid>,
    Json(payload): Json<EnrollStudentPayload>,
) -> crate::error::Result<Response> {
    state
        .class_service
        .enroll_student(&auth, class_id, payload.student_id)
        .await?;
    Ok(Json(json!({ "enrolled": true })).into_response())
}

#[axum::debug_handler]
pub async fn create_quiz(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<CreateQuizPayload>,
) -> crate::error::Result<Response> {
    let quiz = state.quiz_service.create_quiz(&auth, payload).await?;
    Ok((StatusCode::CREATED, Json(quiz)).into_response())
}

#[axum::debug_handler]
pub async fn get_quiz(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(quiz_id): Path<Uuid>,
) -> crate::error::Result<Response> {
    let quiz = state.quiz_service.get_quiz(&auth, quiz_id).await?;
    Ok(Json(quiz).into_response())
}

#[axum::debug_handler]
pub async fn update_quiz(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(quiz_id): Path<Uuid>,
    Json(payload): Json<UpdateQuizPayload>,
) -> crate::error::Result<Response> {
    let quiz = state.quiz_service.update_quiz(&auth, quiz_id, payload).await?;
    Ok(Json(quiz).into_response())
}

#[axum::debug_handler]
pub async fn delete_quiz(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(quiz_id): Path<Uuid>,
) -> crate::error::Result<Response> {
    let deleted = state.quiz_service.delete_quiz(&auth, quiz_id).await?;
    Ok(Json(json!({ "deleted": deleted })).into_response())
}

#[axum::debug_handler]
pub async fn list_quizzes(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(class_id): Path<Uuid>,
) -> crate::error::Result<Response> {
    let quizzes = state.quiz_service.list_quizzes(&auth, class_id).await?;
    Ok(Json(quizzes).into_response())
}

#[axum::debug_handler]
pub async fn create_level1(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(quiz_id): Path<Uuid>,
    Json(payload): Json<CreateLevel1Payload>,
) -> crate::error::Result<Response> {
    let assistance = state
        .quiz_service
        .create_level1(&auth, quiz_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(assistance)).into_response())
}

#[axum::debug_handler]
pub async fn create_level2(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(quiz_id): Path<Uuid>,
    Json(payload): Json<CreateLevel2Payload>,
) -> crate::error::Result<Response> {
    let assistance = state
        .quiz_service
        .create_level2(&auth, quiz_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(assistance)).into_response())
}

#[axum::debug_handler]
pub async fn create_level3(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(quiz_id): Path<Uuid>,
    Json(payload): Json<CreateLevel3Payload>,
) -> crate::error::Result<Response> {
    let assistance = state
        .quiz_service
        .create_level3(&auth, quiz_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(assistance)).into_response())
}

#[utoipa::path(
    get,
    path = "/api/teacher/submissions",
    responses((status = 200, description = "PENDING submissions for this teacher's quizzes")),
    tag = "grading"
)]
#[axum::debug_handler]
pub async fn list_pending_submissions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<PageQuery>,
) -> crate::error::Result<Response> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    let result = state
        .review_service
        .list_pending_submissions(&auth, page, per_page)
        .await?;
    Ok(Json(result).into_response())
}

#[axum::debug_handler]
pub async fn get_submission(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(submission_id): Path<Uuid>,
) -> crate::error::Result<Response> {
    let (submission, answers) = state
        .review_service
        .get_submission(&auth, submission_id)
        .await?;
    Ok(Json(json!({ "submission": submission, "answers": answers })).into_response())
}

#[utoipa::path(
    post,
    path = "/api/teacher/submissions/{id}/grade",
    responses((status = 200, description = "Teacher scores reconciled with the auto-grade")),
    tag = "grading"
)]
#[axum::debug_handler]
pub async fn grade_submission(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(submission_id): Path<Uuid>,
    Json(req): Json<GradeSubmissionRequest>,
) -> crate::error::Result<Response> {
    let response = state
        .review_service
        .grade_submission(&auth, submission_id, req)
        .await?;
    Ok(Json(response).into_response())
}

#[axum::debug_handler]
pub async fn review_essay(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(submission_id): Path<Uuid>,
    Json(req): Json<ApproveLevel2Request>,
) -> crate::error::Result<Response> {
    let svc = AssistanceService::new(state.pool.clone());
    let submission = svc.approve_level2(&auth, submission_id, req).await?;
    Ok(Json(submission).into_response())
}

#[axum::debug_handler]
pub async fn override_student_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((student_id, quiz_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<OverrideStatusRequest>,
) -> crate::error::Result<Response> {
    let progress = state
        .review_service
        .override_student_status(&auth, student_id, quiz_id, req)
        .await?;
    Ok(Json(progress).into_response())
}

#[axum::debug_handler]
pub async fn assign_assistance_level(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((student_id, quiz_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<AssignLevelRequest>,
) -> crate::error::Result<Response> {
    let progress = state
        .review_service
        .assign_assistance_level(&auth, student_id, quiz_id, req)
        .await?;
    Ok(Json(progress).into_response())
}

/// Upload a question image or reference PDF. The core never inspects the
/// file; it only hands back the opaque URL.
#[axum::debug_handler]
pub async fn upload_material(
    State(_state): State<AppState>,
    Extension(_auth): Extension<AuthContext>,
    mut multipart: axum::extract::Multipart,
) -> crate::error::Result<Response> {
    let allowed_extensions = ["pdf", "png", "jpg", "jpeg", "gif"];
    let mut stored: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(crate::error::Error::Multipart)?
    {
        if field.name().unwrap_or("") != "file" {
            continue;
        }
        let filename = field.file_name().unwrap_or("material").to_string();
        let data = field.bytes().await.map_err(crate::error::Error::Multipart)?;
        if data.is_empty() {
            continue;
        }

        let extension = std::path::Path::new(&filename)
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase())
            .unwrap_or_default();
        if !allowed_extensions.contains(&extension.as_str()) {
            return Ok((
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "invalid_file_type",
                    "message": format!("File type not allowed. Allowed: {}", allowed_extensions.join(", "))
                })),
            )
                .into_response());
        }

        let upload_dir = crate::config::get_config().uploads_dir.clone();
        tokio::fs::create_dir_all(&upload_dir)
            .await
            .map_err(crate::error::Error::Io)?;
        let file_id = Uuid::new_v4();
        let saved_filename = format!("{}.{}", file_id, extension);
        let path = format!("{}/{}", upload_dir, saved_filename);
        tokio::fs::write(&path, data)
            .await
            .map_err(crate::error::Error::Io)?;
        stored = Some(format!("/uploads/{}", saved_filename));
    }

    match stored {
        Some(url) => Ok(Json(json!({ "url": url })).into_response()),
        None => Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "empty_upload",
                "message": "Provide a non-empty 'file' field"
            })),
        )
            .into_response()),
    }
}
