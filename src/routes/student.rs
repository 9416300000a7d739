use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use serde_json::json;
use uuid::Uuid;

use crate::dto::student_dto::{
    CompleteLevel3Request, SubmitLevel1Request, SubmitLevel2Request, SubmitQuizRequest,
};
use crate::error::Error;
use crate::models::user::AuthContext;
use crate::services::access_gate::AccessGate;
use crate::services::assistance_service::AssistanceService;
use crate::services::attempt_service::AttemptService;
use crate::services::progress_service::ProgressService;
use crate::AppState;

#[axum::debug_handler]
pub async fn get_quiz(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(quiz_id): Path<Uuid>,
) -> crate::error::Result<Response> {
    // The status call doubles as the enrollment check and lazily creates
    // the progress record on first contact.
    let svc = AttemptService::new(state.pool.clone());
    svc.get_quiz_status(&auth, quiz_id).await?;
    let view = state.quiz_service.get_quiz_for_student(quiz_id).await?;
    Ok(Json(view).into_response())
}

#[axum::debug_handler]
pub async fn get_quiz_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(quiz_id): Path<Uuid>,
) -> crate::error::Result<Response> {
    let svc = AttemptService::new(state.pool.clone());
    let status = svc.get_quiz_status(&auth, quiz_id).await?;
    Ok(Json(status).into_response())
}

/// The main-quiz gate as a standalone check, for clients that want to ask
/// before rendering the quiz form.
#[axum::debug_handler]
pub async fn can_take_main_quiz(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(quiz_id): Path<Uuid>,
) -> crate::error::Result<Response> {
    // Validates the quiz and enrollment, and lazily creates progress.
    AttemptService::new(state.pool.clone())
        .get_quiz_status(&auth, quiz_id)
        .await?;
    let progress = ProgressService::new(state.pool.clone())
        .ensure(auth.user_id, quiz_id)
        .await?;
    let decision = AccessGate::can_take_main_quiz(&progress);
    Ok(Json(decision).into_response())
}

#[axum::debug_handler]
pub async fn submit_main_quiz(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(quiz_id): Path<Uuid>,
    Json(req): Json<SubmitQuizRequest>,
) -> crate::error::Result<Response> {
    let svc = AttemptService::new(state.pool.clone());
    let response = svc.submit_main_quiz(&auth, quiz_id, req).await?;
    Ok(Json(response).into_response())
}

#[axum::debug_handler]
pub async fn get_assistance_level(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((quiz_id, level)): Path<(Uuid, u8)>,
) -> crate::error::Result<Response> {
    if !(1..=3).contains(&level) {
        return Err(Error::BadRequest(
            "Assistance level must be 1, 2 or 3".to_string(),
        ));
    }
    AttemptService::new(state.pool.clone())
        .get_quiz_status(&auth, quiz_id)
        .await?;
    let progress = ProgressService::new(state.pool.clone())
        .ensure(auth.user_id, quiz_id)
        .await?;
    let decision = AccessGate::can_access_assistance_level(&progress, level);
    if !decision.allow {
        return Ok((StatusCode::FORBIDDEN, Json(json!(decision))).into_response());
    }

    let content = match level {
        1 => {
            let (assistance, questions) =
                state.quiz_service.get_level1_for_student(quiz_id).await?;
            json!({ "assistance": assistance, "questions": questions })
        }
        2 => {
            let assistance = state.quiz_service.get_level2(quiz_id).await?;
            json!({ "assistance": assistance })
        }
        _ => {
            let assistance = state.quiz_service.get_level3(quiz_id).await?;
            json!({ "assistance": assistance })
        }
    };
    Ok(Json(json!({ "decision": decision, "content": content })).into_response())
}

#[axum::debug_handler]
pub async fn submit_level1(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(assistance_id): Path<Uuid>,
    Json(req): Json<SubmitLevel1Request>,
) -> crate::error::Result<Response> {
    let svc = AssistanceService::new(state.pool.clone());
    let response = svc.submit_level1(&auth, assistance_id, req).await?;
    Ok(Json(response).into_response())
}

#[axum::debug_handler]
pub async fn submit_level2(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(assistance_id): Path<Uuid>,
    Json(req): Json<SubmitLevel2Request>,
) -> crate::error::Result<Response> {
    let svc = AssistanceService::new(state.pool.clone());
    let response = svc.submit_level2(&auth, assistance_id, req).await?;
    Ok(Json(response).into_response())
}

#[axum::debug_handler]
pub async fn complete_level3(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(assistance_id): Path<Uuid>,
    Json(req): Json<CompleteLevel3Request>,
) -> crate::error::Result<Response> {
    let svc = AssistanceService::new(state.pool.clone());
    let response = svc.complete_level3(&auth, assistance_id, req).await?;
    Ok(Json(response).into_response())
}

#[axum::debug_handler]
pub async fn get_my_submission(
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
