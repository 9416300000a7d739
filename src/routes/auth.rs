use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use validator::Validate;

use crate::dto::auth_dto::{LoginRequest, LoginResponse, RegisterRequest};
use crate::error::Error;
use crate::models::user::User;
use crate::utils::crypto::{hash_password, verify_password};
use crate::utils::jwt::issue_token;
use crate::AppState;

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> crate::error::Result<Response> {
    payload.validate()?;

    let password_hash = hash_password(&payload.password)?;
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (name, email, password_hash, role)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(payload.name.trim())
    .bind(payload.email.trim().to_lowercase())
    .bind(password_hash)
    .bind(payload.role.as_str())
    .fetch_one(&state.pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db) = e {
            if db.code().as_deref() == Some("23505") {
                return Error::BadRequest("An account with this email already exists".to_string());
            }
        }
        e.into()
    })?;

    Ok((StatusCode::CREATED, Json(user)).into_response())
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> crate::error::Result<Response> {
    payload.validate()?;

    let user = sqlx::query_as::<_, User>(
        r#"SELECT * FROM users WHERE email = $1 AND is_active"#,
    )
    .bind(payload.email.trim().to_lowercase())
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| Error::Unauthorized("Invalid email or password".to_string()))?;

    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(Error::Unauthorized("Invalid email or password".to_string()));
    }

    let role = crate::models::user::UserRole::parse(&user.role)
        .ok_or_else(|| Error::Internal("Account has an unknown role".to_string()))?;
    let token = issue_token(user.id, &user.role)?;

    Ok(Json(LoginResponse {
        token,
        token_type: "Bearer".to_string(),
        user_id: user.id,
        role,
    })
    .into_response())
}
