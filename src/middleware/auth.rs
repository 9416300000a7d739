use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::models::user::{AuthContext, UserRole};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: Option<String>,
}

fn unauthorized(code: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": code }))).into_response()
}

fn decode_bearer(req: &Request) -> Result<AuthContext, Response> {
    let Some(auth_header) = req.headers().get(axum::http::header::AUTHORIZATION) else {
        return Err(unauthorized("missing_authorization"));
    };
    let Ok(auth_str) = auth_header.to_str() else {
        return Err(unauthorized("bad_authorization"));
    };
    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return Err(unauthorized("unsupported_scheme"));
    };

    let config = crate::config::get_config();
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|_| unauthorized("invalid_token"))?;

    let Ok(user_id) = data.claims.sub.parse::<Uuid>() else {
        return Err(unauthorized("invalid_token"));
    };
    let Some(role) = data.claims.role.as_deref().and_then(UserRole::parse) else {
        return Err(unauthorized("invalid_token"));
    };

    Ok(AuthContext { user_id, role })
}

pub async fn require_bearer_auth(mut req: Request, next: Next) -> Response {
    match decode_bearer(&req) {
        Ok(auth) => {
            req.extensions_mut().insert(auth);
            next.run(req).await
        }
        Err(resp) => resp,
    }
}

pub async fn require_student(mut req: Request, next: Next) -> Response {
    match decode_bearer(&req) {
        Ok(auth) if auth.is_student() => {
            req.extensions_mut().insert(auth);
            next.run(req).await
        }
        Ok(_) => (StatusCode::FORBIDDEN, Json(json!({ "error": "forbidden" }))).into_response(),
        Err(resp) => resp,
    }
}

pub async fn require_teacher(mut req: Request, next: Next) -> Response {
    match decode_bearer(&req) {
        Ok(auth) if auth.is_teacher() => {
            req.extensions_mut().insert(auth);
            next.run(req).await
        }
        Ok(_) => (StatusCode::FORBIDDEN, Json(json!({ "error": "forbidden" }))).into_response(),
        Err(resp) => resp,
    }
}
