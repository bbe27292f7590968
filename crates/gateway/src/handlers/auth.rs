//! Account handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use deepsearch_common::{
    auth::{hash_password, verify_password},
    db::NewUser,
    errors::{AppError, Result},
};

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    #[validate(email(message = "Please provide a valid email address."))]
    pub email: String,

    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub password: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserView,
}

#[derive(Serialize)]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

/// Emails are matched case-insensitively
fn canonical_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn json_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(v)| v).map_err(|e| AppError::InvalidFormat {
        message: e.body_text(),
    })
}

/// Register a new account
pub async fn signup(
    State(state): State<AppState>,
    body: std::result::Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    let mut request = json_body(body)?;
    request.name = request.name.trim().to_string();
    request.email = canonical_email(&request.email);

    if request.name.is_empty() || request.email.is_empty() || request.password.is_empty() {
        return Err(AppError::Validation {
            message: "Name, email, and password are required.".to_string(),
            field: None,
        });
    }

    request.validate().map_err(|e| AppError::Validation {
        message: "Please provide a valid email address.".to_string(),
        field: e.field_errors().keys().next().map(|k| k.to_string()),
    })?;

    let password_hash = hash_password(&request.password)?;

    let user = state
        .users
        .create_user(NewUser {
            name: request.name,
            email: request.email,
            password_hash,
        })
        .await?;

    tracing::info!(user_id = %user.id, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "User registered successfully.".to_string(),
        }),
    ))
}

/// Exchange credentials for a session token
pub async fn login(
    State(state): State<AppState>,
    body: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>> {
    let request = json_body(body)?;
    let email = canonical_email(&request.email);

    if email.is_empty() || request.password.is_empty() {
        return Err(AppError::Validation {
            message: "Email and password are required.".to_string(),
            field: None,
        });
    }

    let user = state
        .users
        .find_user_by_email(&email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !verify_password(&request.password, &user.password_hash) {
        tracing::debug!(user_id = %user.id, "Password mismatch");
        return Err(AppError::InvalidCredentials);
    }

    let token = state.jwt.generate_token(user.id)?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(LoginResponse {
        token,
        user: UserView {
            id: user.id,
            email: user.email,
            name: user.name,
        },
    }))
}
