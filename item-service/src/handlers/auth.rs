//! Login endpoints.

use axum::{extract::State, Form, Json};
use validator::Validate;

use crate::dtos::{LoginRequest, TokenResponse};
use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::models::UserPublic;
use crate::startup::AppState;
use crate::utils::password::verify_password;

/// OAuth2-compatible token login: email + password form → bearer token.
pub async fn login_access_token(
    State(state): State<AppState>,
    Form(payload): Form<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    payload.validate()?;

    let user = state
        .db
        .get_user_by_email(&payload.username)
        .await?
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Incorrect email or password")))?;

    verify_password(&payload.password, &user.hashed_password)
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Incorrect email or password")))?;

    if !user.is_active {
        return Err(AppError::BadRequest(anyhow::anyhow!("Inactive user")));
    }

    let token = state.jwt.generate_access_token(user.user_id)?;
    tracing::info!(user_id = %user.user_id, "Issued access token");
    Ok(Json(TokenResponse::bearer(token)))
}

/// Echo the authenticated user; used by clients to validate a stored token.
pub async fn test_token(CurrentUser(user): CurrentUser) -> Json<UserPublic> {
    Json(UserPublic::from(user))
}
