//! User endpoints.

use axum::{extract::State, Json};
use validator::Validate;

use crate::dtos::UserCreateRequest;
use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::models::UserPublic;
use crate::startup::AppState;
use crate::utils::password::hash_password;

pub async fn read_user_me(CurrentUser(user): CurrentUser) -> Json<UserPublic> {
    Json(UserPublic::from(user))
}

/// Create a user. Superuser-gated at the route level.
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<UserCreateRequest>,
) -> Result<Json<UserPublic>, AppError> {
    payload.validate()?;

    let hashed = hash_password(&payload.password)?;
    let user = state
        .db
        .insert_user(
            &payload.email,
            &hashed,
            payload.full_name.as_deref(),
            payload.is_superuser,
        )
        .await?;

    tracing::info!(user_id = %user.user_id, "Created user");
    Ok(Json(UserPublic::from(user)))
}
