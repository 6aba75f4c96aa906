//! Bearer-token authentication middleware.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::IntoResponse,
};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::User;
use crate::startup::AppState;

/// Middleware to require authentication: bearer token → claims → user load.
/// The resolved user lands in request extensions for handlers to extract.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
        })?;

    let claims = state
        .jwt
        .validate_access_token(token)
        .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token")))?;

    let user_id = Uuid::from_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Malformed token subject")))?;

    let user = state
        .db
        .get_user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

    if !user.is_active {
        return Err(AppError::Forbidden(anyhow::anyhow!("Inactive user")));
    }

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Gate for admin routes; runs after `auth_middleware`.
pub async fn superuser_middleware(req: Request, next: Next) -> Result<impl IntoResponse, AppError> {
    let is_superuser = req
        .extensions()
        .get::<CurrentUser>()
        .map(|u| u.0.is_superuser)
        .unwrap_or(false);

    if !is_superuser {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "The user doesn't have enough privileges"
        )));
    }
    Ok(next.run(req).await)
}

/// Extractor for the authenticated user resolved by `auth_middleware`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!(
                    "Authenticated user missing from request extensions"
                ))
            })
    }
}
