//! Privileged item endpoints.
//!
//! The routes are superuser-gated. Each acquires an ordinary user-bound
//! session for the caller and elevates inside it with an [`AdminContext`],
//! so every request stays isolated by default and the capture/restore
//! semantics run on every privileged operation.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rls_core::{with_admin_context, AdminContext, IdentityContext, RlsRole};
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{ItemUpdateRequest, ItemsResponse};
use crate::error::AppError;
use crate::handlers::items::Pagination;
use crate::middleware::CurrentUser;
use crate::models::Item;
use crate::services::items;
use crate::startup::AppState;

/// List every item regardless of owner. Read-only elevation: the
/// `read_only_admin` role bypasses SELECT only.
pub async fn list_all_items(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<ItemsResponse>, AppError> {
    let admin = AdminContext::read_only(user.user_id);
    let identity = IdentityContext::new(user.user_id, RlsRole::User);

    let (data, count) = state
        .db
        .with_session(identity, move |conn| {
            Box::pin(async move {
                with_admin_context(&admin, conn, |conn| {
                    Box::pin(async move {
                        let data =
                            items::list_items(conn, pagination.limit(), pagination.skip()).await?;
                        let count = items::count_items(conn).await?;
                        Ok((data, count))
                    })
                })
                .await
            })
        })
        .await?;

    Ok(Json(ItemsResponse { data, count }))
}

/// Update any item regardless of owner. Full elevation.
pub async fn update_any_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<ItemUpdateRequest>,
) -> Result<Json<Item>, AppError> {
    payload.validate()?;

    let admin = AdminContext::full_admin(user.user_id);
    let identity = IdentityContext::new(user.user_id, RlsRole::User);

    let item = state
        .db
        .with_session(identity, move |conn| {
            Box::pin(async move {
                with_admin_context(&admin, conn, |conn| {
                    Box::pin(async move { Ok(items::update_item(conn, item_id, &payload).await?) })
                })
                .await
            })
        })
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Item not found")))?;

    tracing::info!(item_id = %item.item_id, admin_id = %user.user_id, "Admin updated item");
    Ok(Json(item))
}

/// Delete any item regardless of owner. Full elevation.
pub async fn delete_any_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(item_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let admin = AdminContext::full_admin(user.user_id);
    let identity = IdentityContext::new(user.user_id, RlsRole::User);

    let deleted = state
        .db
        .with_session(identity, move |conn| {
            Box::pin(async move {
                with_admin_context(&admin, conn, |conn| {
                    Box::pin(async move { Ok(items::delete_item(conn, item_id).await?) })
                })
                .await
            })
        })
        .await?;

    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!("Item not found")));
    }
    tracing::info!(item_id = %item_id, admin_id = %user.user_id, "Admin deleted item");
    Ok(StatusCode::NO_CONTENT)
}
