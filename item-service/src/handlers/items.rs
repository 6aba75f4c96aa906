//! Item endpoints on the standard, policy-filtered path.
//!
//! Every handler acquires a session bound to the caller with role `user`;
//! which rows a query can see or touch is decided by the installed policies,
//! not by owner filters in the SQL.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rls_core::{IdentityContext, RlsRole};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{ItemCreateRequest, ItemUpdateRequest, ItemsResponse};
use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::models::Item;
use crate::services::items;
use crate::startup::AppState;

const MAX_PAGE_SIZE: i64 = 1000;

/// Paging query parameters. Accessors clamp out-of-range values so a
/// negative or oversized number can never reach `LIMIT`/`OFFSET` and turn
/// into a database error.
#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    100
}

impl Pagination {
    pub fn limit(&self) -> i64 {
        self.limit.clamp(0, MAX_PAGE_SIZE)
    }

    pub fn skip(&self) -> i64 {
        self.skip.max(0)
    }
}

fn user_identity(user_id: Uuid) -> IdentityContext {
    IdentityContext::new(user_id, RlsRole::User)
}

pub async fn list_items(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<ItemsResponse>, AppError> {
    let (data, count) = state
        .db
        .with_session(user_identity(user.user_id), |conn| {
            Box::pin(async move {
                let data = items::list_items(conn, pagination.limit(), pagination.skip()).await?;
                let count = items::count_items(conn).await?;
                Ok((data, count))
            })
        })
        .await?;

    Ok(Json(ItemsResponse { data, count }))
}

pub async fn read_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(item_id): Path<Uuid>,
) -> Result<Json<Item>, AppError> {
    let item = state
        .db
        .with_session(user_identity(user.user_id), |conn| {
            Box::pin(async move { Ok(items::get_item(conn, item_id).await?) })
        })
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Item not found")))?;

    Ok(Json(item))
}

/// Create an item owned by the caller. A foreign owner id in the payload is
/// not even representable; the DTO carries no owner field.
pub async fn create_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<ItemCreateRequest>,
) -> Result<(StatusCode, Json<Item>), AppError> {
    payload.validate()?;

    let owner_id = user.user_id;
    let item = state
        .db
        .with_session(user_identity(owner_id), |conn| {
            Box::pin(async move { Ok(items::insert_item(conn, owner_id, &payload).await?) })
        })
        .await?;

    tracing::info!(item_id = %item.item_id, owner_id = %owner_id, "Created item");
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<ItemUpdateRequest>,
) -> Result<Json<Item>, AppError> {
    payload.validate()?;

    let item = state
        .db
        .with_session(user_identity(user.user_id), |conn| {
            Box::pin(async move { Ok(items::update_item(conn, item_id, &payload).await?) })
        })
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Item not found")))?;

    Ok(Json(item))
}

pub async fn delete_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(item_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = state
        .db
        .with_session(user_identity(user.user_id), |conn| {
            Box::pin(async move { Ok(items::delete_item(conn, item_id).await?) })
        })
        .await?;

    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!("Item not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}
