//! Item persistence.
//!
//! Every function takes the connection as a parameter so the call site makes
//! visible which session, and therefore which bound identity, a query runs
//! under. None of these queries filters by owner itself; the installed
//! policies do that inside PostgreSQL.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::dtos::{ItemCreateRequest, ItemUpdateRequest};
use crate::models::Item;

const ITEM_COLUMNS: &str = "item_id, title, description, owner_id, created_utc";

pub async fn list_items(
    conn: &mut PgConnection,
    limit: i64,
    offset: i64,
) -> Result<Vec<Item>, sqlx::Error> {
    sqlx::query_as::<_, Item>(
        "SELECT item_id, title, description, owner_id, created_utc \
         FROM items ORDER BY created_utc DESC LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(conn)
    .await
}

pub async fn count_items(conn: &mut PgConnection) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM items")
        .fetch_one(conn)
        .await
}

pub async fn get_item(conn: &mut PgConnection, item_id: Uuid) -> Result<Option<Item>, sqlx::Error> {
    sqlx::query_as::<_, Item>(&format!(
        "SELECT {ITEM_COLUMNS} FROM items WHERE item_id = $1"
    ))
    .bind(item_id)
    .fetch_optional(conn)
    .await
}

/// Insert an item owned by `owner_id`. The owner always comes from the
/// authenticated caller, never from the payload.
pub async fn insert_item(
    conn: &mut PgConnection,
    owner_id: Uuid,
    payload: &ItemCreateRequest,
) -> Result<Item, sqlx::Error> {
    sqlx::query_as::<_, Item>(&format!(
        "INSERT INTO items (item_id, title, description, owner_id) \
         VALUES ($1, $2, $3, $4) RETURNING {ITEM_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(owner_id)
    .fetch_one(conn)
    .await
}

/// Update title/description. Returns `None` when the row does not exist or
/// is invisible to the bound identity.
pub async fn update_item(
    conn: &mut PgConnection,
    item_id: Uuid,
    payload: &ItemUpdateRequest,
) -> Result<Option<Item>, sqlx::Error> {
    sqlx::query_as::<_, Item>(&format!(
        "UPDATE items SET title = COALESCE($2, title), description = COALESCE($3, description) \
         WHERE item_id = $1 RETURNING {ITEM_COLUMNS}"
    ))
    .bind(item_id)
    .bind(&payload.title)
    .bind(&payload.description)
    .fetch_optional(conn)
    .await
}

/// Delete an item. Returns whether a row was actually removed.
pub async fn delete_item(conn: &mut PgConnection, item_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM items WHERE item_id = $1")
        .bind(item_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}
