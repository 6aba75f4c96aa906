//! Item model, the isolated entity.

use chrono::{DateTime, Utc};
use rls_core::OwnedEntity;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A record owned by exactly one user. `owner_id` is set at creation and is
/// immutable afterwards; the update DTO carries no owner field and the
/// UPDATE policy's `WITH CHECK` blocks reassignment at the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Item {
    pub item_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
    pub created_utc: DateTime<Utc>,
}

impl OwnedEntity for Item {
    const TABLE_NAME: &'static str = "items";
    const ENTITY_NAME: &'static str = "Item";
}
