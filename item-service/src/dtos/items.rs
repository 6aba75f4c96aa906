use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::Item;

/// Create payload. Deliberately carries no owner field: the handler stamps
/// the authenticated caller as owner, and the INSERT policy's `WITH CHECK`
/// backs that contract at the database.
#[derive(Debug, Deserialize, Validate)]
pub struct ItemCreateRequest {
    #[validate(length(min = 1, max = 300))]
    pub title: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

/// Update payload. No owner field, so ownership cannot be reassigned.
#[derive(Debug, Deserialize, Validate)]
pub struct ItemUpdateRequest {
    #[validate(length(min = 1, max = 300))]
    pub title: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ItemsResponse {
    pub data: Vec<Item>,
    pub count: i64,
}
