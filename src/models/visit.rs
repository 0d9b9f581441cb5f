use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A persisted visit. Rows are never updated once written.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Visit {
    pub id: i32,
    pub name: String,
    pub comment: Option<String>,
    pub image_url: String,
    pub public_id: String,
    pub created_at: NaiveDateTime,
}

/// Everything needed to insert a visit. `image_url` and `public_id` always
/// come from the media host, never from the caller.
#[derive(Debug, Clone)]
pub struct NewVisit {
    pub name: String,
    pub comment: Option<String>,
    pub image_url: String,
    pub public_id: String,
}

impl NewVisit {
    pub fn new(name: String, comment: Option<String>, image_url: String, public_id: String) -> Self {
        let comment = comment.filter(|c| !c.trim().is_empty());
        Self {
            name,
            comment,
            image_url,
            public_id,
        }
    }
}
