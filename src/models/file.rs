use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FileMeta {
    pub id: String,
    pub user_id: String,
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

impl FileMeta {
    pub fn from_row(row: &sqlx::sqlite::SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            user_id: row.get("user_id"),
            original_name: row.get("original_name"),
            stored_name: row.get("stored_name"),
            mime_type: row.get("mime_type"),
            size_bytes: row.get("size_bytes"),
            created_at: row.get("created_at"),
        }
    }
}
