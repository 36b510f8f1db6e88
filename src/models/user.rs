use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn from_row(row: &sqlx::sqlite::SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            email: row.get("email"),
            phone: row.get("phone"),
            username: row.get("username"),
            created_at: row.get("created_at"),
        }
    }
}
