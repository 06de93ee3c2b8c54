use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Registry row for one session collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: i64,
    /// Raw session identifier supplied by the caller
    pub session_id: String,
    /// Sanitized collection name, unique across the registry
    pub collection_name: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSession {
    pub session_id: String,
    pub collection_name: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

impl Session {
    #[inline]
    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        self.expires_at < now
    }
}
