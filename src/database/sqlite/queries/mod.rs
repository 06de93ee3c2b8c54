use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use tracing::debug;

use super::models::{NewSession, Session};

pub struct SessionQueries;

impl SessionQueries {
    /// Insert a registry row unless one already exists for the collection
    /// name, then return the surviving row. The `ON CONFLICT DO NOTHING`
    /// makes create racing create idempotent.
    #[inline]
    pub async fn create_if_absent(pool: &SqlitePool, new_session: NewSession) -> Result<Session> {
        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, collection_name, created_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(collection_name) DO NOTHING
            "#,
        )
        .bind(&new_session.session_id)
        .bind(&new_session.collection_name)
        .bind(new_session.created_at)
        .bind(new_session.expires_at)
        .execute(pool)
        .await
        .context("Failed to register session collection")?;

        Self::get_by_collection_name(pool, &new_session.collection_name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Session row missing after registration"))
    }

    #[inline]
    pub async fn get_by_collection_name(
        pool: &SqlitePool,
        collection_name: &str,
    ) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, session_id, collection_name, created_at, expires_at
            FROM sessions
            WHERE collection_name = ?
            "#,
        )
        .bind(collection_name)
        .fetch_optional(pool)
        .await
        .context("Failed to get session by collection name")?;

        Ok(session)
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, session_id, collection_name, created_at, expires_at
            FROM sessions
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(pool)
        .await
        .context("Failed to list sessions")?;

        Ok(sessions)
    }

    /// Delete a registry row; returns whether a row existed.
    #[inline]
    pub async fn delete_by_collection_name(
        pool: &SqlitePool,
        collection_name: &str,
    ) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE collection_name = ?")
            .bind(collection_name)
            .execute(pool)
            .await
            .context("Failed to delete session")?;

        debug!(
            "Deleted {} registry rows for collection {}",
            result.rows_affected(),
            collection_name
        );
        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn expired_before(pool: &SqlitePool, now: NaiveDateTime) -> Result<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, session_id, collection_name, created_at, expires_at
            FROM sessions
            WHERE expires_at < ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(pool)
        .await
        .context("Failed to query expired sessions")?;

        Ok(sessions)
    }
}
