
pub mod models;
pub mod queries;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::{debug, info};

use crate::database::sqlite::models::{NewSession, Session};
use crate::database::sqlite::queries::SessionQueries;

pub type DbPool = Pool<Sqlite>;

/// Session-collection registry backed by SQLite.
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running session registry migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                collection_name TEXT NOT NULL UNIQUE,
                created_at DATETIME NOT NULL,
                expires_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to run schema migration")?;

        debug!("Session registry migrations completed successfully");
        Ok(())
    }

    /// Register a session collection if no row exists for its name.
    /// Idempotent under concurrent callers: the unique constraint on
    /// `collection_name` guarantees at most one row, and the row returned
    /// is whichever creator won.
    #[inline]
    pub async fn register_session(&self, new_session: NewSession) -> Result<Session> {
        SessionQueries::create_if_absent(&self.pool, new_session).await
    }

    #[inline]
    pub async fn get_session(&self, collection_name: &str) -> Result<Option<Session>> {
        SessionQueries::get_by_collection_name(&self.pool, collection_name).await
    }

    #[inline]
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        SessionQueries::list_all(&self.pool).await
    }

    #[inline]
    pub async fn delete_session(&self, collection_name: &str) -> Result<bool> {
        SessionQueries::delete_by_collection_name(&self.pool, collection_name).await
    }

    /// Sessions whose `expires_at` is strictly before `now`.
    #[inline]
    pub async fn expired_sessions(&self, now: NaiveDateTime) -> Result<Vec<Session>> {
        SessionQueries::expired_before(&self.pool, now).await
    }
}
