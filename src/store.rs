//! Upload lifecycle storage (SQLite).

use crate::Fullname;
use crate::error::{Result, StoreError};
use crate::upload::UploadDestination;
use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sqlx::{Row as _, SqlitePool};
use uuid::Uuid;

/// Persisted record of one published artifact and the bot's reply to its
/// requestor. Both sides are retracted independently by the cleanup
/// manager; a row is finalized once both deletion flags hold.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadLog {
    pub id: Uuid,
    pub post_fullname: Fullname,
    pub reply_fullname: Fullname,
    pub requestor: String,
    pub uploaded_at: DateTime<Utc>,
    pub destination: UploadDestination,
    pub delete_key: String,
    pub upload_deleted: bool,
    pub reply_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub delete_reason: Option<String>,
}

impl UploadLog {
    pub fn new(
        post_fullname: impl Into<Fullname>,
        reply_fullname: impl Into<Fullname>,
        requestor: impl Into<String>,
        destination: UploadDestination,
        delete_key: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            post_fullname: post_fullname.into(),
            reply_fullname: reply_fullname.into(),
            requestor: requestor.into(),
            uploaded_at: Utc::now(),
            destination,
            delete_key: delete_key.into(),
            upload_deleted: false,
            reply_deleted: false,
            deleted_at: None,
            delete_reason: None,
        }
    }

    /// Both sides confirmed retracted; the cleanup manager never revisits
    /// finalized rows.
    pub fn finalized(&self) -> bool {
        self.upload_deleted && self.reply_deleted
    }
}

/// Repository over `upload_logs` plus the fallback-thread pointer.
pub struct UploadLogStore {
    pool: SqlitePool,
}

impl UploadLogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS upload_logs (
                id TEXT PRIMARY KEY,
                post_fullname TEXT NOT NULL,
                reply_fullname TEXT NOT NULL,
                requestor TEXT NOT NULL,
                uploaded_at TEXT NOT NULL,
                destination TEXT NOT NULL,
                delete_key TEXT NOT NULL,
                upload_deleted INTEGER NOT NULL DEFAULT 0,
                reply_deleted INTEGER NOT NULL DEFAULT 0,
                deleted_at TEXT,
                delete_reason TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Sqlx)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fallback_threads (
                thread_fullname TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Sqlx)?;

        Ok(())
    }

    pub async fn insert(&self, log: &UploadLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO upload_logs
                (id, post_fullname, reply_fullname, requestor, uploaded_at,
                 destination, delete_key, upload_deleted, reply_deleted,
                 deleted_at, delete_reason)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.id.to_string())
        .bind(&log.post_fullname)
        .bind(&log.reply_fullname)
        .bind(&log.requestor)
        .bind(log.uploaded_at.to_rfc3339())
        .bind(log.destination.as_str())
        .bind(&log.delete_key)
        .bind(log.upload_deleted as i64)
        .bind(log.reply_deleted as i64)
        .bind(log.deleted_at.map(|t| t.to_rfc3339()))
        .bind(&log.delete_reason)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Sqlx)?;
        Ok(())
    }

    /// Persist lifecycle mutations. The deletion flags are monotonic and
    /// `deleted_at`/`delete_reason` are write-once; the statement enforces
    /// both so a stale in-memory row can never roll a record back.
    pub async fn update(&self, log: &UploadLog) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE upload_logs SET
                upload_deleted = MAX(upload_deleted, ?),
                reply_deleted = MAX(reply_deleted, ?),
                deleted_at = COALESCE(deleted_at, ?),
                delete_reason = COALESCE(delete_reason, ?)
            WHERE id = ?
            "#,
        )
        .bind(log.upload_deleted as i64)
        .bind(log.reply_deleted as i64)
        .bind(log.deleted_at.map(|t| t.to_rfc3339()))
        .bind(&log.delete_reason)
        .bind(log.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(StoreError::Sqlx)?;
        Ok(())
    }

    pub async fn get_all(&self) -> Result<Vec<UploadLog>> {
        let rows = sqlx::query("SELECT * FROM upload_logs ORDER BY uploaded_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Sqlx)?;
        rows.iter().map(map_row).collect()
    }

    /// The most recently created fallback thread, if any.
    pub async fn most_recent_fallback_thread(&self) -> Result<Option<(Fullname, DateTime<Utc>)>> {
        let row = sqlx::query(
            "SELECT thread_fullname, created_at FROM fallback_threads ORDER BY created_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Sqlx)?;

        match row {
            None => Ok(None),
            Some(row) => {
                let fullname: String = row.try_get("thread_fullname").map_err(StoreError::Sqlx)?;
                let created_at: String = row.try_get("created_at").map_err(StoreError::Sqlx)?;
                let created_at = parse_timestamp(&created_at, &fullname)?;
                Ok(Some((fullname, created_at)))
            }
        }
    }

    pub async fn save_fallback_thread(
        &self,
        fullname: &str,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO fallback_threads (thread_fullname, created_at) VALUES (?, ?)",
        )
        .bind(fullname)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(StoreError::Sqlx)?;
        Ok(())
    }
}

fn map_row(row: &sqlx::sqlite::SqliteRow) -> Result<UploadLog> {
    let id: String = row.try_get("id").map_err(StoreError::Sqlx)?;
    let destination: String = row.try_get("destination").map_err(StoreError::Sqlx)?;
    let uploaded_at: String = row.try_get("uploaded_at").map_err(StoreError::Sqlx)?;
    let deleted_at: Option<String> = row.try_get("deleted_at").map_err(StoreError::Sqlx)?;

    Ok(UploadLog {
        id: Uuid::parse_str(&id).map_err(|e| StoreError::CorruptRow {
            id: id.clone(),
            detail: format!("bad uuid: {e}"),
        })?,
        post_fullname: row.try_get("post_fullname").map_err(StoreError::Sqlx)?,
        reply_fullname: row.try_get("reply_fullname").map_err(StoreError::Sqlx)?,
        requestor: row.try_get("requestor").map_err(StoreError::Sqlx)?,
        uploaded_at: parse_timestamp(&uploaded_at, &id)?,
        destination: UploadDestination::parse(&destination).ok_or_else(|| {
            StoreError::CorruptRow {
                id: id.clone(),
                detail: format!("unknown destination `{destination}`"),
            }
        })?,
        delete_key: row.try_get("delete_key").map_err(StoreError::Sqlx)?,
        upload_deleted: row.try_get::<i64, _>("upload_deleted").map_err(StoreError::Sqlx)? != 0,
        reply_deleted: row.try_get::<i64, _>("reply_deleted").map_err(StoreError::Sqlx)? != 0,
        deleted_at: deleted_at
            .map(|raw| parse_timestamp(&raw, &id))
            .transpose()?,
        delete_reason: row.try_get("delete_reason").map_err(StoreError::Sqlx)?,
    })
}

fn parse_timestamp(raw: &str, id: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("bad timestamp `{raw}` on row {id}"))
        .map_err(|e| {
            StoreError::CorruptRow {
                id: id.to_string(),
                detail: e.to_string(),
            }
            .into()
        })
}
