/// Ban mirror log (`user_status`)
///
/// A best-effort record of ban signals. Never read for enforcement.
use super::{BanSignal, SignalStatus};
use crate::{
    db::{decode_ts, encode_ts},
    error::AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

#[async_trait]
pub trait StatusMirror: Send + Sync {
    /// Append a signal to the log
    async fn record(&self, signal: &BanSignal) -> AppResult<()>;

    /// Most recent signals, optionally for one user
    async fn recent(&self, user_id: Option<&str>, limit: i64) -> AppResult<Vec<BanSignal>>;

    /// Drop rows older than the cutoff
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;
}

pub struct SqliteStatusMirror {
    db: SqlitePool,
}

impl SqliteStatusMirror {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StatusMirror for SqliteStatusMirror {
    async fn record(&self, signal: &BanSignal) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_status (user_id, status, reason, source, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&signal.user_id)
        .bind(signal.status.as_str())
        .bind(&signal.reason)
        .bind(&signal.source)
        .bind(encode_ts(signal.created_at))
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn recent(&self, user_id: Option<&str>, limit: i64) -> AppResult<Vec<BanSignal>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, status, reason, source, created_at
            FROM user_status
            WHERE (?1 IS NULL OR user_id = ?1)
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )
        .bind(user_id)
        .bind(limit.clamp(1, 500))
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|row| {
                let status: String = row.get("status");
                let created_at: String = row.get("created_at");
                Ok(BanSignal {
                    user_id: row.get("user_id"),
                    status: SignalStatus::from_str(&status)?,
                    reason: row.get("reason"),
                    source: row.get("source"),
                    created_at: decode_ts(&created_at)?,
                })
            })
            .collect()
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM user_status WHERE created_at < ?")
            .bind(encode_ts(cutoff))
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
