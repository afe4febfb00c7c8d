/// Durable admin command queue
///
/// Commands are persisted and addressed to a recipient (a user id, or `*`
/// for every consumer). Polling returns commands the consumer has not yet
/// acknowledged, so delivery is at-least-once. At most `cap` commands are
/// retained per recipient; the oldest are trimmed first.
use crate::{
    db::{decode_ts, encode_ts},
    error::{AppError, AppResult},
    metrics,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

/// Recipient key addressing every consumer
pub const BROADCAST_RECIPIENT: &str = "*";

/// A queued admin command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminCommand {
    pub id: String,
    pub recipient: String,
    pub command: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub admin_id: Option<String>,
}

#[derive(Clone)]
pub struct CommandQueue {
    db: SqlitePool,
    cap: i64,
}

impl CommandQueue {
    pub fn new(db: SqlitePool, cap: i64) -> Self {
        Self { db, cap: cap.max(1) }
    }

    /// Persist a command, trimming the recipient's oldest entries past the cap
    pub async fn enqueue(
        &self,
        recipient: &str,
        command: &str,
        data: serde_json::Value,
        admin_id: Option<&str>,
    ) -> AppResult<AdminCommand> {
        let command = command.trim();
        if command.is_empty() {
            return Err(AppError::Validation("Command is required".to_string()));
        }
        let recipient = match recipient.trim() {
            "" => BROADCAST_RECIPIENT,
            r => r,
        };

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO admin_commands (recipient, command, data, admin_id, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(recipient)
        .bind(command)
        .bind(data.to_string())
        .bind(admin_id)
        .bind(encode_ts(now))
        .execute(&mut *tx)
        .await?;

        let id = result.last_insert_rowid();

        let trimmed = sqlx::query(
            r#"
            DELETE FROM admin_commands
            WHERE recipient = ?1
              AND id NOT IN (
                  SELECT id FROM admin_commands
                  WHERE recipient = ?1
                  ORDER BY id DESC
                  LIMIT ?2
              )
            "#,
        )
        .bind(recipient)
        .bind(self.cap)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if trimmed.rows_affected() > 0 {
            tracing::debug!(recipient, dropped = trimmed.rows_affected(), "command queue trimmed");
        }
        metrics::record_admin_command("enqueued", 1);

        Ok(AdminCommand {
            id: id.to_string(),
            recipient: recipient.to_string(),
            command: command.to_string(),
            data,
            timestamp: now,
            admin_id: admin_id.map(str::to_string),
        })
    }

    /// Commands addressed to `consumer` (directly or by broadcast) that it
    /// has not acknowledged, oldest first
    pub async fn pending(&self, consumer: &str, limit: i64) -> AppResult<Vec<AdminCommand>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.recipient, c.command, c.data, c.admin_id, c.created_at
            FROM admin_commands c
            WHERE (c.recipient = ?1 OR c.recipient = ?2)
              AND NOT EXISTS (
                  SELECT 1 FROM admin_command_acks a
                  WHERE a.command_id = c.id AND a.consumer = ?1
              )
            ORDER BY c.id ASC
            LIMIT ?3
            "#,
        )
        .bind(consumer)
        .bind(BROADCAST_RECIPIENT)
        .bind(limit.clamp(1, self.cap))
        .fetch_all(&self.db)
        .await?;

        let commands = rows
            .iter()
            .map(Self::row_to_command)
            .collect::<AppResult<Vec<_>>>()?;

        metrics::record_admin_command("delivered", commands.len() as u64);
        Ok(commands)
    }

    /// Acknowledge commands visible to `consumer`; unknown ids are ignored.
    /// Returns how many new acknowledgements were recorded.
    pub async fn ack(&self, consumer: &str, ids: &[String]) -> AppResult<u64> {
        let now = encode_ts(Utc::now());
        let mut tx = self.db.begin().await?;
        let mut acked = 0;

        for id in ids {
            let Ok(id) = id.parse::<i64>() else {
                continue;
            };

            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO admin_command_acks (command_id, consumer, acked_at)
                SELECT id, ?1, ?2 FROM admin_commands
                WHERE id = ?3 AND (recipient = ?1 OR recipient = ?4)
                "#,
            )
            .bind(consumer)
            .bind(&now)
            .bind(id)
            .bind(BROADCAST_RECIPIENT)
            .execute(&mut *tx)
            .await?;

            acked += result.rows_affected();
        }

        tx.commit().await?;
        metrics::record_admin_command("acknowledged", acked);
        Ok(acked)
    }

    /// Number of commands retained for a recipient key
    pub async fn len(&self, recipient: &str) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM admin_commands WHERE recipient = ?")
                .bind(recipient)
                .fetch_one(&self.db)
                .await?;
        Ok(count)
    }

    /// Delete directly addressed commands their recipient acknowledged, and
    /// broadcast commands older than `broadcast_cutoff`
    pub async fn prune(&self, broadcast_cutoff: DateTime<Utc>) -> AppResult<u64> {
        let acked = sqlx::query(
            r#"
            DELETE FROM admin_commands
            WHERE recipient != ?1
              AND EXISTS (
                  SELECT 1 FROM admin_command_acks a
                  WHERE a.command_id = admin_commands.id
                    AND a.consumer = admin_commands.recipient
              )
            "#,
        )
        .bind(BROADCAST_RECIPIENT)
        .execute(&self.db)
        .await?;

        let stale = sqlx::query("DELETE FROM admin_commands WHERE recipient = ? AND created_at < ?")
            .bind(BROADCAST_RECIPIENT)
            .bind(encode_ts(broadcast_cutoff))
            .execute(&self.db)
            .await?;

        Ok(acked.rows_affected() + stale.rows_affected())
    }

    fn row_to_command(row: &SqliteRow) -> AppResult<AdminCommand> {
        let id: i64 = row.get("id");
        let data: String = row.get("data");
        let created_at: String = row.get("created_at");

        Ok(AdminCommand {
            id: id.to_string(),
            recipient: row.get("recipient"),
            command: row.get("command"),
            data: serde_json::from_str(&data).unwrap_or(serde_json::Value::Null),
            timestamp: decode_ts(&created_at)?,
            admin_id: row.get("admin_id"),
        })
    }
}
