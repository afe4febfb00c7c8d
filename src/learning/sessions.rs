/// Session transcripts and recaps
use super::{decode_list, encode_list};
use crate::{
    db::{decode_ts, encode_ts},
    error::{AppError, AppResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

/// One utterance in a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `user` or `assistant`
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTranscript {
    pub id: String,
    pub user_id: String,
    pub companion_id: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
}

/// Session history row joined with its companion's name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHistoryItem {
    pub id: String,
    pub companion_id: String,
    pub companion_name: String,
    pub subject: Option<String>,
    pub topic: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
}

/// Recap fields keep their snake_case names on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecap {
    pub id: String,
    pub user_id: String,
    pub companion_name: String,
    pub subject: String,
    pub topic: String,
    pub bullet_points: Vec<String>,
    pub key_topics: Vec<String>,
    pub summary: String,
    pub messages_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRecap {
    pub companion_name: String,
    pub subject: String,
    pub topic: String,
    pub bullet_points: Vec<String>,
    pub key_topics: Vec<String>,
    pub summary: String,
    pub messages_count: i64,
}

const UNKNOWN_COMPANION: &str = "Unknown Companion";

#[derive(Clone)]
pub struct SessionStore {
    db: SqlitePool,
}

impl SessionStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Save a finished session's transcript
    pub async fn save_transcript(
        &self,
        user_id: &str,
        companion_id: &str,
        messages: Vec<ChatMessage>,
    ) -> AppResult<SessionTranscript> {
        if companion_id.trim().is_empty() {
            return Err(AppError::Validation("Companion ID is required".to_string()));
        }

        let transcript = SessionTranscript {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            companion_id: companion_id.to_string(),
            messages,
            created_at: Utc::now(),
        };

        let messages = serde_json::to_string(&transcript.messages)
            .map_err(|e| AppError::Internal(format!("Failed to encode transcript: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO session_transcripts (id, user_id, companion_id, messages, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&transcript.id)
        .bind(&transcript.user_id)
        .bind(&transcript.companion_id)
        .bind(messages)
        .bind(encode_ts(transcript.created_at))
        .execute(&self.db)
        .await?;

        Ok(transcript)
    }

    /// The user's sessions, newest first
    pub async fn history(&self, user_id: &str, limit: i64) -> AppResult<Vec<SessionHistoryItem>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.companion_id, s.messages, s.created_at,
                   c.name AS companion_name, c.subject, c.topic
            FROM session_transcripts s
            LEFT JOIN companions c ON c.id = s.companion_id
            WHERE s.user_id = ?
            ORDER BY s.created_at DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|row| {
                let created_at: String = row.get("created_at");
                let messages: String = row.get("messages");
                let companion_name: Option<String> = row.get("companion_name");

                Ok(SessionHistoryItem {
                    id: row.get("id"),
                    companion_id: row.get("companion_id"),
                    companion_name: companion_name.unwrap_or_else(|| UNKNOWN_COMPANION.to_string()),
                    subject: row.get("subject"),
                    topic: row.get("topic"),
                    messages: decode_messages(&messages),
                    created_at: decode_ts(&created_at)?,
                })
            })
            .collect()
    }

    /// Most recent transcript with one companion
    pub async fn last_session(
        &self,
        user_id: &str,
        companion_id: &str,
    ) -> AppResult<Option<SessionTranscript>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, companion_id, messages, created_at
            FROM session_transcripts
            WHERE user_id = ? AND companion_id = ?
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(companion_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(|r| Self::row_to_transcript(&r)).transpose()
    }

    pub async fn count_sessions(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM session_transcripts")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    /// Distinct users with a session since `since`
    pub async fn active_users_since(&self, since: DateTime<Utc>) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT user_id) FROM session_transcripts WHERE created_at >= ?",
        )
        .bind(encode_ts(since))
        .fetch_one(&self.db)
        .await?;
        Ok(count)
    }

    pub async fn save_recap(&self, user_id: &str, recap: NewRecap) -> AppResult<SessionRecap> {
        let recap = SessionRecap {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            companion_name: recap.companion_name,
            subject: recap.subject,
            topic: recap.topic,
            bullet_points: recap.bullet_points,
            key_topics: recap.key_topics,
            summary: recap.summary,
            messages_count: recap.messages_count,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO session_recaps
                (id, user_id, companion_name, subject, topic, bullet_points, key_topics, summary, messages_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&recap.id)
        .bind(&recap.user_id)
        .bind(&recap.companion_name)
        .bind(&recap.subject)
        .bind(&recap.topic)
        .bind(encode_list(&recap.bullet_points))
        .bind(encode_list(&recap.key_topics))
        .bind(&recap.summary)
        .bind(recap.messages_count)
        .bind(encode_ts(recap.created_at))
        .execute(&self.db)
        .await?;

        Ok(recap)
    }

    /// The user's recaps, newest first
    pub async fn recaps(&self, user_id: &str) -> AppResult<Vec<SessionRecap>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, companion_name, subject, topic, bullet_points, key_topics,
                   summary, messages_count, created_at
            FROM session_recaps
            WHERE user_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|row| {
                let bullet_points: String = row.get("bullet_points");
                let key_topics: String = row.get("key_topics");
                let created_at: String = row.get("created_at");

                Ok(SessionRecap {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    companion_name: row.get("companion_name"),
                    subject: row.get("subject"),
                    topic: row.get("topic"),
                    bullet_points: decode_list(&bullet_points),
                    key_topics: decode_list(&key_topics),
                    summary: row.get("summary"),
                    messages_count: row.get("messages_count"),
                    created_at: decode_ts(&created_at)?,
                })
            })
            .collect()
    }

    fn row_to_transcript(row: &SqliteRow) -> AppResult<SessionTranscript> {
        let messages: String = row.get("messages");
        let created_at: String = row.get("created_at");

        Ok(SessionTranscript {
            id: row.get("id"),
            user_id: row.get("user_id"),
            companion_id: row.get("companion_id"),
            messages: decode_messages(&messages),
            created_at: decode_ts(&created_at)?,
        })
    }
}

fn decode_messages(value: &str) -> Vec<ChatMessage> {
    serde_json::from_str(value).unwrap_or_default()
}
