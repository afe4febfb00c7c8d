/// Analytics events and dashboard counts
use crate::{
    db::{decode_ts, encode_ts},
    error::AppResult,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PageView,
    CompanionCreated,
    SessionStarted,
    SessionEnded,
    BookmarkAdded,
    LearningLogCreated,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PageView => "page_view",
            EventType::CompanionCreated => "companion_created",
            EventType::SessionStarted => "session_started",
            EventType::SessionEnded => "session_ended",
            EventType::BookmarkAdded => "bookmark_added",
            EventType::LearningLogCreated => "learning_log_created",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAnalyticsEvent {
    pub event_type: EventType,
    #[serde(default = "empty_object")]
    pub event_data: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub id: i64,
    pub user_id: String,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Admin dashboard figures
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCounts {
    pub total_users: i64,
    pub total_companions: i64,
    pub total_sessions: i64,
    pub active_users_last_7_days: i64,
    pub total_learning_logs: i64,
    pub total_feedback: i64,
    pub average_feedback_rating: Option<f64>,
    pub events_last_7_days: BTreeMap<String, i64>,
}

#[derive(Clone)]
pub struct AnalyticsStore {
    db: SqlitePool,
}

impl AnalyticsStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn track(
        &self,
        user_id: &str,
        event: NewAnalyticsEvent,
        user_agent: Option<&str>,
        ip_address: Option<&str>,
    ) -> AppResult<AnalyticsEvent> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO analytics_events (user_id, event_type, event_data, user_agent, ip_address, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(event.event_type.as_str())
        .bind(event.event_data.to_string())
        .bind(user_agent)
        .bind(ip_address)
        .bind(encode_ts(now))
        .execute(&self.db)
        .await?;

        Ok(AnalyticsEvent {
            id: result.last_insert_rowid(),
            user_id: user_id.to_string(),
            event_type: event.event_type.as_str().to_string(),
            event_data: event.event_data,
            user_agent: user_agent.map(str::to_string),
            ip_address: ip_address.map(str::to_string),
            created_at: now,
        })
    }

    /// A user's events since `since`, newest first
    pub async fn events_for_user(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<AnalyticsEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, event_type, event_data, user_agent, ip_address, created_at
            FROM analytics_events
            WHERE user_id = ? AND created_at >= ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(encode_ts(since))
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|row| {
                let event_data: String = row.get("event_data");
                let created_at: String = row.get("created_at");
                Ok(AnalyticsEvent {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    event_type: row.get("event_type"),
                    event_data: serde_json::from_str(&event_data).unwrap_or_else(|_| empty_object()),
                    user_agent: row.get("user_agent"),
                    ip_address: row.get("ip_address"),
                    created_at: decode_ts(&created_at)?,
                })
            })
            .collect()
    }

    /// Event counts per type since `since`
    pub async fn counts_by_type(&self, since: DateTime<Utc>) -> AppResult<BTreeMap<String, i64>> {
        let rows = sqlx::query(
            r#"
            SELECT event_type, COUNT(*) AS total
            FROM analytics_events
            WHERE created_at >= ?
            GROUP BY event_type
            "#,
        )
        .bind(encode_ts(since))
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get("event_type"), row.get("total")))
            .collect())
    }
}
