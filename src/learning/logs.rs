/// Learning logs (journal entries)
use super::{decode_list, encode_list, normalize_tags};
use crate::{
    db::{decode_ts, encode_ts},
    error::{AppError, AppResult},
    pagination::Page,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use validator::Validate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Excited,
    Confident,
    Confused,
    Frustrated,
    #[default]
    Satisfied,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Excited => "excited",
            Mood::Confident => "confident",
            Mood::Confused => "confused",
            Mood::Frustrated => "frustrated",
            Mood::Satisfied => "satisfied",
        }
    }

    pub fn from_str(s: &str) -> AppResult<Self> {
        match s {
            "excited" => Ok(Mood::Excited),
            "confident" => Ok(Mood::Confident),
            "confused" => Ok(Mood::Confused),
            "frustrated" => Ok(Mood::Frustrated),
            "satisfied" => Ok(Mood::Satisfied),
            _ => Err(AppError::Validation(format!("Invalid mood: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningLog {
    pub id: String,
    pub user_id: String,
    pub companion_id: Option<String>,
    pub session_id: Option<String>,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub mood: Mood,
    pub rating: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_rating() -> i64 {
    3
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewLearningLog {
    pub companion_id: Option<String>,
    pub session_id: Option<String>,
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 2000, message = "Content must be 1-2000 characters"))]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub mood: Mood,
    #[serde(default = "default_rating")]
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningLogFilter {
    pub companion_id: Option<String>,
    pub tag: Option<String>,
}

const MAX_TAG_LEN: usize = 50;

#[derive(Clone)]
pub struct LearningLogStore {
    db: SqlitePool,
}

impl LearningLogStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn create(&self, user_id: &str, mut new: NewLearningLog) -> AppResult<LearningLog> {
        new.title = new.title.trim().to_string();
        new.content = new.content.trim().to_string();
        new.validate()?;

        let tags = normalize_tags(new.tags);
        if tags.iter().any(|t| t.chars().count() > MAX_TAG_LEN) {
            return Err(AppError::Validation(format!(
                "Tags must be at most {} characters",
                MAX_TAG_LEN
            )));
        }

        let now = Utc::now();
        let log = LearningLog {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            companion_id: new.companion_id.filter(|s| !s.is_empty()),
            session_id: new.session_id.filter(|s| !s.is_empty()),
            title: new.title,
            content: new.content,
            tags,
            mood: new.mood,
            rating: new.rating,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO learning_logs
                (id, user_id, companion_id, session_id, title, content, tags, mood, rating, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.id)
        .bind(&log.user_id)
        .bind(&log.companion_id)
        .bind(&log.session_id)
        .bind(&log.title)
        .bind(&log.content)
        .bind(encode_list(&log.tags))
        .bind(log.mood.as_str())
        .bind(log.rating)
        .bind(encode_ts(now))
        .bind(encode_ts(now))
        .execute(&self.db)
        .await?;

        Ok(log)
    }

    /// The user's logs, newest first, with the total match count
    pub async fn list(
        &self,
        user_id: &str,
        filter: &LearningLogFilter,
        page: Page,
    ) -> AppResult<(Vec<LearningLog>, i64)> {
        let tag = filter.tag.as_deref().map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty());

        const CONDITIONS: &str = "user_id = ?1 \
             AND (?2 IS NULL OR companion_id = ?2) \
             AND (?3 IS NULL OR EXISTS (SELECT 1 FROM json_each(learning_logs.tags) WHERE json_each.value = ?3))";

        let rows = sqlx::query(&format!(
            r#"
            SELECT id, user_id, companion_id, session_id, title, content, tags, mood, rating, created_at, updated_at
            FROM learning_logs
            WHERE {}
            ORDER BY created_at DESC
            LIMIT ?4 OFFSET ?5
            "#,
            CONDITIONS
        ))
        .bind(user_id)
        .bind(&filter.companion_id)
        .bind(&tag)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(&self.db)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM learning_logs WHERE {}",
            CONDITIONS
        ))
        .bind(user_id)
        .bind(&filter.companion_id)
        .bind(&tag)
        .fetch_one(&self.db)
        .await?;

        let logs = rows
            .iter()
            .map(Self::row_to_log)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((logs, total))
    }

    pub async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM learning_logs")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    fn row_to_log(row: &SqliteRow) -> AppResult<LearningLog> {
        let tags: String = row.get("tags");
        let mood: String = row.get("mood");
        let created_at: String = row.get("created_at");
        let updated_at: String = row.get("updated_at");

        Ok(LearningLog {
            id: row.get("id"),
            user_id: row.get("user_id"),
            companion_id: row.get("companion_id"),
            session_id: row.get("session_id"),
            title: row.get("title"),
            content: row.get("content"),
            tags: decode_list(&tags),
            mood: Mood::from_str(&mood)?,
            rating: row.get("rating"),
            created_at: decode_ts(&created_at)?,
            updated_at: decode_ts(&updated_at)?,
        })
    }
}
