/// User feedback
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    BugReport,
    FeatureRequest,
    General,
    SessionReview,
}

impl FeedbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackType::BugReport => "bug_report",
            FeedbackType::FeatureRequest => "feature_request",
            FeedbackType::General => "general",
            FeedbackType::SessionReview => "session_review",
        }
    }

    pub fn from_str(s: &str) -> AppResult<Self> {
        match s {
            "bug_report" => Ok(FeedbackType::BugReport),
            "feature_request" => Ok(FeedbackType::FeatureRequest),
            "general" => Ok(FeedbackType::General),
            "session_review" => Ok(FeedbackType::SessionReview),
            _ => Err(AppError::Validation(format!("Invalid feedback type: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    Pending,
    Reviewed,
    Resolved,
    Closed,
}

impl FeedbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackStatus::Pending => "pending",
            FeedbackStatus::Reviewed => "reviewed",
            FeedbackStatus::Resolved => "resolved",
            FeedbackStatus::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> AppResult<Self> {
        match s {
            "pending" => Ok(FeedbackStatus::Pending),
            "reviewed" => Ok(FeedbackStatus::Reviewed),
            "resolved" => Ok(FeedbackStatus::Resolved),
            "closed" => Ok(FeedbackStatus::Closed),
            _ => Err(AppError::Validation(format!("Invalid feedback status: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: String,
    pub user_id: String,
    pub feedback_type: FeedbackType,
    pub title: String,
    pub description: String,
    pub rating: Option<i64>,
    pub tags: Vec<String>,
    pub status: FeedbackStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewFeedback {
    pub feedback_type: FeedbackType,
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 2000, message = "Description must be 1-2000 characters"))]
    pub description: String,
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedbackFilter {
    #[serde(rename = "type")]
    pub feedback_type: Option<FeedbackType>,
    pub status: Option<FeedbackStatus>,
}

const FEEDBACK_COLUMNS: &str =
    "id, user_id, feedback_type, title, description, rating, tags, status, created_at, updated_at";

#[derive(Clone)]
pub struct FeedbackStore {
    db: SqlitePool,
}

impl FeedbackStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn create(&self, user_id: &str, mut new: NewFeedback) -> AppResult<Feedback> {
        new.title = new.title.trim().to_string();
        new.description = new.description.trim().to_string();
        new.validate()?;

        if new.feedback_type == FeedbackType::SessionReview && new.rating.is_none() {
            return Err(AppError::Validation(
                "Rating is required for session reviews".to_string(),
            ));
        }

        let now = Utc::now();
        let feedback = Feedback {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            feedback_type: new.feedback_type,
            title: new.title,
            description: new.description,
            rating: new.rating,
            tags: normalize_tags(new.tags),
            status: FeedbackStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO feedback (id, user_id, feedback_type, title, description, rating, tags, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&feedback.id)
        .bind(&feedback.user_id)
        .bind(feedback.feedback_type.as_str())
        .bind(&feedback.title)
        .bind(&feedback.description)
        .bind(feedback.rating)
        .bind(encode_list(&feedback.tags))
        .bind(feedback.status.as_str())
        .bind(encode_ts(now))
        .bind(encode_ts(now))
        .execute(&self.db)
        .await?;

        Ok(feedback)
    }

    /// Feedback matching the filter, newest first; `user_id` of `None`
    /// lists everyone's. Returns the page and the total match count.
    pub async fn list(
        &self,
        user_id: Option<&str>,
        filter: &FeedbackFilter,
        page: Page,
    ) -> AppResult<(Vec<Feedback>, i64)> {
        let feedback_type = filter.feedback_type.map(|t| t.as_str());
        let status = filter.status.map(|s| s.as_str());

        const CONDITIONS: &str = "(?1 IS NULL OR user_id = ?1) \
             AND (?2 IS NULL OR feedback_type = ?2) \
             AND (?3 IS NULL OR status = ?3)";

        let rows = sqlx::query(&format!(
            "SELECT {} FROM feedback WHERE {} ORDER BY created_at DESC LIMIT ?4 OFFSET ?5",
            FEEDBACK_COLUMNS, CONDITIONS
        ))
        .bind(user_id)
        .bind(feedback_type)
        .bind(status)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(&self.db)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM feedback WHERE {}", CONDITIONS))
            .bind(user_id)
            .bind(feedback_type)
            .bind(status)
            .fetch_one(&self.db)
            .await?;

        let items = rows
            .iter()
            .map(Self::row_to_feedback)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((items, total))
    }

    /// Admin review workflow
    pub async fn update_status(&self, id: &str, status: FeedbackStatus) -> AppResult<Feedback> {
        let result = sqlx::query("UPDATE feedback SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(encode_ts(Utc::now()))
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Feedback not found".to_string()));
        }

        let row = sqlx::query(&format!("SELECT {} FROM feedback WHERE id = ?", FEEDBACK_COLUMNS))
            .bind(id)
            .fetch_one(&self.db)
            .await?;

        Self::row_to_feedback(&row)
    }

    /// Count of all feedback and the average of given ratings
    pub async fn summary(&self) -> AppResult<(i64, Option<f64>)> {
        let row = sqlx::query("SELECT COUNT(*) AS total, AVG(rating) AS average FROM feedback")
            .fetch_one(&self.db)
            .await?;

        Ok((row.get("total"), row.get("average")))
    }

    fn row_to_feedback(row: &SqliteRow) -> AppResult<Feedback> {
        let feedback_type: String = row.get("feedback_type");
        let status: String = row.get("status");
        let tags: String = row.get("tags");
        let created_at: String = row.get("created_at");
        let updated_at: String = row.get("updated_at");

        Ok(Feedback {
            id: row.get("id"),
            user_id: row.get("user_id"),
            feedback_type: FeedbackType::from_str(&feedback_type)?,
            title: row.get("title"),
            description: row.get("description"),
            rating: row.get("rating"),
            tags: decode_list(&tags),
            status: FeedbackStatus::from_str(&status)?,
            created_at: decode_ts(&created_at)?,
            updated_at: decode_ts(&updated_at)?,
        })
    }
}
