/// Companions and bookmarks
use crate::{
    db::{decode_ts, encode_ts},
    error::{AppError, AppResult},
    pagination::Page,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Companion {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub subject: String,
    pub topic: String,
    pub style: String,
    pub voice: String,
    /// Session length in minutes
    pub duration: i64,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Only set on listings made for a specific user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookmarked: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewCompanion {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 50, message = "Subject must be 1-50 characters"))]
    pub subject: String,
    #[validate(length(min = 1, max = 500, message = "Topic must be 1-500 characters"))]
    pub topic: String,
    #[validate(length(min = 1, max = 50, message = "Style is required"))]
    pub style: String,
    #[validate(length(min = 1, max = 50, message = "Voice is required"))]
    pub voice: String,
    #[validate(range(min = 1, max = 120, message = "Duration must be 1-120 minutes"))]
    pub duration: i64,
    #[validate(url(message = "Image URL must be a valid URL"))]
    pub image_url: Option<String>,
}

/// Listing filter: `subject` matches the subject, `topic` matches the topic
/// or the name. Both are case-insensitive substring matches.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompanionFilter {
    pub subject: Option<String>,
    pub topic: Option<String>,
}

const COMPANION_COLUMNS: &str =
    "c.id, c.user_id, c.name, c.subject, c.topic, c.style, c.voice, c.duration, c.image_url, c.created_at";

#[derive(Clone)]
pub struct CompanionStore {
    db: SqlitePool,
}

impl CompanionStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn create(&self, user_id: &str, new: NewCompanion) -> AppResult<Companion> {
        new.validate()?;

        let companion = Companion {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: new.name.trim().to_string(),
            subject: new.subject.trim().to_lowercase(),
            topic: new.topic.trim().to_string(),
            style: new.style,
            voice: new.voice,
            duration: new.duration,
            image_url: new.image_url,
            created_at: Utc::now(),
            bookmarked: None,
        };

        sqlx::query(
            r#"
            INSERT INTO companions (id, user_id, name, subject, topic, style, voice, duration, image_url, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&companion.id)
        .bind(&companion.user_id)
        .bind(&companion.name)
        .bind(&companion.subject)
        .bind(&companion.topic)
        .bind(&companion.style)
        .bind(&companion.voice)
        .bind(companion.duration)
        .bind(&companion.image_url)
        .bind(encode_ts(companion.created_at))
        .execute(&self.db)
        .await?;

        tracing::debug!(companion_id = %companion.id, user_id, "companion created");
        Ok(companion)
    }

    pub async fn get(&self, id: &str) -> AppResult<Option<Companion>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM companions c WHERE c.id = ?",
            COMPANION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.map(|r| Self::row_to_companion(&r)).transpose()
    }

    /// A companion owned by `user_id`; anyone else's reads as not found
    pub async fn get_owned(&self, user_id: &str, id: &str) -> AppResult<Companion> {
        self.get(id)
            .await?
            .filter(|c| c.user_id == user_id)
            .ok_or_else(|| AppError::NotFound("Companion not found".to_string()))
    }

    /// The user's companions, newest first, flagged with bookmark state
    pub async fn list_for_user(
        &self,
        user_id: &str,
        filter: &CompanionFilter,
        page: Page,
    ) -> AppResult<Vec<Companion>> {
        let subject = filter.subject.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let topic = filter.topic.as_deref().map(str::trim).filter(|s| !s.is_empty());

        let rows = sqlx::query(&format!(
            r#"
            SELECT {},
                   EXISTS(SELECT 1 FROM bookmarks b WHERE b.companion_id = c.id AND b.user_id = ?1) AS bookmarked
            FROM companions c
            WHERE c.user_id = ?1
              AND (?2 IS NULL OR c.subject LIKE '%' || ?2 || '%')
              AND (?3 IS NULL OR c.topic LIKE '%' || ?3 || '%' OR c.name LIKE '%' || ?3 || '%')
            ORDER BY c.created_at DESC
            LIMIT ?4 OFFSET ?5
            "#,
            COMPANION_COLUMNS
        ))
        .bind(user_id)
        .bind(subject)
        .bind(topic)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|row| {
                let mut companion = Self::row_to_companion(row)?;
                let bookmarked: i64 = row.get("bookmarked");
                companion.bookmarked = Some(bookmarked != 0);
                Ok(companion)
            })
            .collect()
    }

    /// Every companion, newest first, with the total count
    pub async fn list_all(&self, page: Page) -> AppResult<(Vec<Companion>, i64)> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM companions c ORDER BY c.created_at DESC LIMIT ? OFFSET ?",
            COMPANION_COLUMNS
        ))
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(&self.db)
        .await?;

        let companions = rows
            .iter()
            .map(Self::row_to_companion)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((companions, self.count().await?))
    }

    pub async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM companions")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    /// Delete regardless of owner (admin moderation). Bookmarks cascade.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM companions WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Companion not found".to_string()));
        }
        Ok(())
    }

    pub async fn delete_owned(&self, user_id: &str, id: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM companions WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Companion not found".to_string()));
        }
        Ok(())
    }

    /// Bookmark an owned companion. Bookmarking twice is a no-op.
    pub async fn add_bookmark(&self, user_id: &str, companion_id: &str, pathname: Option<&str>) -> AppResult<()> {
        self.get_owned(user_id, companion_id).await?;

        sqlx::query(
            r#"
            INSERT INTO bookmarks (companion_id, user_id, pathname, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(companion_id, user_id) DO NOTHING
            "#,
        )
        .bind(companion_id)
        .bind(user_id)
        .bind(pathname.unwrap_or("/"))
        .bind(encode_ts(Utc::now()))
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Returns whether a bookmark was removed
    pub async fn remove_bookmark(&self, user_id: &str, companion_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM bookmarks WHERE companion_id = ? AND user_id = ?")
            .bind(companion_id)
            .bind(user_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Bookmarked companions, most recently bookmarked first
    pub async fn bookmarked(&self, user_id: &str) -> AppResult<Vec<Companion>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM bookmarks b
            JOIN companions c ON c.id = b.companion_id
            WHERE b.user_id = ?
            ORDER BY b.created_at DESC
            "#,
            COMPANION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|row| {
                let mut companion = Self::row_to_companion(row)?;
                companion.bookmarked = Some(true);
                Ok(companion)
            })
            .collect()
    }

    fn row_to_companion(row: &SqliteRow) -> AppResult<Companion> {
        let created_at: String = row.get("created_at");

        Ok(Companion {
            id: row.get("id"),
            user_id: row.get("user_id"),
            name: row.get("name"),
            subject: row.get("subject"),
            topic: row.get("topic"),
            style: row.get("style"),
            voice: row.get("voice"),
            duration: row.get("duration"),
            image_url: row.get("image_url"),
            created_at: decode_ts(&created_at)?,
            bookmarked: None,
        })
    }
}

#[cfg(test)]
pub(crate) fn sample_companion(name: &str, subject: &str, topic: &str) -> NewCompanion {
    NewCompanion {
        name: name.to_string(),
        subject: subject.to_string(),
        topic: topic.to_string(),
        style: "casual".to_string(),
        voice: "female".to_string(),
        duration: 15,
        image_url: None,
    }
}
