/// Admin analytics reports
///
/// Computed on demand from the learning tables: conversion funnel, churn
/// risk, signup cohort retention, companion engagement and the dashboard
/// aggregates. A user's signup is their first companion; a session is a
/// saved transcript. Every report takes `now` so the windows are testable.
use crate::{
    db::{decode_opt_ts, decode_ts, encode_ts},
    error::{AppError, AppResult},
};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

/// A session with at least this many messages counts as completed
pub const COMPLETED_SESSION_MESSAGES: i64 = 3;

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Message count of a transcript row, 0 when the stored JSON is unreadable
const MESSAGE_COUNT_SQL: &str =
    "CASE WHEN json_valid(messages) THEN json_array_length(messages) ELSE 0 END";

fn percent(part: i64, whole: i64) -> i64 {
    if whole > 0 {
        (part as f64 * 100.0 / whole as f64).round() as i64
    } else {
        0
    }
}

fn one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn month_start(year: i32, month: u32) -> AppResult<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
        .ok_or_else(|| AppError::Internal(format!("Invalid month {}-{}", year, month)))
}

// ============================================================================
// Funnel
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelStage {
    pub stage: &'static str,
    pub users: i64,
    /// Share of the previous stage that reached this one
    pub percentage: i64,
    pub drop_off: i64,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelSummary {
    pub total_users: i64,
    pub overall_conversion: i64,
    pub biggest_drop_off: FunnelStage,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunnelReport {
    pub funnel: Vec<FunnelStage>,
    pub summary: FunnelSummary,
}

/// Build the stages from the distinct-user count at each step
fn funnel_stages(counts: [i64; 5]) -> Vec<FunnelStage> {
    const STAGES: [(&str, &str); 5] = [
        ("Visitors", "Total unique users who interacted with the platform"),
        ("Created Companion", "Users who created at least one AI companion"),
        ("Started Session", "Users who initiated a learning session"),
        ("Completed Session", "Users who completed a full session (3+ messages)"),
        ("Left Feedback", "Users who provided session feedback/recap"),
    ];

    STAGES
        .iter()
        .enumerate()
        .map(|(i, &(stage, description))| {
            let users = counts[i];
            let (percentage, drop_off) = if i == 0 {
                (100, 0)
            } else {
                let previous = counts[i - 1];
                (percent(users, previous), percent(previous - users, previous))
            };
            FunnelStage {
                stage,
                users,
                percentage,
                drop_off,
                description,
            }
        })
        .collect()
}

// ============================================================================
// Churn
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngagementStatus {
    AtRisk,
    Inactive,
    Active,
    Engaged,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChurnRisk {
    pub user_id: String,
    pub signup_date: DateTime<Utc>,
    pub last_activity_date: DateTime<Utc>,
    pub days_since_last_activity: i64,
    pub days_since_signup: i64,
    pub total_sessions: i64,
    pub total_companions: i64,
    pub avg_sessions_per_week: f64,
    pub risk_score: i64,
    pub risk_level: RiskLevel,
    pub status: EngagementStatus,
    pub recommendation: &'static str,
}

/// Activity figures a churn score is computed from
#[derive(Debug, Clone, Copy)]
struct Activity {
    days_since_signup: i64,
    days_since_last_activity: i64,
    sessions: i64,
    companions: i64,
}

impl Activity {
    fn sessions_per_week(&self) -> f64 {
        if self.days_since_signup > 0 {
            self.sessions as f64 / (self.days_since_signup as f64 / 7.0)
        } else {
            self.sessions as f64
        }
    }

    /// 0-100, higher is more likely to churn
    fn risk_score(&self) -> i64 {
        let per_week = self.sessions_per_week();

        let inactivity = match self.days_since_last_activity {
            d if d > 30 => 40,
            d if d > 14 => 30,
            d if d > 7 => 20,
            d if d > 3 => 10,
            _ => 0,
        };

        let engagement = if self.sessions == 0 {
            30
        } else if self.sessions < 3 {
            20
        } else if per_week < 1.0 {
            15
        } else if per_week < 2.0 {
            10
        } else {
            0
        };

        let creation = match self.companions {
            0 => 20,
            1 => 10,
            _ => 0,
        };

        let mut score = inactivity + engagement + creation;
        // New users get some slack
        if self.days_since_signup < 7 {
            score = (score - 20).max(0);
        }
        score.min(100)
    }

    fn risk_level(score: i64) -> RiskLevel {
        match score {
            s if s >= 70 => RiskLevel::Critical,
            s if s >= 50 => RiskLevel::High,
            s if s >= 30 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }

    fn status(&self, score: i64) -> EngagementStatus {
        if self.days_since_last_activity > 30 {
            EngagementStatus::Inactive
        } else if score >= 50 {
            EngagementStatus::AtRisk
        } else if self.sessions_per_week() >= 2.0 {
            EngagementStatus::Engaged
        } else {
            EngagementStatus::Active
        }
    }

    fn recommendation(&self) -> &'static str {
        if self.days_since_last_activity > 14 && self.sessions > 0 {
            "Send re-engagement email with personalized content"
        } else if self.companions == 0 {
            "Encourage to create their first AI companion"
        } else if self.sessions < 3 {
            "Provide onboarding assistance and tips"
        } else if self.sessions_per_week() < 1.0 {
            "Send weekly learning reminders"
        } else {
            "User is engaged, continue current strategy"
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChurnSegments {
    pub critical: Vec<ChurnRisk>,
    pub high: Vec<ChurnRisk>,
    pub medium: Vec<ChurnRisk>,
    pub low: Vec<ChurnRisk>,
    pub at_risk: Vec<ChurnRisk>,
    pub inactive: Vec<ChurnRisk>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChurnSummary {
    pub total_users: i64,
    pub avg_risk_score: i64,
    pub critical_count: i64,
    pub high_count: i64,
    pub medium_count: i64,
    pub low_count: i64,
    pub at_risk_count: i64,
    pub inactive_count: i64,
    pub healthy_rate: i64,
    pub churn_rate: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChurnReport {
    pub users: Vec<ChurnRisk>,
    pub segments: ChurnSegments,
    pub summary: ChurnSummary,
}

impl ChurnReport {
    fn from_users(users: Vec<ChurnRisk>) -> Self {
        let take = |pred: &dyn Fn(&ChurnRisk) -> bool, n: usize| -> Vec<ChurnRisk> {
            users.iter().filter(|&u| pred(u)).take(n).cloned().collect()
        };
        let count =
            |pred: &dyn Fn(&ChurnRisk) -> bool| users.iter().filter(|&u| pred(u)).count() as i64;

        let segments = ChurnSegments {
            critical: take(&|u| u.risk_level == RiskLevel::Critical, 10),
            high: take(&|u| u.risk_level == RiskLevel::High, 10),
            medium: take(&|u| u.risk_level == RiskLevel::Medium, 10),
            low: take(&|u| u.risk_level == RiskLevel::Low, 10),
            at_risk: take(&|u| u.status == EngagementStatus::AtRisk, 15),
            inactive: take(&|u| u.status == EngagementStatus::Inactive, 15),
        };

        let total_users = users.len() as i64;
        let critical_count = count(&|u| u.risk_level == RiskLevel::Critical);
        let high_count = count(&|u| u.risk_level == RiskLevel::High);
        let low_count = count(&|u| u.risk_level == RiskLevel::Low);
        let score_sum: i64 = users.iter().map(|u| u.risk_score).sum();

        let summary = ChurnSummary {
            total_users,
            avg_risk_score: if total_users > 0 {
                (score_sum as f64 / total_users as f64).round() as i64
            } else {
                0
            },
            critical_count,
            high_count,
            medium_count: count(&|u| u.risk_level == RiskLevel::Medium),
            low_count,
            at_risk_count: count(&|u| u.status == EngagementStatus::AtRisk),
            inactive_count: count(&|u| u.status == EngagementStatus::Inactive),
            healthy_rate: percent(low_count, total_users),
            churn_rate: percent(critical_count + high_count, total_users),
        };

        Self {
            users,
            segments,
            summary,
        }
    }
}

// ============================================================================
// Cohorts
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Retention {
    pub day1: i64,
    pub day7: i64,
    pub day30: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Cohort {
    /// `YYYY-MM` of the first companion
    pub month: String,
    pub size: i64,
    pub day1: i64,
    pub day7: i64,
    pub day30: i64,
    /// Percentages of `size`
    pub retention: Retention,
}

// ============================================================================
// Companions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Performance {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanionEngagement {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub topic: String,
    pub total_sessions: i64,
    pub unique_users: i64,
    /// Average messages per session
    pub avg_session_length: i64,
    /// Share of users who came back for a second session
    pub retention_rate: i64,
    pub engagement_score: i64,
    pub performance: Performance,
    pub created_at: DateTime<Utc>,
    pub days_since_creation: i64,
    pub last_used: DateTime<Utc>,
}

fn engagement_score(sessions: i64, users: i64, avg_messages: i64, retention_rate: i64) -> i64 {
    let raw = (sessions * 20 + users * 15 + avg_messages * 3) as f64 + retention_rate as f64 * 0.5;
    (raw.round() as i64).min(100)
}

fn performance(score: i64) -> Performance {
    match score {
        s if s >= 70 => Performance::High,
        s if s >= 40 => Performance::Medium,
        _ => Performance::Low,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanionSummary {
    pub total_companions: i64,
    pub avg_engagement: i64,
    pub total_sessions: i64,
    pub avg_sessions_per_companion: i64,
    pub high_performers: i64,
    pub medium_performers: i64,
    pub low_performers: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanionReport {
    pub top_performers: Vec<CompanionEngagement>,
    /// Low engagement and older than a week
    pub underperformers: Vec<CompanionEngagement>,
    /// At most 30 days old with a score of 50 or more
    pub trending: Vec<CompanionEngagement>,
    pub all_companions: Vec<CompanionEngagement>,
    pub summary: CompanionSummary,
}

impl CompanionReport {
    fn from_companions(mut all: Vec<CompanionEngagement>) -> Self {
        all.sort_by(|a, b| b.engagement_score.cmp(&a.engagement_score));

        let total_companions = all.len() as i64;
        let total_sessions: i64 = all.iter().map(|c| c.total_sessions).sum();
        let score_sum: i64 = all.iter().map(|c| c.engagement_score).sum();
        let performers = |p: Performance| all.iter().filter(|c| c.performance == p).count() as i64;

        let summary = CompanionSummary {
            total_companions,
            avg_engagement: if total_companions > 0 {
                (score_sum as f64 / total_companions as f64).round() as i64
            } else {
                0
            },
            total_sessions,
            avg_sessions_per_companion: if total_companions > 0 {
                (total_sessions as f64 / total_companions as f64).round() as i64
            } else {
                0
            },
            high_performers: performers(Performance::High),
            medium_performers: performers(Performance::Medium),
            low_performers: performers(Performance::Low),
        };

        Self {
            top_performers: all.iter().take(5).cloned().collect(),
            underperformers: all
                .iter()
                .filter(|c| c.performance == Performance::Low && c.days_since_creation > 7)
                .take(5)
                .cloned()
                .collect(),
            trending: all
                .iter()
                .filter(|c| c.days_since_creation <= 30 && c.engagement_score >= 50)
                .take(5)
                .cloned()
                .collect(),
            all_companions: all,
            summary,
        }
    }
}

// ============================================================================
// Dashboard
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_users: i64,
    pub total_sessions: i64,
    pub total_companions: i64,
    pub total_recaps: i64,
    pub total_feedback: i64,
    pub new_users_this_week: i64,
    /// Week over week change in distinct companion creators
    pub user_growth_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyUsers {
    pub name: &'static str,
    pub users: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyStatus {
    pub month: &'static str,
    pub active: i64,
    pub inactive: i64,
    pub new: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyEngagement {
    /// `M/D`
    pub name: String,
    pub date: NaiveDate,
    pub sessions: i64,
    pub companions: i64,
    pub recaps: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetric {
    pub metric: &'static str,
    pub value: f64,
    pub full_mark: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardReport {
    pub summary: DashboardSummary,
    /// Distinct companion creators per month of the current year
    pub user_growth_data: Vec<MonthlyUsers>,
    pub status_distribution_data: Vec<MonthlyStatus>,
    /// Last 30 days, oldest first
    pub engagement_data: Vec<DailyEngagement>,
    pub performance_data: Vec<PerformanceMetric>,
}

fn metric(metric: &'static str, value: f64) -> PerformanceMetric {
    PerformanceMetric {
        metric,
        value: one_decimal(value.clamp(0.0, 100.0)),
        full_mark: 100.0,
    }
}

// ============================================================================
// Store
// ============================================================================

#[derive(Clone)]
pub struct ReportStore {
    db: SqlitePool,
}

impl ReportStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn funnel(&self) -> AppResult<FunnelReport> {
        let row = sqlx::query(&format!(
            r#"
            SELECT
                (SELECT COUNT(*) FROM (
                    SELECT user_id FROM companions UNION SELECT user_id FROM session_transcripts
                )) AS visitors,
                (SELECT COUNT(DISTINCT user_id) FROM companions) AS creators,
                (SELECT COUNT(DISTINCT user_id) FROM session_transcripts) AS starters,
                (SELECT COUNT(DISTINCT user_id) FROM session_transcripts
                    WHERE {} >= ?) AS completers,
                (SELECT COUNT(DISTINCT user_id) FROM session_recaps) AS recappers
            "#,
            MESSAGE_COUNT_SQL
        ))
        .bind(COMPLETED_SESSION_MESSAGES)
        .fetch_one(&self.db)
        .await?;

        let counts: [i64; 5] = [
            row.get("visitors"),
            row.get("creators"),
            row.get("starters"),
            row.get("completers"),
            row.get("recappers"),
        ];
        let funnel = funnel_stages(counts);

        let mut biggest = funnel[0].clone();
        for stage in &funnel[1..] {
            if stage.drop_off > biggest.drop_off {
                biggest = stage.clone();
            }
        }

        Ok(FunnelReport {
            summary: FunnelSummary {
                total_users: counts[0],
                overall_conversion: percent(counts[4], counts[0]),
                biggest_drop_off: biggest,
            },
            funnel,
        })
    }

    /// Churn risk for every user with a companion, riskiest first
    pub async fn churn(&self, now: DateTime<Utc>) -> AppResult<ChurnReport> {
        let rows = sqlx::query(
            r#"
            SELECT c.user_id, c.signup, c.companions,
                   COUNT(t.id) AS sessions, MAX(t.created_at) AS last_session
            FROM (
                SELECT user_id, MIN(created_at) AS signup, COUNT(*) AS companions
                FROM companions
                GROUP BY user_id
            ) c
            LEFT JOIN session_transcripts t ON t.user_id = c.user_id
            GROUP BY c.user_id
            ORDER BY c.user_id
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let mut users = rows
            .iter()
            .map(|row| -> AppResult<ChurnRisk> {
                let signup: String = row.get("signup");
                let signup_date = decode_ts(&signup)?;
                let last_activity_date = decode_opt_ts(row.get("last_session"))?.unwrap_or(signup_date);

                let activity = Activity {
                    days_since_signup: (now - signup_date).num_days(),
                    days_since_last_activity: (now - last_activity_date).num_days(),
                    sessions: row.get("sessions"),
                    companions: row.get("companions"),
                };
                let risk_score = activity.risk_score();

                Ok(ChurnRisk {
                    user_id: row.get("user_id"),
                    signup_date,
                    last_activity_date,
                    days_since_last_activity: activity.days_since_last_activity,
                    days_since_signup: activity.days_since_signup,
                    total_sessions: activity.sessions,
                    total_companions: activity.companions,
                    avg_sessions_per_week: one_decimal(activity.sessions_per_week()),
                    risk_score,
                    risk_level: Activity::risk_level(risk_score),
                    status: activity.status(risk_score),
                    recommendation: activity.recommendation(),
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        users.sort_by(|a, b| b.risk_score.cmp(&a.risk_score));
        Ok(ChurnReport::from_users(users))
    }

    /// Retention by signup month, newest 12 months first. A user is retained
    /// at day N if they had a session in the window starting N days after
    /// signup (day 1: [1, 2), day 7: [7, 14), day 30: [30, 60)).
    pub async fn cohorts(&self) -> AppResult<Vec<Cohort>> {
        let rows = sqlx::query(
            r#"
            WITH signups AS (
                SELECT user_id, MIN(created_at) AS signup
                FROM companions
                GROUP BY user_id
            ),
            offsets AS (
                SELECT s.user_id, julianday(t.created_at) - julianday(s.signup) AS days
                FROM signups s
                JOIN session_transcripts t ON t.user_id = s.user_id
            )
            SELECT substr(s.signup, 1, 7) AS month,
                   COUNT(*) AS size,
                   SUM(EXISTS (SELECT 1 FROM offsets o WHERE o.user_id = s.user_id
                               AND o.days >= 1 AND o.days < 2)) AS day1,
                   SUM(EXISTS (SELECT 1 FROM offsets o WHERE o.user_id = s.user_id
                               AND o.days >= 7 AND o.days < 14)) AS day7,
                   SUM(EXISTS (SELECT 1 FROM offsets o WHERE o.user_id = s.user_id
                               AND o.days >= 30 AND o.days < 60)) AS day30
            FROM signups s
            GROUP BY month
            ORDER BY month DESC
            LIMIT 12
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let size: i64 = row.get("size");
                let (day1, day7, day30): (i64, i64, i64) =
                    (row.get("day1"), row.get("day7"), row.get("day30"));
                Cohort {
                    month: row.get("month"),
                    size,
                    day1,
                    day7,
                    day30,
                    retention: Retention {
                        day1: percent(day1, size),
                        day7: percent(day7, size),
                        day30: percent(day30, size),
                    },
                }
            })
            .collect())
    }

    /// Engagement per companion, highest score first
    pub async fn companions(&self, now: DateTime<Utc>) -> AppResult<CompanionReport> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.name, c.subject, c.topic, c.created_at,
                   COUNT(t.id) AS sessions,
                   COUNT(DISTINCT t.user_id) AS users,
                   COALESCE(AVG(CASE
                       WHEN t.id IS NULL THEN NULL
                       WHEN json_valid(t.messages) THEN json_array_length(t.messages)
                       ELSE 0
                   END), 0.0) AS avg_messages,
                   MAX(t.created_at) AS last_used,
                   (SELECT COUNT(*) FROM (
                       SELECT r.user_id FROM session_transcripts r
                       WHERE r.companion_id = c.id
                       GROUP BY r.user_id
                       HAVING COUNT(*) > 1
                   )) AS returning_users
            FROM companions c
            LEFT JOIN session_transcripts t ON t.companion_id = c.id
            GROUP BY c.id
            ORDER BY c.created_at DESC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let companions = rows
            .iter()
            .map(|row| -> AppResult<CompanionEngagement> {
                let created: String = row.get("created_at");
                let created_at = decode_ts(&created)?;
                let total_sessions: i64 = row.get("sessions");
                let unique_users: i64 = row.get("users");
                let returning: i64 = row.get("returning_users");
                let avg_messages: f64 = row.get("avg_messages");
                let avg_session_length = avg_messages.round() as i64;
                let retention_rate = percent(returning, unique_users);
                let score = engagement_score(total_sessions, unique_users, avg_session_length, retention_rate);

                Ok(CompanionEngagement {
                    id: row.get("id"),
                    name: row.get("name"),
                    subject: row.get("subject"),
                    topic: row.get("topic"),
                    total_sessions,
                    unique_users,
                    avg_session_length,
                    retention_rate,
                    engagement_score: score,
                    performance: performance(score),
                    days_since_creation: (now - created_at).num_days(),
                    last_used: decode_opt_ts(row.get("last_used"))?.unwrap_or(created_at),
                    created_at,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(CompanionReport::from_companions(companions))
    }

    pub async fn dashboard(&self, now: DateTime<Utc>) -> AppResult<DashboardReport> {
        let year = now.year();
        let year_start = encode_ts(month_start(year, 1)?);
        let next_year = encode_ts(month_start(year + 1, 1)?);

        // Distinct users per month key, from one table
        let monthly = |table: &'static str| {
            let db = self.db.clone();
            let (from, to) = (year_start.clone(), next_year.clone());
            async move {
                let rows = sqlx::query(&format!(
                    "SELECT substr(created_at, 1, 7) AS month, COUNT(DISTINCT user_id) AS users \
                     FROM {} WHERE created_at >= ? AND created_at < ? GROUP BY month",
                    table
                ))
                .bind(from)
                .bind(to)
                .fetch_all(&db)
                .await?;
                Ok::<HashMap<String, i64>, AppError>(
                    rows.iter()
                        .map(|r| (r.get::<String, _>("month"), r.get::<i64, _>("users")))
                        .collect(),
                )
            }
        };
        let creators_by_month = monthly("companions").await?;
        let active_by_month = monthly("session_transcripts").await?;

        let signups: Vec<String> =
            sqlx::query_scalar("SELECT MIN(created_at) FROM companions GROUP BY user_id")
                .fetch_all(&self.db)
                .await?;

        let mut user_growth_data = Vec::with_capacity(12);
        let mut status_distribution_data = Vec::with_capacity(12);
        for (i, &name) in MONTH_NAMES.iter().enumerate() {
            let month = i as u32 + 1;
            let key = format!("{:04}-{:02}", year, month);
            let month_end = if month == 12 {
                next_year.clone()
            } else {
                encode_ts(month_start(year, month + 1)?)
            };

            let new = creators_by_month.get(&key).copied().unwrap_or(0);
            let active = active_by_month.get(&key).copied().unwrap_or(0);
            let known = signups.iter().filter(|s| s.as_str() < month_end.as_str()).count() as i64;

            user_growth_data.push(MonthlyUsers { name, users: new });
            status_distribution_data.push(MonthlyStatus {
                month: name,
                active,
                inactive: (known - active).max(0),
                new,
            });
        }

        // Daily activity, last 30 days including today
        let first_day = (now - Duration::days(29)).date_naive();
        let since = encode_ts(
            first_day
                .and_hms_opt(0, 0, 0)
                .map(|d| d.and_utc())
                .ok_or_else(|| AppError::Internal("Invalid engagement window".to_string()))?,
        );
        let daily = |table: &'static str| {
            let db = self.db.clone();
            let since = since.clone();
            async move {
                let rows = sqlx::query(&format!(
                    "SELECT substr(created_at, 1, 10) AS day, COUNT(*) AS total \
                     FROM {} WHERE created_at >= ? GROUP BY day",
                    table
                ))
                .bind(since)
                .fetch_all(&db)
                .await?;
                Ok::<HashMap<String, i64>, AppError>(
                    rows.iter()
                        .map(|r| (r.get::<String, _>("day"), r.get::<i64, _>("total")))
                        .collect(),
                )
            }
        };
        let sessions_by_day = daily("session_transcripts").await?;
        let companions_by_day = daily("companions").await?;
        let recaps_by_day = daily("session_recaps").await?;

        let engagement_data = (0..30)
            .map(|offset| {
                let date = first_day + Duration::days(offset);
                let key = date.format("%Y-%m-%d").to_string();
                DailyEngagement {
                    name: format!("{}/{}", date.month(), date.day()),
                    date,
                    sessions: sessions_by_day.get(&key).copied().unwrap_or(0),
                    companions: companions_by_day.get(&key).copied().unwrap_or(0),
                    recaps: recaps_by_day.get(&key).copied().unwrap_or(0),
                }
            })
            .collect();

        let month_ago = encode_ts(now - Duration::days(30));
        let week_ago = encode_ts(now - Duration::days(7));
        let two_weeks_ago = encode_ts(now - Duration::days(14));

        let totals = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(DISTINCT user_id) FROM companions) AS total_users,
                (SELECT COUNT(*) FROM companions) AS total_companions,
                (SELECT COUNT(*) FROM session_transcripts) AS total_sessions,
                (SELECT COUNT(*) FROM session_recaps) AS total_recaps,
                (SELECT COUNT(*) FROM feedback) AS total_feedback,
                (SELECT COALESCE(AVG(rating), 0.0) FROM feedback WHERE rating IS NOT NULL) AS avg_rating,
                (SELECT COUNT(DISTINCT user_id) FROM session_transcripts WHERE created_at >= ?1) AS active_users,
                (SELECT COUNT(*) FROM session_recaps WHERE created_at >= ?1) AS recent_recaps,
                (SELECT COALESCE(AVG(messages_count), 0.0) FROM session_recaps WHERE created_at >= ?1) AS avg_messages,
                (SELECT COUNT(DISTINCT user_id) FROM companions WHERE created_at >= ?2) AS this_week,
                (SELECT COUNT(DISTINCT user_id) FROM companions
                    WHERE created_at >= ?3 AND created_at < ?2) AS last_week
            "#,
        )
        .bind(&month_ago)
        .bind(&week_ago)
        .bind(&two_weeks_ago)
        .fetch_one(&self.db)
        .await?;

        let total_users: i64 = totals.get("total_users");
        let total_companions: i64 = totals.get("total_companions");
        let total_sessions: i64 = totals.get("total_sessions");
        let active_users: i64 = totals.get("active_users");
        let avg_messages: f64 = totals.get("avg_messages");
        let avg_rating: f64 = totals.get("avg_rating");
        let this_week: i64 = totals.get("this_week");
        let last_week: i64 = totals.get("last_week");

        let user_growth_percent = if last_week > 0 {
            (this_week - last_week) as f64 * 100.0 / last_week as f64
        } else if this_week > 0 {
            100.0
        } else {
            0.0
        };

        let performance_data = vec![
            metric("User Engagement", active_users as f64 * 100.0 / total_users.max(1) as f64),
            metric("Session Quality", avg_messages * 10.0),
            // Feedback ratings are 1-5
            metric("Satisfaction", avg_rating * 20.0),
            metric("Content Creation", total_companions as f64),
            metric("Learning Progress", total_sessions as f64),
        ];

        Ok(DashboardReport {
            summary: DashboardSummary {
                total_users,
                total_sessions,
                total_companions,
                total_recaps: totals.get("total_recaps"),
                total_feedback: totals.get("total_feedback"),
                new_users_this_week: this_week,
                user_growth_percent: one_decimal(user_growth_percent),
            },
            user_growth_data,
            status_distribution_data,
            engagement_data,
            performance_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    async fn companion(db: &SqlitePool, id: &str, user: &str, created: DateTime<Utc>) {
        sqlx::query(
            "INSERT INTO companions (id, user_id, name, subject, topic, style, voice, duration, created_at) \
             VALUES (?, ?, ?, 'maths', 'fractions', 'casual', 'female', 15, ?)",
        )
        .bind(id)
        .bind(user)
        .bind(format!("Companion {}", id))
        .bind(encode_ts(created))
        .execute(db)
        .await
        .unwrap();
    }

    async fn session(db: &SqlitePool, user: &str, companion: &str, messages: usize, created: DateTime<Utc>) {
        let messages: Vec<_> = (0..messages)
            .map(|i| serde_json::json!({"role": "user", "content": format!("m{}", i)}))
            .collect();
        sqlx::query(
            "INSERT INTO session_transcripts (id, user_id, companion_id, messages, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(user)
        .bind(companion)
        .bind(serde_json::Value::Array(messages).to_string())
        .bind(encode_ts(created))
        .execute(db)
        .await
        .unwrap();
    }

    async fn recap(db: &SqlitePool, user: &str, messages: i64, created: DateTime<Utc>) {
        sqlx::query(
            "INSERT INTO session_recaps (id, user_id, companion_name, subject, topic, bullet_points, \
             key_topics, summary, messages_count, created_at) \
             VALUES (?, ?, 'Companion', 'maths', 'fractions', '[]', '[]', 'summary', ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(user)
        .bind(messages)
        .bind(encode_ts(created))
        .execute(db)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_funnel_counts_distinct_users_per_stage() {
        let db = test_pool().await;
        let now = at(2025, 3, 15);

        companion(&db, "c1", "alice", now).await;
        companion(&db, "c2", "alice", now).await;
        companion(&db, "c3", "bob", now).await;
        companion(&db, "c4", "carol", now).await;
        companion(&db, "c5", "dave", now).await;

        session(&db, "alice", "c1", 4, now).await;
        session(&db, "alice", "c2", 1, now).await;
        session(&db, "bob", "c3", 2, now).await;
        // A visitor who never made a companion
        session(&db, "erin", "c1", 5, now).await;
        // Unreadable transcripts count as zero messages
        sqlx::query(
            "INSERT INTO session_transcripts (id, user_id, companion_id, messages, created_at) \
             VALUES ('broken', 'carol', 'c4', 'not json', ?)",
        )
        .bind(encode_ts(now))
        .execute(&db)
        .await
        .unwrap();

        recap(&db, "alice", 4, now).await;

        let report = ReportStore::new(db).funnel().await.unwrap();
        let users: Vec<i64> = report.funnel.iter().map(|s| s.users).collect();
        assert_eq!(users, vec![5, 4, 4, 2, 1]);

        assert_eq!(report.funnel[0].percentage, 100);
        assert_eq!(report.funnel[1].percentage, 80);
        assert_eq!(report.funnel[1].drop_off, 20);
        assert_eq!(report.funnel[3].percentage, 50);
        assert_eq!(report.funnel[3].drop_off, 50);
        assert_eq!(report.summary.overall_conversion, 20);
        assert_eq!(report.summary.biggest_drop_off.stage, "Completed Session");
    }

    #[tokio::test]
    async fn test_funnel_on_empty_tables() {
        let report = ReportStore::new(test_pool().await).funnel().await.unwrap();
        assert!(report.funnel.iter().all(|s| s.users == 0));
        assert_eq!(report.funnel[1].percentage, 0);
        assert_eq!(report.summary.biggest_drop_off.stage, "Visitors");
    }

    #[test]
    fn test_churn_scoring() {
        // Long gone, one companion, two old sessions
        let lapsed = Activity {
            days_since_signup: 90,
            days_since_last_activity: 45,
            sessions: 2,
            companions: 1,
        };
        assert_eq!(lapsed.risk_score(), 70);
        assert_eq!(Activity::risk_level(70), RiskLevel::Critical);
        assert_eq!(lapsed.status(70), EngagementStatus::Inactive);
        assert_eq!(
            lapsed.recommendation(),
            "Send re-engagement email with personalized content"
        );

        // Brand new, no sessions yet: 30 + 10, minus the new user slack
        let fresh = Activity {
            days_since_signup: 2,
            days_since_last_activity: 2,
            sessions: 0,
            companions: 1,
        };
        assert_eq!(fresh.risk_score(), 20);
        assert_eq!(Activity::risk_level(20), RiskLevel::Low);
        assert_eq!(fresh.recommendation(), "Provide onboarding assistance and tips");

        // Three sessions a week for four weeks
        let regular = Activity {
            days_since_signup: 28,
            days_since_last_activity: 1,
            sessions: 12,
            companions: 3,
        };
        assert_eq!(regular.sessions_per_week(), 3.0);
        assert_eq!(regular.risk_score(), 0);
        assert_eq!(regular.status(0), EngagementStatus::Engaged);
        assert_eq!(regular.recommendation(), "User is engaged, continue current strategy");
    }

    #[tokio::test]
    async fn test_churn_report_orders_by_risk() {
        let db = test_pool().await;
        let now = at(2025, 6, 30);

        companion(&db, "c1", "lapsed", now - Duration::days(90)).await;
        session(&db, "lapsed", "c1", 3, now - Duration::days(60)).await;
        session(&db, "lapsed", "c1", 3, now - Duration::days(45)).await;

        companion(&db, "c2", "regular", now - Duration::days(28)).await;
        companion(&db, "c3", "regular", now - Duration::days(20)).await;
        for day in 0..12 {
            session(&db, "regular", "c2", 5, now - Duration::days(1 + day * 2)).await;
        }

        let report = ReportStore::new(db).churn(now).await.unwrap();
        assert_eq!(report.users.len(), 2);
        assert_eq!(report.users[0].user_id, "lapsed");
        assert_eq!(report.users[0].days_since_last_activity, 45);
        assert_eq!(report.users[0].risk_level, RiskLevel::Critical);
        assert_eq!(report.users[1].user_id, "regular");
        assert_eq!(report.users[1].total_companions, 2);
        assert_eq!(report.users[1].last_activity_date, now - Duration::days(1));

        assert_eq!(report.summary.total_users, 2);
        assert_eq!(report.summary.critical_count, 1);
        assert_eq!(report.summary.inactive_count, 1);
        assert_eq!(report.summary.churn_rate, 50);
        assert_eq!(report.segments.inactive.len(), 1);
        assert_eq!(report.segments.low[0].user_id, "regular");
    }

    #[tokio::test]
    async fn test_cohort_retention_windows() {
        let db = test_pool().await;
        let signup = at(2025, 1, 10);

        // Back the next day and again after a week
        companion(&db, "c1", "alice", signup).await;
        session(&db, "alice", "c1", 3, signup + Duration::hours(30)).await;
        session(&db, "alice", "c1", 3, signup + Duration::days(8)).await;

        // Same-day session only: not retained
        companion(&db, "c2", "bob", signup + Duration::days(3)).await;
        session(&db, "bob", "c2", 3, signup + Duration::days(3) + Duration::hours(2)).await;

        // Back after a month
        companion(&db, "c3", "carol", signup + Duration::days(5)).await;
        session(&db, "carol", "c3", 3, signup + Duration::days(40)).await;

        // Next month's cohort
        companion(&db, "c4", "dave", at(2025, 2, 2)).await;

        let cohorts = ReportStore::new(db).cohorts().await.unwrap();
        assert_eq!(cohorts.len(), 2);
        assert_eq!(cohorts[0].month, "2025-02");
        assert_eq!(cohorts[0].size, 1);
        assert_eq!(cohorts[0].retention.day1, 0);

        let january = &cohorts[1];
        assert_eq!(january.month, "2025-01");
        assert_eq!(january.size, 3);
        assert_eq!((january.day1, january.day7, january.day30), (1, 1, 1));
        assert_eq!(january.retention.day1, 33);
    }

    #[tokio::test]
    async fn test_companion_engagement() {
        let db = test_pool().await;
        let now = at(2025, 6, 30);

        companion(&db, "popular", "author", now - Duration::days(10)).await;
        session(&db, "alice", "popular", 4, now - Duration::days(3)).await;
        session(&db, "alice", "popular", 6, now - Duration::days(2)).await;
        session(&db, "bob", "popular", 2, now - Duration::days(1)).await;

        companion(&db, "idle", "author", now - Duration::days(20)).await;

        let report = ReportStore::new(db).companions(now).await.unwrap();
        assert_eq!(report.all_companions.len(), 2);

        let popular = &report.top_performers[0];
        assert_eq!(popular.id, "popular");
        assert_eq!(popular.total_sessions, 3);
        assert_eq!(popular.unique_users, 2);
        assert_eq!(popular.avg_session_length, 4);
        assert_eq!(popular.retention_rate, 50);
        // 3*20 + 2*15 + 4*3 + 50*0.5 capped at 100
        assert_eq!(popular.engagement_score, 100);
        assert_eq!(popular.performance, Performance::High);
        assert_eq!(popular.last_used, now - Duration::days(1));
        assert_eq!(report.trending[0].id, "popular");

        let idle = &report.all_companions[1];
        assert_eq!(idle.engagement_score, 0);
        assert_eq!(idle.last_used, idle.created_at);
        assert_eq!(report.underperformers[0].id, "idle");

        assert_eq!(report.summary.total_sessions, 3);
        assert_eq!(report.summary.avg_engagement, 50);
        assert_eq!(report.summary.low_performers, 1);
    }

    #[test]
    fn test_engagement_score_shape() {
        assert_eq!(engagement_score(1, 1, 3, 0), 44);
        assert_eq!(performance(44), Performance::Medium);
        assert_eq!(engagement_score(0, 0, 0, 0), 0);
        assert_eq!(performance(0), Performance::Low);
    }

    #[tokio::test]
    async fn test_dashboard_aggregates() {
        let db = test_pool().await;
        let now = at(2025, 3, 20);

        companion(&db, "c1", "alice", at(2025, 1, 5)).await;
        companion(&db, "c2", "bob", now - Duration::days(2)).await;
        companion(&db, "c3", "carol", now - Duration::days(10)).await;
        session(&db, "alice", "c1", 6, now - Duration::days(1)).await;
        session(&db, "bob", "c2", 4, now).await;
        recap(&db, "alice", 6, now - Duration::days(1)).await;

        let report = ReportStore::new(db).dashboard(now).await.unwrap();

        assert_eq!(report.summary.total_users, 3);
        assert_eq!(report.summary.total_companions, 3);
        assert_eq!(report.summary.total_sessions, 2);
        assert_eq!(report.summary.total_recaps, 1);
        assert_eq!(report.summary.new_users_this_week, 1);
        // One creator this week, one the week before
        assert_eq!(report.summary.user_growth_percent, 0.0);

        assert_eq!(report.user_growth_data.len(), 12);
        assert_eq!(report.user_growth_data[0].users, 1);
        assert_eq!(report.user_growth_data[2].users, 2);

        let march = &report.status_distribution_data[2];
        assert_eq!((march.active, march.inactive, march.new), (2, 1, 2));
        let january = &report.status_distribution_data[0];
        assert_eq!((january.active, january.inactive, january.new), (0, 1, 1));

        assert_eq!(report.engagement_data.len(), 30);
        let today = report.engagement_data.last().unwrap();
        assert_eq!(today.name, "3/20");
        assert_eq!(today.sessions, 1);
        assert_eq!(today.companions, 0);

        let quality = report
            .performance_data
            .iter()
            .find(|m| m.metric == "Session Quality")
            .unwrap();
        assert_eq!(quality.value, 60.0);
        let engagement = &report.performance_data[0];
        assert_eq!(engagement.value, 66.7);
    }
}
