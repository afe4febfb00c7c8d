/// Learning records
///
/// Companions and bookmarks, session transcripts and recaps, feedback,
/// learning logs, analytics events and the admin reports over them. Every
/// record is owned by the user that created it; lookups for another user's
/// record behave as not found.

pub mod analytics;
pub mod companions;
pub mod feedback;
pub mod logs;
pub mod reports;
pub mod sessions;

pub use analytics::{AnalyticsEvent, AnalyticsStore, DashboardCounts, EventType, NewAnalyticsEvent};
pub use companions::{Companion, CompanionFilter, CompanionStore, NewCompanion};
pub use feedback::{Feedback, FeedbackFilter, FeedbackStatus, FeedbackStore, FeedbackType, NewFeedback};
pub use logs::{LearningLog, LearningLogFilter, LearningLogStore, Mood, NewLearningLog};
pub use reports::ReportStore;
pub use sessions::{ChatMessage, NewRecap, SessionHistoryItem, SessionRecap, SessionStore, SessionTranscript};

/// Store a string list as JSON text
pub(crate) fn encode_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// Read a JSON text list; malformed values read as empty
pub(crate) fn decode_list(value: &str) -> Vec<String> {
    serde_json::from_str(value).unwrap_or_default()
}

/// Trim, lower-case and drop empty tags
pub(crate) fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}
