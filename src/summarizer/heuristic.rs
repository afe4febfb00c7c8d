/// Deterministic recap built from the transcript text alone
use super::{RecapContent, RecapRequest, Summarizer};
use crate::error::AppResult;
use async_trait::async_trait;
use std::collections::HashMap;

const BULLET_POINTS: usize = 12;
const MAX_KEY_TOPICS: usize = 5;

/// Phrases that mark a sentence as a learning point
const TEACHING_MARKERS: &[&str] = &[
    "learned about",
    "important to remember",
    "key concept",
    "main idea",
    "remember that",
    "it's crucial",
    "the principle",
    "fundamental",
    "explained",
    "discussed",
];

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is",
    "are", "was", "were", "be", "been", "have", "has", "had", "do", "does", "did", "will", "would",
    "should", "could", "can", "may", "might", "must", "shall", "this", "that", "these", "those",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicSummarizer;

#[async_trait]
impl Summarizer for HeuristicSummarizer {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn summarize(&self, request: &RecapRequest<'_>) -> AppResult<RecapContent> {
        Ok(build_recap(request))
    }
}

fn build_recap(request: &RecapRequest<'_>) -> RecapContent {
    let transcript = request.transcript();

    let mut bullet_points: Vec<String> = transcript
        .split(|c| matches!(c, '.' | '!' | '?'))
        .map(str::trim)
        .filter(|s| s.chars().count() > 20)
        .filter(|s| {
            let lower = s.to_lowercase();
            TEACHING_MARKERS.iter().any(|m| lower.contains(m))
        })
        .take(BULLET_POINTS)
        .map(|s| {
            format!(
                "{}. This concept is fundamental to understanding {} and provides valuable insights for practical application.",
                capitalize(s),
                request.subject
            )
        })
        .collect();

    let padding = generic_points(request);
    bullet_points.extend(padding.into_iter().take(BULLET_POINTS - bullet_points.len()));

    let key_topics = std::iter::once(request.topic.to_string())
        .chain(
            frequent_words(&transcript, 4)
                .into_iter()
                .filter(|w| !w.eq_ignore_ascii_case(request.topic)),
        )
        .take(MAX_KEY_TOPICS)
        .collect();

    // Roughly a minute and a half per exchange
    let minutes = (request.messages.len() * 3).div_ceil(2);
    let summary = format!(
        "You completed a {}-minute interactive learning session with {} on {} in {}. \
         The session covered important concepts and included practical discussions to enhance \
         your understanding of the subject matter.",
        minutes, request.companion_name, request.topic, request.subject
    );

    RecapContent {
        bullet_points,
        key_topics,
        summary,
    }
}

/// The `limit` most frequent non-stopword words longer than three
/// characters, capitalized. Ties keep first-seen order.
fn frequent_words(text: &str, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();

    for word in text.to_lowercase().split_whitespace() {
        let cleaned: String = word
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        if cleaned.len() <= 3 || STOPWORDS.contains(&cleaned.as_str()) {
            continue;
        }
        let seen = counts.len();
        counts.entry(cleaned).or_insert((0, seen)).0 += 1;
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    ranked
        .into_iter()
        .take(limit)
        .map(|(word, _, _)| capitalize(&word))
        .collect()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn generic_points(request: &RecapRequest<'_>) -> Vec<String> {
    let (subject, topic, companion) = (request.subject, request.topic, request.companion_name);

    vec![
        format!("Explored fundamental concepts in {subject} related to {topic}, building an understanding of the core principles and where they apply. This groundwork supports more advanced study."),
        format!("Worked through an interactive session with {companion}, using conversation to clarify difficult ideas and reinforce understanding of the material."),
        format!("Discussed practical applications and real-world examples showing how the theory behind {topic} shows up in everyday situations."),
        format!("Looked at how different ideas within {subject} relate to each other, which makes the overall picture easier to reason about."),
        format!("Practiced critical thinking through guided questions about {topic}, approaching problems step by step and evaluating answers carefully."),
        format!("Identified common misconceptions about {topic} and how to avoid them, leading to a more accurate understanding."),
        format!("Considered the historical development of key ideas in {subject} and how current understanding came to be."),
        format!("Connected {topic} to other subjects, seeing how the same ideas appear across different fields."),
        format!("Applied problem-solving methods specific to {subject}, building confidence in tackling new questions."),
        format!("Reinforced the main principles through worked examples and scenarios that put the theory into context."),
        format!("Built up vocabulary specific to {subject}, making it easier to describe concepts precisely and follow further material."),
        format!("Reflected on progress and noted areas of {topic} worth exploring next."),
    ]
}
