/// Session recap generation
///
/// A [`Summarizer`] turns a transcript into bullet points, key topics and a
/// short summary. [`RecapGenerator`] tries the configured model first and
/// falls back to the deterministic [`HeuristicSummarizer`] on any failure,
/// so a recap request only fails on bad input.

pub mod gemini;
pub mod heuristic;

pub use gemini::GeminiSummarizer;
pub use heuristic::HeuristicSummarizer;

use crate::{
    config::SummarizerConfig,
    error::{AppError, AppResult},
    learning::ChatMessage,
    metrics,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Generated recap content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecapContent {
    pub bullet_points: Vec<String>,
    pub key_topics: Vec<String>,
    pub summary: String,
}

/// Input to a summarizer
#[derive(Debug, Clone, Copy)]
pub struct RecapRequest<'a> {
    pub messages: &'a [ChatMessage],
    pub companion_name: &'a str,
    pub subject: &'a str,
    pub topic: &'a str,
}

impl RecapRequest<'_> {
    /// Transcript with the learner labelled `Student` and the assistant by
    /// the companion's name
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| {
                let speaker = if m.role == "user" { "Student" } else { self.companion_name };
                format!("{}: {}", speaker, m.content)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Label used in logs and metrics
    fn name(&self) -> &'static str;

    async fn summarize(&self, request: &RecapRequest<'_>) -> AppResult<RecapContent>;
}

/// Primary summarizer with heuristic fallback
#[derive(Clone)]
pub struct RecapGenerator {
    primary: Option<Arc<dyn Summarizer>>,
    fallback: HeuristicSummarizer,
}

impl RecapGenerator {
    pub fn new(primary: Option<Arc<dyn Summarizer>>) -> Self {
        Self {
            primary,
            fallback: HeuristicSummarizer,
        }
    }

    /// Gemini when an API key is configured, heuristic only otherwise
    pub fn from_config(config: &SummarizerConfig) -> AppResult<Self> {
        let primary = match &config.gemini_api_key {
            Some(key) => Some(Arc::new(GeminiSummarizer::new(
                key,
                &config.model,
                &config.endpoint,
                config.timeout_secs,
            )?) as Arc<dyn Summarizer>),
            None => {
                tracing::info!("No GEMINI_API_KEY set, session recaps use the heuristic summarizer");
                None
            }
        };

        Ok(Self::new(primary))
    }

    pub async fn generate(&self, request: &RecapRequest<'_>) -> AppResult<RecapContent> {
        if request.messages.is_empty() {
            return Err(AppError::Validation("No messages provided".to_string()));
        }

        if let Some(primary) = &self.primary {
            match primary.summarize(request).await {
                Ok(recap) => {
                    metrics::record_recap(primary.name());
                    return Ok(recap);
                }
                Err(e) => {
                    tracing::warn!(summarizer = primary.name(), error = %e, "recap generation failed, using fallback");
                }
            }
        }

        let recap = self.fallback.summarize(request).await?;
        metrics::record_recap(self.fallback.name());
        Ok(recap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    #[async_trait]
    impl Summarizer for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn summarize(&self, _request: &RecapRequest<'_>) -> AppResult<RecapContent> {
            Err(AppError::Upstream("model unavailable".into()))
        }
    }

    fn messages() -> Vec<ChatMessage> {
        vec![
            ChatMessage { role: "user".into(), content: "What is a neuron?".into() },
            ChatMessage { role: "assistant".into(), content: "A neuron is a nerve cell.".into() },
        ]
    }

    fn request(messages: &[ChatMessage]) -> RecapRequest<'_> {
        RecapRequest {
            messages,
            companion_name: "Neura",
            subject: "science",
            topic: "Neurons",
        }
    }

    #[test]
    fn test_transcript_labels_speakers() {
        let messages = messages();
        assert_eq!(
            request(&messages).transcript(),
            "Student: What is a neuron?\n\nNeura: A neuron is a nerve cell."
        );
    }

    #[tokio::test]
    async fn test_falls_back_on_failure() {
        let messages = messages();
        let generator = RecapGenerator::new(Some(Arc::new(Broken)));

        let recap = generator.generate(&request(&messages)).await.unwrap();
        assert_eq!(recap.bullet_points.len(), 12);
        assert_eq!(recap.key_topics[0], "Neurons");
    }

    #[tokio::test]
    async fn test_empty_transcript_rejected() {
        let generator = RecapGenerator::new(None);
        assert!(matches!(
            generator.generate(&request(&[])).await,
            Err(AppError::Validation(_))
        ));
    }
}
