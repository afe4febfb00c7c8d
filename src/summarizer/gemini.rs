/// Gemini-backed summarizer
use super::{RecapContent, RecapRequest, Summarizer};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub struct GeminiSummarizer {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiSummarizer {
    pub fn new(api_key: &str, model: &str, endpoint: &str, timeout_secs: u64) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn prompt(request: &RecapRequest<'_>) -> String {
        format!(
            r#"You are an educational assistant reviewing a learning session between a student and an AI companion named "{companion}".

Subject: {subject}
Topic: {topic}
Total messages: {count}

Transcript:
{transcript}

Respond with a single JSON object with exactly these fields:
- "bullet_points": exactly 12 learning points, each two or three sentences explaining a concept from the session, why it matters and how it applies
- "key_topics": the 3 to 5 main topics discussed
- "summary": a two or three sentence summary of what was learned

Return only the JSON object, without markdown formatting."#,
            companion = request.companion_name,
            subject = request.subject,
            topic = request.topic,
            count = request.messages.len(),
            transcript = request.transcript(),
        )
    }
}

/// Parse the model's reply, tolerating a markdown code fence around it
fn parse_recap(text: &str) -> AppResult<RecapContent> {
    let text = text.trim();
    let unfenced = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```"))
        .unwrap_or(text);

    serde_json::from_str(unfenced.trim())
        .map_err(|e| AppError::Upstream(format!("Malformed recap from model: {}", e)))
}

#[async_trait]
impl Summarizer for GeminiSummarizer {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn summarize(&self, request: &RecapRequest<'_>) -> AppResult<RecapContent> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        let body = json!({
            "contents": [{ "parts": [{ "text": Self::prompt(request) }] }]
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upstream(format!("Gemini returned {}", status)));
        }

        let reply: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Invalid Gemini response: {}", e)))?;

        let text = reply
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.text)
            .ok_or_else(|| AppError::Upstream("Gemini returned no text".to_string()))?;

        parse_recap(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::ChatMessage;
    use axum::{routing::post, Json, Router};

    const REPLY: &str = r#"{"bullet_points":["One"],"key_topics":["Neurons"],"summary":"Short."}"#;

    #[test]
    fn test_parse_plain_and_fenced() {
        let plain = parse_recap(REPLY).unwrap();
        assert_eq!(plain.key_topics, vec!["Neurons"]);

        let fenced = parse_recap(&format!("```json\n{}\n```", REPLY)).unwrap();
        assert_eq!(fenced, plain);

        let bare_fence = parse_recap(&format!("```\n{}\n```\n", REPLY)).unwrap();
        assert_eq!(bare_fence, plain);
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        assert!(matches!(
            parse_recap(r#"{"bullet_points":[],"summary":"x"}"#),
            Err(AppError::Upstream(_))
        ));
        assert!(parse_recap("Sure! Here is your recap").is_err());
    }

    #[tokio::test]
    async fn test_summarize_against_local_endpoint() {
        let app = Router::new().route(
            "/models/:model",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert!(body["contents"][0]["parts"][0]["text"]
                    .as_str()
                    .unwrap()
                    .contains("Student: hello"));
                Json(json!({
                    "candidates": [{ "content": { "parts": [{ "text": format!("```json\n{}\n```", REPLY) }] } }]
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let summarizer =
            GeminiSummarizer::new("test-key", "gemini-1.5-flash", &format!("http://{}", addr), 5).unwrap();
        let messages = vec![ChatMessage { role: "user".into(), content: "hello".into() }];
        let recap = summarizer
            .summarize(&RecapRequest {
                messages: &messages,
                companion_name: "Neura",
                subject: "science",
                topic: "Neurons",
            })
            .await
            .unwrap();

        assert_eq!(recap.summary, "Short.");
    }
}
