/// HTTP identity source for the ban monitor
///
/// Polls `GET /api/me` with the session token. Redirects are not followed:
/// the server answers a banned session with a redirect to `/banned`. Also
/// subscribes to `GET /api/me/events` for pushed status changes.
use super::{IdentityCheck, IdentitySource};
use crate::{
    error::{AppError, AppResult},
    identity::UserRecord,
    moderation::BanSignal,
};
use async_trait::async_trait;
use futures::StreamExt;
use rand::Rng;
use reqwest::{header::LOCATION, redirect::Policy, Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Incoming event-stream frame; only status changes matter here
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IncomingFrame {
    UserStatus(BanSignal),
    #[serde(other)]
    Other,
}

pub struct HttpIdentitySource {
    client: Client,
    base_url: String,
    session_token: String,
}

impl HttpIdentitySource {
    pub fn new(base_url: &str, session_token: &str) -> AppResult<Self> {
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session_token: session_token.to_string(),
        })
    }

    /// Forward pushed status changes into a channel, reconnecting after
    /// `reconnect_after` (plus a little jitter) when the stream drops. Ends when the receiver is
    /// dropped or the server rejects the session.
    pub fn subscribe_events(&self, buffer: usize, reconnect_after: Duration) -> mpsc::Receiver<BanSignal> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let client = self.client.clone();
        let url = format!("{}/api/me/events", self.base_url);
        let token = self.session_token.clone();

        tokio::spawn(async move {
            loop {
                match Self::stream_events(&client, &url, &token, &tx).await {
                    Ok(StreamEnd::ReceiverGone) => return,
                    Ok(StreamEnd::Rejected(status)) => {
                        info!(%status, "event stream rejected, stopping push feed");
                        return;
                    }
                    Ok(StreamEnd::Disconnected) => debug!("event stream ended"),
                    Err(e) => warn!(error = %e, "event stream failed"),
                }

                if tx.is_closed() {
                    return;
                }
                let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..250));
                tokio::time::sleep(reconnect_after + jitter).await;
            }
        });

        rx
    }

    async fn stream_events(
        client: &Client,
        url: &str,
        token: &str,
        tx: &mpsc::Sender<BanSignal>,
    ) -> AppResult<StreamEnd> {
        let response = client
            .get(url)
            .bearer_auth(token)
            .header("accept", "text/event-stream")
            // The stream outlives the client's request timeout
            .timeout(Duration::from_secs(24 * 60 * 60))
            .send()
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(StreamEnd::Rejected(response.status()));
        }

        let mut body = response.bytes_stream();
        // Raw bytes: a chunk may end inside a multi-byte character
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| AppError::Upstream(e.to_string()))?;
            buffer.extend_from_slice(&chunk);

            for signal in drain_sse_signals(&mut buffer) {
                if tx.send(signal).await.is_err() {
                    return Ok(StreamEnd::ReceiverGone);
                }
            }
        }

        Ok(StreamEnd::Disconnected)
    }
}

enum StreamEnd {
    Disconnected,
    ReceiverGone,
    Rejected(StatusCode),
}

/// Drop the `\r` of every CRLF pair. A trailing `\r` stays until its `\n` arrives.
fn strip_crlf(buffer: &mut Vec<u8>) {
    if !buffer.contains(&b'\r') {
        return;
    }
    let mut normalized = Vec::with_capacity(buffer.len());
    let mut bytes = buffer.iter().copied().peekable();
    while let Some(byte) = bytes.next() {
        if byte == b'\r' && bytes.peek() == Some(&b'\n') {
            continue;
        }
        normalized.push(byte);
    }
    *buffer = normalized;
}

/// Remove every complete event from `buffer`, returning the status changes.
/// Events are decoded as UTF-8 only once complete.
fn drain_sse_signals(buffer: &mut Vec<u8>) -> Vec<BanSignal> {
    strip_crlf(buffer);

    let mut signals = Vec::new();
    while let Some(end) = buffer.windows(2).position(|w| w == b"\n\n") {
        let raw: Vec<u8> = buffer.drain(..end + 2).collect();
        let event = String::from_utf8_lossy(&raw);

        let data = event
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim_start)
            .collect::<Vec<_>>()
            .join("\n");
        if data.is_empty() {
            continue;
        }

        match serde_json::from_str::<IncomingFrame>(&data) {
            Ok(IncomingFrame::UserStatus(signal)) => signals.push(signal),
            Ok(IncomingFrame::Other) => {}
            Err(e) => debug!(error = %e, "ignoring malformed event frame"),
        }
    }

    signals
}

#[async_trait]
impl IdentitySource for HttpIdentitySource {
    async fn check(&self) -> AppResult<IdentityCheck> {
        let response = self
            .client
            .get(format!("{}/api/me", self.base_url))
            .bearer_auth(&self.session_token)
            .send()
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))?;

        let status = response.status();

        if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            return if location.contains("/banned") {
                Ok(IdentityCheck::Banned { reason: None })
            } else {
                Err(AppError::Upstream(format!("Unexpected redirect to {}", location)))
            };
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::NOT_FOUND {
            return Ok(IdentityCheck::Gone);
        }

        if !status.is_success() {
            return Err(AppError::Upstream(format!("Identity check returned {}", status)));
        }

        let user: UserRecord = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Invalid identity response: {}", e)))?;

        Ok(if user.is_banned() {
            IdentityCheck::Banned { reason: user.status_reason }
        } else {
            IdentityCheck::Clear
        })
    }
}
