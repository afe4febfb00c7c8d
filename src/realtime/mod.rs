/// Server-sent event streams
///
/// Each stream starts with a `connected` frame, emits a `heartbeat` frame on
/// a fixed period and forwards ban signals from the [`SignalHub`] as
/// `user_status` frames. A stream ends when the client disconnects (the
/// response body is dropped) or the hub shuts down.
use crate::{
    metrics,
    moderation::{BanSignal, SignalHub},
};
use axum::response::sse::{Event, KeepAlive, Sse};
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use std::{convert::Infallible, time::Duration};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    time::{interval_at, Instant, Interval, MissedTickBehavior},
};

/// JSON payload of one `data:` frame
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    Connected {
        message: String,
        timestamp: DateTime<Utc>,
    },
    Heartbeat {
        timestamp: DateTime<Utc>,
    },
    UserStatus(BanSignal),
}

/// Which ban signals a stream forwards
#[derive(Debug, Clone)]
pub enum SignalFilter {
    All,
    User(String),
}

impl SignalFilter {
    fn matches(&self, signal: &BanSignal) -> bool {
        match self {
            SignalFilter::All => true,
            SignalFilter::User(user_id) => signal.user_id == *user_id,
        }
    }
}

/// Keeps the open-stream gauge accurate however the stream ends
struct StreamGuard;

impl StreamGuard {
    fn open() -> Self {
        metrics::EVENT_STREAMS_ACTIVE.inc();
        StreamGuard
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        metrics::EVENT_STREAMS_ACTIVE.dec();
    }
}

struct StreamState {
    greeting: Option<StreamFrame>,
    signals: broadcast::Receiver<BanSignal>,
    heartbeat: Interval,
    filter: SignalFilter,
    _guard: StreamGuard,
}

/// Frame stream for one subscriber
pub fn frames(
    hub: &SignalHub,
    heartbeat: Duration,
    filter: SignalFilter,
    greeting: &str,
) -> impl Stream<Item = StreamFrame> + Send + 'static {
    let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let state = StreamState {
        greeting: Some(StreamFrame::Connected {
            message: greeting.to_string(),
            timestamp: Utc::now(),
        }),
        signals: hub.subscribe(),
        heartbeat: ticker,
        filter,
        _guard: StreamGuard::open(),
    };

    stream::unfold(state, |mut state| async move {
        if let Some(frame) = state.greeting.take() {
            return Some((frame, state));
        }

        loop {
            tokio::select! {
                _ = state.heartbeat.tick() => {
                    let frame = StreamFrame::Heartbeat { timestamp: Utc::now() };
                    return Some((frame, state));
                }
                received = state.signals.recv() => match received {
                    Ok(signal) if state.filter.matches(&signal) => {
                        return Some((StreamFrame::UserStatus(signal), state));
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event stream lagged, signals dropped");
                        continue;
                    }
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    })
}

/// Wrap a frame stream as an SSE response
pub fn sse_response(
    frames: impl Stream<Item = StreamFrame> + Send + 'static,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static> {
    let events = frames.map(|frame| {
        let event = Event::default().json_data(&frame).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to encode stream frame");
            Event::default().comment("encoding error")
        });
        Ok(event)
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
