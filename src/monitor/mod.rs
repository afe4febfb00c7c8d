/// Client ban monitor
///
/// Run by an authenticated client session. Checks the caller's own identity
/// right away and then on every tick; a pushed ban signal triggers an early
/// check. The identity source is always the judge, pushed signals only wake
/// the monitor up.
///
/// Terminal outcomes:
/// - banned: local state cleared, session ended, navigate to `/banned`
/// - deleted: same, navigate to `/`
///
/// A source reporting the identity gone ends the monitor at once. Transient
/// failures are retried on later ticks and only end it after
/// `max_consecutive_failures` in a row.

pub mod http;

pub use http::HttpIdentitySource;

use crate::{
    error::AppResult,
    moderation::{BanSignal, SignalStatus},
};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::mpsc,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

/// Result of one identity check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityCheck {
    /// Signed in and not banned
    Clear,
    Banned { reason: Option<String> },
    /// The identity no longer exists or the session is no longer accepted
    Gone,
}

/// Where the monitor reads the caller's identity from
#[async_trait]
pub trait IdentitySource: Send + Sync {
    /// Errors are treated as transient
    async fn check(&self) -> AppResult<IdentityCheck>;
}

/// Client-side session controls the monitor drives on termination
#[async_trait]
pub trait SessionControl: Send + Sync {
    async fn clear_local_state(&self);
    async fn sign_out(&self) -> AppResult<()>;
    async fn navigate(&self, path: &str);
}

#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub interval: Duration,
    pub max_consecutive_failures: u32,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_consecutive_failures: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    Banned,
    Deleted,
}

impl MonitorOutcome {
    pub fn redirect_path(&self) -> &'static str {
        match self {
            MonitorOutcome::Banned => "/banned",
            MonitorOutcome::Deleted => "/",
        }
    }
}

enum Wake {
    Tick,
    Push(Option<BanSignal>),
}

pub struct BanMonitor {
    source: Arc<dyn IdentitySource>,
    session: Arc<dyn SessionControl>,
    options: MonitorOptions,
    push: Option<mpsc::Receiver<BanSignal>>,
    consecutive_failures: u32,
}

impl BanMonitor {
    pub fn new(
        source: Arc<dyn IdentitySource>,
        session: Arc<dyn SessionControl>,
        options: MonitorOptions,
    ) -> Self {
        Self {
            source,
            session,
            options,
            push: None,
            consecutive_failures: 0,
        }
    }

    /// Also wake on pushed signals (for this user)
    pub fn with_push(mut self, signals: mpsc::Receiver<BanSignal>) -> Self {
        self.push = Some(signals);
        self
    }

    /// Run until a terminal outcome, performing the logout side effects
    pub async fn run(mut self) -> MonitorOutcome {
        let outcome = self.watch().await;

        info!(outcome = ?outcome, "ban monitor terminating session");
        self.session.clear_local_state().await;
        if let Err(e) = self.session.sign_out().await {
            warn!(error = %e, "sign out failed");
        }
        self.session.navigate(outcome.redirect_path()).await;

        outcome
    }

    async fn watch(&mut self) -> MonitorOutcome {
        if let Some(outcome) = self.evaluate().await {
            return outcome;
        }

        let period = self.options.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let wake = match self.push.as_mut() {
                Some(signals) => tokio::select! {
                    _ = ticker.tick() => Wake::Tick,
                    signal = signals.recv() => Wake::Push(signal),
                },
                None => {
                    ticker.tick().await;
                    Wake::Tick
                }
            };

            match wake {
                Wake::Tick => {}
                Wake::Push(Some(signal)) => {
                    if signal.status == SignalStatus::Active {
                        continue;
                    }
                    debug!(status = signal.status.as_str(), "pushed status change, checking now");
                }
                Wake::Push(None) => {
                    debug!("push channel closed, polling only");
                    self.push = None;
                    continue;
                }
            }

            if let Some(outcome) = self.evaluate().await {
                return outcome;
            }
        }
    }

    async fn evaluate(&mut self) -> Option<MonitorOutcome> {
        match self.source.check().await {
            Ok(IdentityCheck::Clear) => {
                self.consecutive_failures = 0;
                None
            }
            Ok(IdentityCheck::Banned { reason }) => {
                info!(reason = reason.as_deref().unwrap_or(""), "ban detected");
                Some(MonitorOutcome::Banned)
            }
            Ok(IdentityCheck::Gone) => Some(MonitorOutcome::Deleted),
            Err(e) => {
                self.consecutive_failures += 1;
                warn!(
                    error = %e,
                    failures = self.consecutive_failures,
                    "identity check failed"
                );
                (self.consecutive_failures >= self.options.max_consecutive_failures)
                    .then_some(MonitorOutcome::Deleted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::{collections::VecDeque, sync::Mutex};
    use tokio::time::timeout;

    /// Replays scripted results, then repeats the fallback
    struct ScriptedSource {
        script: Mutex<VecDeque<AppResult<IdentityCheck>>>,
        fallback: IdentityCheck,
        calls: Mutex<u32>,
    }

    impl ScriptedSource {
        fn new(script: Vec<AppResult<IdentityCheck>>, fallback: IdentityCheck) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                fallback,
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl IdentitySource for ScriptedSource {
        async fn check(&self) -> AppResult<IdentityCheck> {
            *self.calls.lock().unwrap() += 1;
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(self.fallback.clone()))
        }
    }

    #[derive(Default)]
    struct RecordingSession {
        actions: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SessionControl for RecordingSession {
        async fn clear_local_state(&self) {
            self.actions.lock().unwrap().push("clear".into());
        }

        async fn sign_out(&self) -> AppResult<()> {
            self.actions.lock().unwrap().push("sign_out".into());
            Ok(())
        }

        async fn navigate(&self, path: &str) {
            self.actions.lock().unwrap().push(format!("navigate:{}", path));
        }
    }

    fn fast() -> MonitorOptions {
        MonitorOptions {
            interval: Duration::from_millis(5),
            max_consecutive_failures: 3,
        }
    }

    fn transient() -> AppResult<IdentityCheck> {
        Err(AppError::Upstream("connection refused".into()))
    }

    #[tokio::test]
    async fn test_initial_check_detects_ban() {
        let source = ScriptedSource::new(vec![], IdentityCheck::Banned { reason: None });
        let session = Arc::new(RecordingSession::default());

        let outcome = BanMonitor::new(source.clone(), session.clone(), MonitorOptions::default())
            .run()
            .await;

        assert_eq!(outcome, MonitorOutcome::Banned);
        assert_eq!(source.calls(), 1);
        assert_eq!(
            *session.actions.lock().unwrap(),
            vec!["clear", "sign_out", "navigate:/banned"]
        );
    }

    #[tokio::test]
    async fn test_gone_redirects_home() {
        let source = ScriptedSource::new(vec![Ok(IdentityCheck::Clear)], IdentityCheck::Gone);
        let session = Arc::new(RecordingSession::default());

        let outcome = timeout(
            Duration::from_secs(5),
            BanMonitor::new(source, session.clone(), fast()).run(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, MonitorOutcome::Deleted);
        assert_eq!(session.actions.lock().unwrap().last().unwrap(), "navigate:/");
    }

    #[tokio::test]
    async fn test_transient_failures_below_threshold_keep_running() {
        let source = ScriptedSource::new(
            vec![
                transient(),
                transient(),
                Ok(IdentityCheck::Clear),
                transient(),
                transient(),
            ],
            IdentityCheck::Banned { reason: Some("spam".into()) },
        );
        let session = Arc::new(RecordingSession::default());

        let outcome = timeout(
            Duration::from_secs(5),
            BanMonitor::new(source.clone(), session, fast()).run(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, MonitorOutcome::Banned);
        assert_eq!(source.calls(), 6);
    }

    #[tokio::test]
    async fn test_consecutive_failures_end_as_deleted() {
        let source = ScriptedSource::new(
            vec![Ok(IdentityCheck::Clear), transient(), transient(), transient()],
            IdentityCheck::Clear,
        );
        let session = Arc::new(RecordingSession::default());

        let outcome = timeout(
            Duration::from_secs(5),
            BanMonitor::new(source.clone(), session, fast()).run(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, MonitorOutcome::Deleted);
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test]
    async fn test_push_signal_triggers_early_check() {
        let source = ScriptedSource::new(
            vec![Ok(IdentityCheck::Clear)],
            IdentityCheck::Banned { reason: None },
        );
        let session = Arc::new(RecordingSession::default());
        let (tx, rx) = mpsc::channel(4);

        let options = MonitorOptions {
            interval: Duration::from_secs(3600),
            max_consecutive_failures: 3,
        };
        let monitor = tokio::spawn(
            BanMonitor::new(source.clone(), session, options)
                .with_push(rx)
                .run(),
        );

        tx.send(BanSignal::new("user_1", SignalStatus::Active, None))
            .await
            .unwrap();
        tx.send(BanSignal::new("user_1", SignalStatus::Banned, None))
            .await
            .unwrap();

        let outcome = timeout(Duration::from_secs(5), monitor).await.unwrap().unwrap();
        assert_eq!(outcome, MonitorOutcome::Banned);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_closed_push_channel_falls_back_to_polling() {
        let source = ScriptedSource::new(
            vec![Ok(IdentityCheck::Clear), Ok(IdentityCheck::Clear)],
            IdentityCheck::Gone,
        );
        let session = Arc::new(RecordingSession::default());
        let (tx, rx) = mpsc::channel(1);
        drop(tx);

        let outcome = timeout(
            Duration::from_secs(5),
            BanMonitor::new(source, session, fast()).with_push(rx).run(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, MonitorOutcome::Deleted);
    }
}
