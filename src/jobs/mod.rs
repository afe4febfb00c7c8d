use std::{future::Future, sync::Arc, time::Instant};
use tokio::time::{interval, Duration};
use tracing::{error, info};

use crate::{error::AppResult, metrics};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        // Cleanup tasks
        tokio::spawn(Self::refresh_token_cleanup_job(Arc::clone(&self)));
        tokio::spawn(Self::command_queue_cleanup_job(Arc::clone(&self)));
        tokio::spawn(Self::status_mirror_cleanup_job(Arc::clone(&self)));
        tokio::spawn(Self::rate_limiter_cleanup_job(Arc::clone(&self)));

        // Monitoring tasks
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Time a task and record its outcome
    async fn run<F, T>(job: &'static str, task: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        let start = Instant::now();
        let result = task.await;
        let status = if result.is_ok() { "success" } else { "failure" };
        metrics::record_background_job(job, status, start.elapsed().as_secs_f64());
        result
    }

    /// Prune expired admin refresh tokens (runs every hour)
    async fn refresh_token_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(3600));

        loop {
            interval.tick().await;

            match Self::run("refresh_token_cleanup", tasks::cleanup_expired_refresh_tokens(&scheduler.context)).await {
                Ok(count) if count > 0 => info!("Pruned {} expired refresh tokens", count),
                Ok(_) => {}
                Err(e) => error!("Failed to prune expired refresh tokens: {}", e),
            }
        }
    }

    /// Prune delivered and stale commands (runs every 15 minutes)
    async fn command_queue_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(900));

        loop {
            interval.tick().await;

            match Self::run("command_queue_cleanup", tasks::cleanup_command_queue(&scheduler.context)).await {
                Ok(count) if count > 0 => info!("Pruned {} delivered admin commands", count),
                Ok(_) => {}
                Err(e) => error!("Failed to prune admin commands: {}", e),
            }
        }
    }

    /// Trim old ban mirror rows (runs daily)
    async fn status_mirror_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(86400));

        loop {
            interval.tick().await;
            info!("Running status mirror cleanup");

            match Self::run("status_mirror_cleanup", tasks::cleanup_status_mirror(&scheduler.context)).await {
                Ok(count) => info!("Status mirror cleanup removed {} rows", count),
                Err(e) => error!("Failed to trim status mirror: {}", e),
            }
        }
    }

    /// Forget idle credential rate limit buckets (runs every 10 minutes)
    async fn rate_limiter_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(600));

        loop {
            interval.tick().await;

            match Self::run("rate_limiter_cleanup", tasks::cleanup_rate_limiter(&scheduler.context)).await {
                Ok(tracked) => tracing::debug!(tracked, "credential rate limiter trimmed"),
                Err(e) => error!("Failed to trim rate limiter: {}", e),
            }
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300));

        loop {
            interval.tick().await;

            if let Err(e) = Self::run("health_check", tasks::health_check(&scheduler.context)).await {
                error!("Health check failed: {}", e);
            }
        }
    }
}
