/// Background task implementations
use crate::{context::AppContext, db, error::AppResult};
use chrono::{Duration, Utc};

/// Broadcast commands older than this are dropped once every consumer has
/// had a chance to poll them
pub const BROADCAST_RETENTION_DAYS: i64 = 7;

/// Ban mirror rows are kept this long
pub const STATUS_MIRROR_RETENTION_DAYS: i64 = 30;

/// Delete every expired admin refresh token
pub async fn cleanup_expired_refresh_tokens(ctx: &AppContext) -> AppResult<u64> {
    ctx.admin_accounts
        .prune_expired_refresh_tokens(Utc::now())
        .await
}

/// Drop acknowledged direct commands and stale broadcasts
pub async fn cleanup_command_queue(ctx: &AppContext) -> AppResult<u64> {
    let cutoff = Utc::now() - Duration::days(BROADCAST_RETENTION_DAYS);
    ctx.command_queue.prune(cutoff).await
}

/// Trim ban mirror rows past retention
pub async fn cleanup_status_mirror(ctx: &AppContext) -> AppResult<u64> {
    let cutoff = Utc::now() - Duration::days(STATUS_MIRROR_RETENTION_DAYS);
    ctx.status_mirror.prune_older_than(cutoff).await
}

/// Drop credential rate limit state for clients that have gone quiet,
/// returning how many are still tracked
pub async fn cleanup_rate_limiter(ctx: &AppContext) -> AppResult<usize> {
    Ok(ctx.rate_limiter.retain_recent())
}

/// Health check - verify the database answers
pub async fn health_check(ctx: &AppContext) -> AppResult<()> {
    db::test_connection(&ctx.db).await
}
