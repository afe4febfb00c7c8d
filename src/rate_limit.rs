/// Rate Limiting System
///
/// A global per-second limiter for every request and a stricter per-minute
/// limiter, keyed by client address, in front of the admin credential
/// endpoints.
use crate::{
    api::analytics::client_ip,
    config::RateLimitConfig,
    error::{AppError, AppResult},
};
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    DefaultKeyedRateLimiter, NotUntil, Quota, RateLimiter as GovernorLimiter,
};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Paths guarded by the credential limiter
const CREDENTIAL_PATHS: &[&str] = &["/api/admin/auth/login", "/api/admin/auth/refresh"];

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    general: Arc<DirectLimiter>,
    credentials: Arc<DefaultKeyedRateLimiter<IpAddr>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let per_minute = NonZeroU32::new(config.login_requests_per_minute).unwrap_or(NonZeroU32::MIN);

        Self {
            enabled: config.enabled,
            general: Arc::new(GovernorLimiter::direct(Quota::per_second(per_second))),
            credentials: Arc::new(GovernorLimiter::keyed(Quota::per_minute(per_minute))),
        }
    }

    fn exceeded(not_until: NotUntil<<DefaultClock as Clock>::Instant>) -> AppError {
        AppError::RateLimitExceeded {
            retry_after: not_until.wait_time_from(DefaultClock::default().now()),
        }
    }

    /// Check the global limit
    pub fn check_general(&self) -> AppResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.general.check().map_err(Self::exceeded)
    }

    /// Check the admin credential limit for one client
    pub fn check_credentials(&self, client: IpAddr) -> AppResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.credentials.check_key(&client).map_err(Self::exceeded)
    }

    /// Forget clients whose buckets have fully refilled
    pub fn retain_recent(&self) -> usize {
        self.credentials.retain_recent();
        self.credentials.len()
    }
}

/// Proxy headers first, then the socket peer. Unknown clients share one key.
fn client_addr(request: &Request) -> IpAddr {
    client_ip(request.headers())
        .and_then(|ip| ip.parse().ok())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<crate::context::AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    ctx.rate_limiter.check_general()?;

    if CREDENTIAL_PATHS.contains(&request.uri().path()) {
        let client = client_addr(&request);
        ctx.rate_limiter.check_credentials(client).map_err(|e| {
            tracing::warn!(path = %request.uri().path(), %client, "admin credential rate limit hit");
            e
        })?;
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http};

    fn config(enabled: bool) -> RateLimitConfig {
        RateLimitConfig {
            enabled,
            requests_per_second: 5,
            login_requests_per_minute: 3,
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = RateLimiter::new(&config(true));

        // Should allow first request
        assert!(limiter.check_general().is_ok());
        assert!(limiter.check_credentials(ip("10.0.0.1")).is_ok());
    }

    #[test]
    fn test_burst_limit() {
        let limiter = RateLimiter::new(&config(true));

        for _ in 0..3 {
            assert!(limiter.check_credentials(ip("10.0.0.1")).is_ok());
        }

        // Should hit rate limit after burst
        match limiter.check_credentials(ip("10.0.0.1")) {
            Err(AppError::RateLimitExceeded { retry_after }) => {
                assert!(retry_after.as_secs() <= 60);
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
    }

    #[test]
    fn test_credential_buckets_are_per_client() {
        let limiter = RateLimiter::new(&config(true));

        for _ in 0..3 {
            assert!(limiter.check_credentials(ip("10.0.0.66")).is_ok());
        }
        assert!(limiter.check_credentials(ip("10.0.0.66")).is_err());

        assert!(limiter.check_credentials(ip("192.168.1.5")).is_ok());
        assert!(limiter.check_credentials(ip("2001:db8::1")).is_ok());
    }

    #[test]
    fn test_disabled_never_limits() {
        let limiter = RateLimiter::new(&config(false));
        for _ in 0..100 {
            assert!(limiter.check_credentials(ip("10.0.0.1")).is_ok());
        }
    }

    #[test]
    fn test_client_addr_sources() {
        let request = http::Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_addr(&request), ip("203.0.113.7"));

        let mut request = http::Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_addr(&request), IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 9], 4000))));
        assert_eq!(client_addr(&request), ip("127.0.0.9"));

        // Garbage in the header falls back to the socket peer
        request
            .headers_mut()
            .insert("x-forwarded-for", "not-an-ip".parse().unwrap());
        assert_eq!(client_addr(&request), ip("127.0.0.9"));
    }
}
