/// Admin session cookies
use crate::auth::tokens::TokenPair;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Duration;

pub const ACCESS_COOKIE: &str = "admin_token";
pub const REFRESH_COOKIE: &str = "admin_refresh_token";

fn session_cookie(name: &'static str, value: String, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

/// Add both session cookies for a freshly minted pair
pub fn set_session_cookies(
    jar: CookieJar,
    pair: &TokenPair,
    access_ttl: Duration,
    refresh_ttl: Duration,
    secure: bool,
) -> CookieJar {
    jar.add(session_cookie(
        ACCESS_COOKIE,
        pair.access_token.clone(),
        access_ttl.num_seconds(),
        secure,
    ))
    .add(session_cookie(
        REFRESH_COOKIE,
        pair.refresh_token.clone(),
        refresh_ttl.num_seconds(),
        secure,
    ))
}

/// Overwrite both session cookies with empty, immediately expiring values
pub fn clear_session_cookies(jar: CookieJar, secure: bool) -> CookieJar {
    jar.add(session_cookie(ACCESS_COOKIE, String::new(), 0, secure))
        .add(session_cookie(REFRESH_COOKIE, String::new(), 0, secure))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn pair() -> TokenPair {
        let now = Utc::now();
        TokenPair {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            access_expires_at: now + Duration::minutes(15),
            refresh_expires_at: now + Duration::days(7),
        }
    }

    #[test]
    fn test_session_cookie_flags() {
        let jar = set_session_cookies(
            CookieJar::new(),
            &pair(),
            Duration::minutes(15),
            Duration::days(7),
            true,
        );

        let access = jar.get(ACCESS_COOKIE).unwrap();
        assert_eq!(access.value(), "access");
        assert_eq!(access.http_only(), Some(true));
        assert_eq!(access.secure(), Some(true));
        assert_eq!(access.same_site(), Some(SameSite::Strict));
        assert_eq!(access.path(), Some("/"));
        assert_eq!(access.max_age(), Some(time::Duration::seconds(900)));

        let refresh = jar.get(REFRESH_COOKIE).unwrap();
        assert_eq!(refresh.max_age(), Some(time::Duration::seconds(604_800)));
    }

    #[test]
    fn test_clear_sets_empty_values_with_zero_max_age() {
        let jar = clear_session_cookies(CookieJar::new(), false);
        for name in [ACCESS_COOKIE, REFRESH_COOKIE] {
            let cookie = jar.get(name).unwrap();
            assert_eq!(cookie.value(), "");
            assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
            assert_eq!(cookie.secure(), Some(false));
        }
    }
}
