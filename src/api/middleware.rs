/// Ban enforcement middleware
use crate::{
    auth::{extract_token, USER_SESSION_COOKIE},
    context::AppContext,
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

pub const BANNED_PATH: &str = "/banned";
const SIGNED_IN_HOME: &str = "/app";

fn is_banned_page(path: &str) -> bool {
    path == BANNED_PATH || path.starts_with("/banned/")
}

fn is_auth_page(path: &str) -> bool {
    path.starts_with("/sign-in") || path.starts_with("/sign-up")
}

/// Redirect banned users to the banned page on every other path.
///
/// Reads ban state from the identity provider on each request carrying a
/// session token. Requests without a token, or whose lookup fails, pass
/// through; the route's own extractor decides what to do with them. The
/// resolved user is stored in request extensions for that extractor.
pub async fn enforce_ban(
    State(ctx): State<AppContext>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_token(req.headers(), USER_SESSION_COOKIE) else {
        return next.run(req).await;
    };

    let user = match ctx.identity.authenticate(&token).await {
        Ok(user) => user,
        Err(e) => {
            tracing::debug!(error = %e, "session lookup failed, continuing unauthenticated");
            return next.run(req).await;
        }
    };

    let path = req.uri().path();

    if user.is_banned() {
        if is_banned_page(path) {
            req.extensions_mut().insert(user);
            return next.run(req).await;
        }
        tracing::info!(user_id = %user.id, path, "banned user redirected");
        return Redirect::temporary(BANNED_PATH).into_response();
    }

    if is_auth_page(path) {
        return Redirect::temporary(SIGNED_IN_HOME).into_response();
    }

    req.extensions_mut().insert(user);
    next.run(req).await
}
