/// API routes and handlers
pub mod admin;
pub mod admin_auth;
pub mod admin_realtime;
pub mod analytics;
pub mod companions;
pub mod feedback;
pub mod health;
pub mod learning_logs;
pub mod me;
pub mod middleware;
pub mod sessions;

use crate::context::AppContext;
use axum::Router;
use serde::Serialize;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(admin_auth::routes())
        .merge(admin::routes())
        .merge(admin_realtime::routes())
        .merge(me::routes())
        .merge(companions::routes())
        .merge(sessions::routes())
        .merge(feedback::routes())
        .merge(learning_logs::routes())
        .merge(analytics::routes())
}

/// `{success, message}` acknowledgement body
#[derive(Debug, Serialize)]
pub struct Ack {
    pub success: bool,
    pub message: String,
}

impl Ack {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}
