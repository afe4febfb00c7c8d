/// Converso - backend for an AI-companion learning platform
///
/// Admin panel authentication with rotating refresh tokens, ban propagation
/// from the identity provider to live client sessions, a durable admin
/// command queue, and the learning records (companions, sessions, recaps,
/// feedback, learning logs, analytics) the app stores per user.

pub mod admin;
pub mod api;
pub mod auth;
pub mod commands;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod identity;
pub mod jobs;
pub mod learning;
pub mod metrics;
pub mod moderation;
pub mod monitor;
pub mod pagination;
pub mod rate_limit;
pub mod realtime;
pub mod server;
pub mod summarizer;

pub use context::AppContext;
pub use error::{AppError, AppResult};
