/// Configuration management for the Converso backend
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub identity: IdentityConfig,
    pub realtime: RealtimeConfig,
    pub summarizer: SummarizerConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
    /// `production` switches cookies to `Secure`
    pub environment: String,
    pub public_url: Option<String>,
}

impl ServiceConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
}

/// Admin authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    /// Consecutive failed logins before the account locks; 0 disables lockout
    pub max_login_attempts: u32,
    pub lockout_secs: i64,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

/// Super admin created on first start when no admin exists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

/// End-user identity provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Shared HS256 secret used by the sign-in front end to mint session tokens
    pub session_secret: String,
    pub session_issuer: Option<String>,
}

/// Event stream and command queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    pub heartbeat_secs: u64,
    pub command_queue_cap: i64,
    pub signal_buffer: usize,
}

/// Session recap summarizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    pub gemini_api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub timeout_secs: u64,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: u32,
    pub login_requests_per_minute: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("CONVERSO_HOSTNAME").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("CONVERSO_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| AppError::Validation("Invalid port number".to_string()))?;
        let version = env::var("CONVERSO_VERSION")
            .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());
        let environment =
            env::var("CONVERSO_ENV").unwrap_or_else(|_| "development".to_string());
        let public_url = env::var("CONVERSO_PUBLIC_URL").ok();

        let data_directory: PathBuf = env::var("CONVERSO_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("CONVERSO_DATABASE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("converso.sqlite"));

        let access_secret = env::var("JWT_ACCESS_SECRET")
            .map_err(|_| AppError::Validation("JWT access secret required".to_string()))?;
        let refresh_secret = env::var("JWT_REFRESH_SECRET")
            .map_err(|_| AppError::Validation("JWT refresh secret required".to_string()))?;

        let bootstrap_admin = match (
            env::var("CONVERSO_BOOTSTRAP_ADMIN_EMAIL"),
            env::var("CONVERSO_BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Ok(email), Ok(password)) => Some(BootstrapAdmin { email, password }),
            _ => None,
        };

        let session_secret = env::var("IDENTITY_SESSION_SECRET")
            .map_err(|_| AppError::Validation("Identity session secret required".to_string()))?;

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
                environment,
                public_url,
            },
            storage: StorageConfig {
                data_directory,
                database,
            },
            authentication: AuthConfig {
                access_secret,
                refresh_secret,
                issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "converso-admin".to_string()),
                audience: env::var("JWT_AUDIENCE").unwrap_or_else(|_| "admin-panel".to_string()),
                access_token_ttl_secs: env_or("CONVERSO_ACCESS_TOKEN_TTL_SECS", 900),
                refresh_token_ttl_secs: env_or("CONVERSO_REFRESH_TOKEN_TTL_SECS", 604_800),
                max_login_attempts: env_or("CONVERSO_MAX_LOGIN_ATTEMPTS", 5),
                lockout_secs: env_or("CONVERSO_LOCKOUT_SECS", 7200),
                bootstrap_admin,
            },
            identity: IdentityConfig {
                session_secret,
                session_issuer: env::var("IDENTITY_SESSION_ISSUER").ok(),
            },
            realtime: RealtimeConfig {
                heartbeat_secs: env_or("CONVERSO_HEARTBEAT_SECS", 30),
                command_queue_cap: env_or("CONVERSO_COMMAND_QUEUE_CAP", 50),
                signal_buffer: env_or("CONVERSO_SIGNAL_BUFFER", 256),
            },
            summarizer: SummarizerConfig {
                gemini_api_key: env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()),
                model: env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".to_string()),
                endpoint: env::var("GEMINI_ENDPOINT").unwrap_or_else(|_| {
                    "https://generativelanguage.googleapis.com/v1beta".to_string()
                }),
                timeout_secs: env_or("GEMINI_TIMEOUT_SECS", 30),
            },
            rate_limit: RateLimitConfig {
                enabled: env_or("CONVERSO_RATE_LIMITS_ENABLED", true),
                requests_per_second: env_or("CONVERSO_RATE_LIMIT_RPS", 100),
                login_requests_per_minute: env_or("CONVERSO_LOGIN_RATE_LIMIT_PER_MINUTE", 20),
            },
            logging: LoggingConfig {
                level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.service.hostname.is_empty() {
            return Err(AppError::Validation("Hostname cannot be empty".to_string()));
        }

        let auth = &self.authentication;
        if auth.access_secret.len() < 32 || auth.refresh_secret.len() < 32 {
            return Err(AppError::Validation(
                "JWT secrets must be at least 32 characters".to_string(),
            ));
        }
        if auth.access_secret == auth.refresh_secret {
            return Err(AppError::Validation(
                "Access and refresh secrets must differ".to_string(),
            ));
        }
        if auth.access_token_ttl_secs <= 0 || auth.refresh_token_ttl_secs <= auth.access_token_ttl_secs {
            return Err(AppError::Validation(
                "Refresh token TTL must exceed a positive access token TTL".to_string(),
            ));
        }

        if self.identity.session_secret.len() < 32 {
            return Err(AppError::Validation(
                "Identity session secret must be at least 32 characters".to_string(),
            ));
        }

        if self.realtime.heartbeat_secs == 0 || self.realtime.command_queue_cap <= 0 {
            return Err(AppError::Validation(
                "Heartbeat interval and command queue cap must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Configuration suitable for tests: in-memory friendly, lockout enabled,
    /// summarizer disabled.
    pub fn for_tests() -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "127.0.0.1".to_string(),
                port: 0,
                version: "test".to_string(),
                environment: "test".to_string(),
                public_url: None,
            },
            storage: StorageConfig {
                data_directory: PathBuf::from("./data"),
                database: PathBuf::from(":memory:"),
            },
            authentication: AuthConfig {
                access_secret: "test-access-secret-0123456789abcdef".to_string(),
                refresh_secret: "test-refresh-secret-0123456789abcdef".to_string(),
                issuer: "converso-admin".to_string(),
                audience: "admin-panel".to_string(),
                access_token_ttl_secs: 900,
                refresh_token_ttl_secs: 604_800,
                max_login_attempts: 5,
                lockout_secs: 7200,
                bootstrap_admin: None,
            },
            identity: IdentityConfig {
                session_secret: "test-identity-secret-0123456789abcdef".to_string(),
                session_issuer: None,
            },
            realtime: RealtimeConfig {
                heartbeat_secs: 30,
                command_queue_cap: 50,
                signal_buffer: 64,
            },
            summarizer: SummarizerConfig {
                gemini_api_key: None,
                model: "gemini-1.5-flash".to_string(),
                endpoint: "http://127.0.0.1:9".to_string(),
                timeout_secs: 1,
            },
            rate_limit: RateLimitConfig {
                enabled: false,
                requests_per_second: 100,
                login_requests_per_minute: 20,
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
            },
        }
    }
}
