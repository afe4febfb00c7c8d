/// Application context and dependency injection
use crate::{
    admin::{AdminAccountStore, LockoutPolicy, NewAdminAccount, Role},
    auth::{AdminAuthService, TokenIssuer},
    commands::CommandQueue,
    config::ServerConfig,
    db,
    error::{AppError, AppResult},
    identity::{IdentityProvider, LocalIdentityProvider},
    learning::{
        AnalyticsStore, CompanionStore, FeedbackStore, LearningLogStore, ReportStore, SessionStore,
    },
    moderation::{BanService, SignalHub, SqliteStatusMirror, StatusMirror},
    rate_limit::RateLimiter,
    summarizer::RecapGenerator,
};
use chrono::Duration;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    // Admin authentication
    pub admin_accounts: Arc<AdminAccountStore>,
    pub token_issuer: Arc<TokenIssuer>,
    pub admin_auth: Arc<AdminAuthService>,
    // End-user identity
    pub identity: Arc<dyn IdentityProvider>,
    pub local_identity: Arc<LocalIdentityProvider>,
    // Ban propagation
    pub signal_hub: SignalHub,
    pub status_mirror: Arc<dyn StatusMirror>,
    pub ban_service: Arc<BanService>,
    pub command_queue: Arc<CommandQueue>,
    // Learning records
    pub companions: Arc<CompanionStore>,
    pub sessions: Arc<SessionStore>,
    pub feedback: Arc<FeedbackStore>,
    pub learning_logs: Arc<LearningLogStore>,
    pub analytics: Arc<AnalyticsStore>,
    pub reports: Arc<ReportStore>,
    pub recaps: Arc<RecapGenerator>,
    // Rate limiter
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> AppResult<Self> {
        // Validate configuration
        config.validate()?;

        // Create data directories if they don't exist
        Self::ensure_directories(&config).await?;

        let db = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::test_connection(&db).await?;

        Self::from_pool(config, db).await
    }

    /// Build the context on an existing pool, applying migrations
    pub async fn from_pool(config: ServerConfig, db: SqlitePool) -> AppResult<Self> {
        db::run_migrations(&db).await?;

        let auth_config = &config.authentication;
        let lockout = LockoutPolicy {
            max_attempts: auth_config.max_login_attempts,
            lock_duration: Duration::seconds(auth_config.lockout_secs),
        };
        let admin_accounts = Arc::new(AdminAccountStore::new(db.clone(), lockout));
        let token_issuer = Arc::new(TokenIssuer::new(auth_config));
        let admin_auth = Arc::new(AdminAuthService::new(
            admin_accounts.clone(),
            token_issuer.clone(),
        ));

        let local_identity = Arc::new(LocalIdentityProvider::new(db.clone(), &config.identity));
        let identity: Arc<dyn IdentityProvider> = local_identity.clone();

        let signal_hub = SignalHub::new(config.realtime.signal_buffer);
        let status_mirror: Arc<dyn StatusMirror> = Arc::new(SqliteStatusMirror::new(db.clone()));
        let ban_service = Arc::new(BanService::new(
            identity.clone(),
            status_mirror.clone(),
            signal_hub.clone(),
        ));
        let command_queue = Arc::new(CommandQueue::new(db.clone(), config.realtime.command_queue_cap));

        let recaps = Arc::new(RecapGenerator::from_config(&config.summarizer)?);
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        let ctx = Self {
            admin_accounts,
            token_issuer,
            admin_auth,
            identity,
            local_identity,
            signal_hub,
            status_mirror,
            ban_service,
            command_queue,
            companions: Arc::new(CompanionStore::new(db.clone())),
            sessions: Arc::new(SessionStore::new(db.clone())),
            feedback: Arc::new(FeedbackStore::new(db.clone())),
            learning_logs: Arc::new(LearningLogStore::new(db.clone())),
            analytics: Arc::new(AnalyticsStore::new(db.clone())),
            reports: Arc::new(ReportStore::new(db.clone())),
            recaps,
            rate_limiter,
            config: Arc::new(config),
            db,
        };

        ctx.bootstrap_admin().await?;
        Ok(ctx)
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> AppResult<()> {
        let dir = &config.storage.data_directory;
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                AppError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }
        Ok(())
    }

    /// Create the configured super admin when no admin exists yet
    async fn bootstrap_admin(&self) -> AppResult<()> {
        let Some(bootstrap) = &self.config.authentication.bootstrap_admin else {
            return Ok(());
        };

        if self.admin_accounts.count().await? > 0 {
            return Ok(());
        }

        let account = self
            .admin_accounts
            .create(NewAdminAccount {
                email: bootstrap.email.clone(),
                password: bootstrap.password.clone(),
                first_name: "Super".to_string(),
                last_name: "Admin".to_string(),
                role: Role::SuperAdmin,
                permissions: None,
                created_by: None,
            })
            .await?;

        tracing::info!(admin_id = %account.id, "bootstrap super admin created");
        Ok(())
    }

    /// Whether session cookies should carry the `Secure` flag
    pub fn secure_cookies(&self) -> bool {
        self.config.service.is_production()
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        self.config.service.public_url.clone().unwrap_or_else(|| {
            format!(
                "http://{}:{}",
                self.config.service.hostname, self.config.service.port
            )
        })
    }
}
