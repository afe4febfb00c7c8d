/// Admin access/refresh token issuer and verifier
use crate::{
    admin::{AdminAccount, Permission, Role},
    config::AuthConfig,
    error::{AppError, AppResult},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Token kind carried in the `type` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims embedded in admin tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminClaims {
    pub admin_id: String,
    pub email: String,
    pub role: Role,
    /// Present on access tokens only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<Permission>>,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// A freshly minted access/refresh pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

impl TokenPair {
    /// Seconds until the access token expires, measured from `now`
    pub fn expires_in(&self, now: DateTime<Utc>) -> i64 {
        (self.access_expires_at - now).num_seconds().max(0)
    }
}

/// Issues and verifies admin tokens.
///
/// Access and refresh tokens are signed with different secrets and carry a
/// `type` claim, so one kind can never pass as the other.
#[derive(Clone)]
pub struct TokenIssuer {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_ttl: Duration::seconds(config.access_token_ttl_secs),
            refresh_ttl: Duration::seconds(config.refresh_token_ttl_secs),
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Mint an access/refresh pair for an account
    pub fn issue_pair(&self, account: &AdminAccount) -> AppResult<TokenPair> {
        self.issue_pair_at(account, Utc::now())
    }

    /// Mint a pair as if issued at `now`
    pub fn issue_pair_at(&self, account: &AdminAccount, now: DateTime<Utc>) -> AppResult<TokenPair> {
        let access_expires_at = now + self.access_ttl;
        let refresh_expires_at = now + self.refresh_ttl;

        let access = self.claims(account, TokenType::Access, now, access_expires_at);
        let refresh = self.claims(account, TokenType::Refresh, now, refresh_expires_at);

        let header = Header::new(Algorithm::HS256);
        let access_token = encode(&header, &access, &self.access_encoding)
            .map_err(|e| AppError::Internal(format!("Failed to sign access token: {}", e)))?;
        let refresh_token = encode(&header, &refresh, &self.refresh_encoding)
            .map_err(|e| AppError::Internal(format!("Failed to sign refresh token: {}", e)))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Verify an access token's signature, expiry, issuer, audience and type
    pub fn verify_access(&self, token: &str) -> AppResult<AdminClaims> {
        self.verify(token, &self.access_decoding, TokenType::Access)
    }

    /// Verify a refresh token statelessly. Callers must also check that the
    /// token is still outstanding in the credential store.
    pub fn verify_refresh(&self, token: &str) -> AppResult<AdminClaims> {
        self.verify(token, &self.refresh_decoding, TokenType::Refresh)
    }

    fn claims(
        &self,
        account: &AdminAccount,
        token_type: TokenType,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AdminClaims {
        AdminClaims {
            admin_id: account.id.clone(),
            email: account.email.clone(),
            role: account.role,
            permissions: match token_type {
                TokenType::Access => Some(account.permissions.clone()),
                TokenType::Refresh => None,
            },
            token_type,
            jti: Uuid::new_v4().to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        }
    }

    fn verify(&self, token: &str, key: &DecodingKey, expected: TokenType) -> AppResult<AdminClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        let data = decode::<AdminClaims>(token, key, &validation).map_err(|e| {
            tracing::debug!(error = %e, kind = ?expected, "admin token rejected");
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AppError::Authentication("Token has expired".to_string())
                }
                _ => AppError::Authentication("Invalid token".to_string()),
            }
        })?;

        if data.claims.token_type != expected {
            return Err(AppError::Authentication("Wrong token type".to_string()));
        }

        Ok(data.claims)
    }
}
