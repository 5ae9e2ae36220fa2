use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Principal, RevokedToken, Role, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub email: String,
    pub name: String,
    pub provider: String,
    pub roles: Vec<Role>,
    pub typ: TokenType,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub jti: String,
    pub typ: TokenType,
    pub iat: i64,
    pub exp: i64,
}

impl RefreshClaims {
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

/// Issues, validates, rotates and revokes HS256 session tokens.
pub struct TokenService {
    store: Arc<dyn Store>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    revoke_on_rotate: bool,
}

impl TokenService {
    pub fn new(config: &AuthConfig, store: Arc<dyn Store>) -> Result<Self> {
        if config.jwt_secret.is_empty() {
            return Err(Error::Config("jwt secret cannot be empty".into()));
        }
        if config.access_ttl_secs == 0 || config.access_ttl_secs >= config.refresh_ttl_secs {
            return Err(Error::Config(
                "access token lifetime must be positive and shorter than the refresh lifetime"
                    .into(),
            ));
        }

        Ok(Self {
            store,
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_ttl: config.access_ttl(),
            refresh_ttl: config.refresh_ttl(),
            revoke_on_rotate: config.revoke_on_rotate,
        })
    }

    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    fn validation(validate_exp: bool) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = validate_exp;
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation
    }

    /// Mints an access/refresh pair for `principal` without touching the store.
    pub fn issue_pair(&self, principal: &Principal) -> Result<TokenPair> {
        let now = Utc::now().timestamp();
        let header = Header::new(Algorithm::HS256);

        let access = AccessClaims {
            sub: principal.user_id.clone(),
            email: principal.email.clone(),
            name: principal.name.clone(),
            provider: principal.provider.clone(),
            roles: principal.roles.clone(),
            typ: TokenType::Access,
            iat: now,
            exp: now + self.access_ttl.as_secs() as i64,
        };

        let refresh = RefreshClaims {
            sub: principal.user_id.clone(),
            jti: Uuid::new_v4().to_string(),
            typ: TokenType::Refresh,
            iat: now,
            exp: now + self.refresh_ttl.as_secs() as i64,
        };

        let access_token = encode(&header, &access, &self.encoding)
            .map_err(|e| Error::Internal(format!("failed to sign access token: {e}")))?;
        let refresh_token = encode(&header, &refresh, &self.encoding)
            .map_err(|e| Error::Internal(format!("failed to sign refresh token: {e}")))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer",
            expires_in: self.access_ttl.as_secs(),
        })
    }

    /// Issues a pair for `user` and records the refresh token as the user's current one.
    pub fn issue_for(&self, user: &User) -> Result<TokenPair> {
        let pair = self.issue_pair(&Principal::from(user))?;
        self.store.set_refresh_token(&user.id, &pair.refresh_token)?;
        Ok(pair)
    }

    pub fn validate_access(&self, token: &str) -> Result<Principal> {
        let data = decode::<AccessClaims>(token, &self.decoding, &Self::validation(true))
            .map_err(|e| {
                tracing::debug!(reason = %e, "rejected access token");
                Error::Unauthorized
            })?;

        let claims = data.claims;
        if claims.typ != TokenType::Access {
            tracing::debug!("rejected access token: wrong token type");
            return Err(Error::Unauthorized);
        }

        Ok(Principal {
            user_id: claims.sub,
            email: claims.email,
            name: claims.name,
            provider: claims.provider,
            roles: claims.roles,
        })
    }

    pub fn validate_refresh(&self, token: &str) -> Result<RefreshClaims> {
        let claims = self.decode_refresh(token, true)?;

        if self.store.is_token_revoked(&claims.jti)? {
            tracing::warn!(
                security = true,
                user_id = %claims.sub,
                "revoked refresh token presented"
            );
            return Err(Error::Unauthorized);
        }

        Ok(claims)
    }

    fn decode_refresh(&self, token: &str, validate_exp: bool) -> Result<RefreshClaims> {
        let data = decode::<RefreshClaims>(token, &self.decoding, &Self::validation(validate_exp))
            .map_err(|e| {
                tracing::debug!(reason = %e, "rejected refresh token");
                Error::Unauthorized
            })?;

        if data.claims.typ != TokenType::Refresh {
            tracing::debug!("rejected refresh token: wrong token type");
            return Err(Error::Unauthorized);
        }

        Ok(data.claims)
    }

    /// Exchanges a valid refresh token for a new pair for the same user.
    pub fn rotate(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = self.validate_refresh(refresh_token)?;

        let user = self.store.get_user(&claims.sub)?.ok_or_else(|| {
            tracing::debug!(user_id = %claims.sub, "refresh token for unknown user");
            Error::Unauthorized
        })?;

        if !user.is_active {
            tracing::debug!(user_id = %user.id, "refresh token for deactivated user");
            return Err(Error::Unauthorized);
        }

        // A concurrent rotation of the same token loses the insert race.
        if self.revoke_on_rotate && !self.revoke_claims(&claims)? {
            tracing::warn!(security = true, user_id = %user.id, "refresh token rotated twice");
            return Err(Error::Unauthorized);
        }

        self.issue_for(&user)
    }

    /// Revokes a refresh token belonging to `user_id`. Idempotent; expired
    /// tokens need no revocation and are accepted silently.
    pub fn revoke(&self, user_id: &str, refresh_token: &str) -> Result<()> {
        let claims = self.decode_refresh(refresh_token, false)?;

        if claims.sub != user_id {
            tracing::debug!(user_id = %user_id, "refusing to revoke another user's token");
            return Err(Error::Unauthorized);
        }

        if claims.expires_at() <= Utc::now() {
            return Ok(());
        }

        self.revoke_claims(&claims)?;
        Ok(())
    }

    fn revoke_claims(&self, claims: &RefreshClaims) -> Result<bool> {
        self.store.revoke_token(&RevokedToken {
            token_id: claims.jti.clone(),
            user_id: claims.sub.clone(),
            expires_at: claims.expires_at(),
            revoked_at: Utc::now(),
        })
    }

    /// Drops revocation records whose tokens have expired on their own.
    pub fn sweep_expired_revocations(&self) -> Result<usize> {
        let swept = self.store.sweep_revoked_tokens(Utc::now())?;
        if swept > 0 {
            tracing::debug!(swept, "swept expired token revocations");
        }
        Ok(swept)
    }
}
