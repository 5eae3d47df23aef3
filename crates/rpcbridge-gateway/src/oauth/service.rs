//! OAuth2 grant logic
//!
//! Every flow that accepts a credential pair validates it against the backend
//! health endpoint before touching the [`TokenStore`]. A rejected pair never
//! produces a record.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rpcbridge_core::{BridgeConfig, CredentialPair};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::error::OAuthError;
use super::pkce::{self, ChallengeMethod};
use super::store::{AccessTokenRecord, AuthorizationCodeRecord, RefreshTokenRecord, TokenStore};
use crate::backend::{BackendClient, BackendSettings};

/// Decides whether a credential pair is accepted by the backend
#[async_trait]
pub trait CredentialValidator: Send + Sync {
    async fn validate(&self, credentials: &CredentialPair) -> bool;
}

/// Validates by calling the backend health endpoint with the pair
pub struct BackendCredentialValidator {
    settings: BackendSettings,
}

impl BackendCredentialValidator {
    pub fn new(settings: BackendSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl CredentialValidator for BackendCredentialValidator {
    async fn validate(&self, credentials: &CredentialPair) -> bool {
        let client = match BackendClient::new(&self.settings, credentials.clone()) {
            Ok(client) => client,
            Err(e) => {
                warn!("[OAuth] Could not build backend client for validation: {}", e);
                return false;
            }
        };
        let healthy = client.health().await;
        client.close();
        healthy
    }
}

/// Lifetimes of the three record kinds
#[derive(Debug, Clone, Copy)]
pub struct TokenTtls {
    pub code: Duration,
    pub access: Duration,
    pub refresh: Duration,
}

impl TokenTtls {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            code: config.code_ttl(),
            access: config.access_ttl(),
            refresh: config.refresh_ttl(),
        }
    }
}

impl Default for TokenTtls {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}

/// Access/refresh pair handed back by `/token`
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub scope: Option<String>,
}

/// A validated-shape `/authorize` submission
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub credentials: CredentialPair,
    pub client_id: Option<String>,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub code_challenge_method: Option<String>,
    pub scope: Option<String>,
}

pub struct OAuthService {
    store: Arc<TokenStore>,
    validator: Arc<dyn CredentialValidator>,
    ttls: TokenTtls,
}

impl OAuthService {
    pub fn new(store: Arc<TokenStore>, validator: Arc<dyn CredentialValidator>, ttls: TokenTtls) -> Self {
        Self {
            store,
            validator,
            ttls,
        }
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    pub fn ttls(&self) -> TokenTtls {
        self.ttls
    }

    /// Resource-owner password grant
    pub async fn password_grant(
        &self,
        credentials: CredentialPair,
        scope: Option<String>,
    ) -> Result<IssuedTokens, OAuthError> {
        if credentials.login.is_empty() {
            return Err(OAuthError::InvalidRequest("username is required".into()));
        }
        if !self.validator.validate(&credentials).await {
            info!(login = %credentials.short_login(), "[OAuth] Password grant rejected");
            return Err(OAuthError::InvalidCredentials);
        }

        info!(login = %credentials.short_login(), "[OAuth] Password grant accepted");
        self.issue(credentials, scope, 0)
    }

    /// Validate an `/authorize` submission and mint a code
    pub async fn authorize(&self, request: AuthorizeRequest) -> Result<String, OAuthError> {
        let method = ChallengeMethod::parse(request.code_challenge_method.as_deref()).ok_or_else(|| {
            OAuthError::InvalidRequest("code_challenge_method must be S256".into())
        })?;
        if request.code_challenge.is_empty() {
            return Err(OAuthError::InvalidRequest("code_challenge is required".into()));
        }
        if request.redirect_uri.is_empty() {
            return Err(OAuthError::InvalidRequest("redirect_uri is required".into()));
        }

        if !self.validator.validate(&request.credentials).await {
            info!(login = %request.credentials.short_login(), "[OAuth] Authorize rejected");
            return Err(OAuthError::InvalidCredentials);
        }

        let expires_at = expiry(Utc::now(), self.ttls.code)?;
        let login = request.credentials.short_login().to_string();
        let code = self.store.insert_code(AuthorizationCodeRecord {
            credentials: request.credentials,
            client_id: request.client_id,
            redirect_uri: request.redirect_uri,
            code_challenge: request.code_challenge,
            code_challenge_method: method,
            scope: request.scope,
            expires_at,
        });

        info!(login = %login, "[OAuth] Authorization code issued");
        Ok(code)
    }

    /// `authorization_code` grant.
    ///
    /// The code is consumed before any check runs, so a failed exchange
    /// still burns it.
    pub fn exchange_code(
        &self,
        code: &str,
        redirect_uri: Option<&str>,
        code_verifier: Option<&str>,
        client_id: Option<&str>,
    ) -> Result<IssuedTokens, OAuthError> {
        let record = self.store.take_code(code).ok_or_else(|| {
            debug!("[OAuth] Unknown, expired or reused authorization code");
            OAuthError::invalid_grant()
        })?;

        if redirect_uri != Some(record.redirect_uri.as_str()) {
            warn!("[OAuth] redirect_uri mismatch on code exchange");
            return Err(OAuthError::invalid_grant());
        }

        if let (Some(expected), Some(given)) = (record.client_id.as_deref(), client_id) {
            if expected != given {
                warn!("[OAuth] client_id mismatch on code exchange");
                return Err(OAuthError::invalid_grant());
            }
        }

        let verifier = code_verifier.unwrap_or_default();
        if !pkce::verify(verifier, &record.code_challenge, record.code_challenge_method) {
            warn!("[OAuth] PKCE verification failed");
            return Err(OAuthError::invalid_grant());
        }

        info!(login = %record.credentials.short_login(), "[OAuth] Code exchanged");
        self.issue(record.credentials, record.scope, 0)
    }

    /// `refresh_token` grant with mandatory rotation
    pub fn refresh(&self, refresh_token: &str) -> Result<IssuedTokens, OAuthError> {
        let record = self.store.take_refresh_token(refresh_token).ok_or_else(|| {
            debug!("[OAuth] Unknown, expired or reused refresh token");
            OAuthError::invalid_grant()
        })?;

        let rotation = record.rotation_counter.saturating_add(1);
        info!(
            login = %record.credentials.short_login(),
            rotation,
            "[OAuth] Refresh token rotated"
        );
        self.issue(record.credentials, record.scope, rotation)
    }

    /// Resolve an access token to its credential pair
    pub fn validate_access_token(&self, token: &str) -> Option<CredentialPair> {
        self.store.access_token(token).map(|record| record.credentials)
    }

    fn issue(
        &self,
        credentials: CredentialPair,
        scope: Option<String>,
        rotation_counter: u32,
    ) -> Result<IssuedTokens, OAuthError> {
        let now = Utc::now();
        let access_expires_at = expiry(now, self.ttls.access)?;
        let refresh_expires_at = expiry(now, self.ttls.refresh)?;

        let access_token = self.store.insert_access_token(AccessTokenRecord {
            credentials: credentials.clone(),
            scope: scope.clone(),
            expires_at: access_expires_at,
        });
        let refresh_token = self.store.insert_refresh_token(RefreshTokenRecord {
            credentials,
            scope: scope.clone(),
            expires_at: refresh_expires_at,
            rotation_counter,
        });

        Ok(IssuedTokens {
            access_token,
            refresh_token,
            expires_in: self.ttls.access.num_seconds(),
            scope,
        })
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, OAuthError> {
    now.checked_add_signed(ttl).ok_or_else(|| {
        warn!("[OAuth] Configured TTL overflows the clock");
        OAuthError::ServerError("token lifetime out of range".into())
    })
}
