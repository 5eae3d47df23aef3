//! In-memory token store
//!
//! Three tables (authorization codes, access tokens, refresh tokens) behind a
//! single mutex. The lock is never held across an `.await`. Single-use records
//! are only ever read through `take_*`, which removes them under the same lock
//! acquisition, so two concurrent exchanges of one value cannot both succeed.
//!
//! Nothing here survives a restart.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use rpcbridge_core::CredentialPair;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::pkce::ChallengeMethod;

/// Issued by `/authorize`, consumed once by `/token`
#[derive(Debug, Clone)]
pub struct AuthorizationCodeRecord {
    pub credentials: CredentialPair,
    pub client_id: Option<String>,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub code_challenge_method: ChallengeMethod,
    pub scope: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AccessTokenRecord {
    pub credentials: CredentialPair,
    pub scope: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub credentials: CredentialPair,
    pub scope: Option<String>,
    pub expires_at: DateTime<Utc>,
    /// Number of rotations that led to this token
    pub rotation_counter: u32,
}

trait Expiring {
    fn expires_at(&self) -> DateTime<Utc>;

    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at()
    }
}

impl Expiring for AuthorizationCodeRecord {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

impl Expiring for AccessTokenRecord {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

impl Expiring for RefreshTokenRecord {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// Record counts per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub codes: usize,
    pub access_tokens: usize,
    pub refresh_tokens: usize,
}

impl StoreCounts {
    pub fn total(&self) -> usize {
        self.codes + self.access_tokens + self.refresh_tokens
    }
}

#[derive(Default)]
struct Tables {
    codes: HashMap<String, AuthorizationCodeRecord>,
    access_tokens: HashMap<String, AccessTokenRecord>,
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
}

/// Opaque 256-bit random token, base64url without padding
pub fn generate_token() -> String {
    let random_bytes: [u8; 32] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Process-wide token store
#[derive(Default)]
pub struct TokenStore {
    tables: Mutex<Tables>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an authorization code record and return the code
    pub fn insert_code(&self, record: AuthorizationCodeRecord) -> String {
        let code = generate_token();
        self.tables.lock().codes.insert(code.clone(), record);
        code
    }

    /// Remove and return a code record.
    ///
    /// The record is removed whether or not it is still live; an expired code
    /// yields `None` exactly like an unknown one.
    pub fn take_code(&self, code: &str) -> Option<AuthorizationCodeRecord> {
        let record = self.tables.lock().codes.remove(code)?;
        record.is_live(Utc::now()).then_some(record)
    }

    pub fn insert_access_token(&self, record: AccessTokenRecord) -> String {
        let token = generate_token();
        self.tables.lock().access_tokens.insert(token.clone(), record);
        token
    }

    /// Look up a live access token (reads do not consume it)
    pub fn access_token(&self, token: &str) -> Option<AccessTokenRecord> {
        let tables = self.tables.lock();
        tables
            .access_tokens
            .get(token)
            .filter(|record| record.is_live(Utc::now()))
            .cloned()
    }

    pub fn insert_refresh_token(&self, record: RefreshTokenRecord) -> String {
        let token = generate_token();
        self.tables.lock().refresh_tokens.insert(token.clone(), record);
        token
    }

    #[cfg(test)]
    pub(crate) fn peek_refresh_token(&self, token: &str) -> Option<RefreshTokenRecord> {
        self.tables.lock().refresh_tokens.get(token).cloned()
    }

    /// Remove and return a refresh token record; expired behaves as unknown
    pub fn take_refresh_token(&self, token: &str) -> Option<RefreshTokenRecord> {
        let record = self.tables.lock().refresh_tokens.remove(token)?;
        record.is_live(Utc::now()).then_some(record)
    }

    /// Drop every record past its expiry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut tables = self.tables.lock();
        let before = tables.codes.len() + tables.access_tokens.len() + tables.refresh_tokens.len();

        tables.codes.retain(|_, r| r.is_live(now));
        tables.access_tokens.retain(|_, r| r.is_live(now));
        tables.refresh_tokens.retain(|_, r| r.is_live(now));

        let after = tables.codes.len() + tables.access_tokens.len() + tables.refresh_tokens.len();
        before - after
    }

    pub fn counts(&self) -> StoreCounts {
        let tables = self.tables.lock();
        StoreCounts {
            codes: tables.codes.len(),
            access_tokens: tables.access_tokens.len(),
            refresh_tokens: tables.refresh_tokens.len(),
        }
    }

    /// Run [`sweep`](Self::sweep) every `period` until `shutdown` fires or the
    /// store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let Some(store) = store.upgrade() else {
                    break;
                };
                let removed = store.sweep();
                if removed > 0 {
                    debug!(removed, remaining = store.counts().total(), "[TokenStore] Swept expired records");
                }
            }

            info!("[TokenStore] Sweeper stopped");
        })
    }
}
