//! Backend credential pair
//!
//! The login/secret pair is the only unit of backend identity. It is never
//! persisted; it travels inside request extensions, session handlers and
//! token records only.

use base64::{engine::general_purpose::STANDARD, Engine};
use std::fmt;
use zeroize::Zeroizing;

/// Login/secret used as HTTP Basic credentials against the backend
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub login: String,
    pub secret: Zeroizing<String>,
}

impl CredentialPair {
    pub fn new(login: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            secret: Zeroizing::new(secret.into()),
        }
    }

    pub fn secret(&self) -> &str {
        self.secret.as_str()
    }

    /// Encode as the directly-decodable bearer value: `base64(login:secret)`
    pub fn to_bearer_value(&self) -> String {
        let raw = Zeroizing::new(format!("{}:{}", self.login, self.secret()));
        STANDARD.encode(raw.as_bytes())
    }

    /// Decode a directly-decodable bearer value.
    ///
    /// Returns `None` for anything that is not base64 of `login:secret` with a
    /// non-empty login. Malformed values are indistinguishable from absent ones.
    pub fn from_bearer_value(value: &str) -> Option<Self> {
        let bytes = Zeroizing::new(STANDARD.decode(value.trim()).ok()?);
        let text = std::str::from_utf8(&bytes).ok()?;
        let (login, secret) = text.split_once(':')?;
        if login.is_empty() {
            return None;
        }
        Some(Self::new(login, secret))
    }

    /// Short login for log lines
    pub fn short_login(&self) -> &str {
        let end = self
            .login
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.login.len());
        &self.login[..end]
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("login", &self.login)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
