//! Bearer tokens for remote destinations.
//!
//! The exchange of service-account credentials for a token happens outside
//! this crate. [`Authenticator`] is the seam: the default implementation reads
//! a ready-made token from the environment.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::pipeline::error::{Error, Result};

/// Scope for Firebase App Distribution.
pub const FIREBASE_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
/// Scope for the Android Publisher API.
pub const PLAY_SCOPE: &str = "https://www.googleapis.com/auth/androidpublisher";

/// Lifetime assumed for tokens whose real expiry is unknown.
const ASSUMED_LIFETIME_MINUTES: i64 = 55;

/// A bearer token and when it stops being valid.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// Bearer token
    pub token: String,
    /// Expiry instant
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AccessToken {
    /// Whether the token is still valid `margin` from now.
    pub fn is_fresh(&self, margin: Duration) -> bool {
        Utc::now() + margin < self.expires_at
    }
}

/// Source of bearer tokens.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Returns a token valid for `scope`.
    async fn get_token(&self, scope: &str) -> Result<AccessToken>;
}

/// Hands out one token taken from an environment variable.
pub struct EnvTokenAuthenticator {
    var: String,
    token: Option<String>,
}

impl EnvTokenAuthenticator {
    /// Reads `var` from the process environment now.
    pub fn from_env(var: impl Into<String>) -> Self {
        let var = var.into();
        let token = std::env::var(&var).ok().filter(|t| !t.trim().is_empty());
        Self { var, token }
    }

    /// Uses a fixed token.
    pub fn with_token(var: impl Into<String>, token: Option<String>) -> Self {
        Self {
            var: var.into(),
            token,
        }
    }
}

#[async_trait]
impl Authenticator for EnvTokenAuthenticator {
    async fn get_token(&self, _scope: &str) -> Result<AccessToken> {
        let token = self.token.clone().ok_or_else(|| Error::MissingConfig {
            destination: "auth".to_string(),
            field: self.var.clone(),
        })?;
        Ok(AccessToken {
            token,
            expires_at: Utc::now() + Duration::minutes(ASSUMED_LIFETIME_MINUTES),
        })
    }
}

/// Reuses tokens per scope until shortly before they expire.
///
/// The lock is only held to read or store a token, never across the fetch,
/// so concurrent callers may fetch the same scope twice; the later token wins.
pub struct CachedAuthenticator<A> {
    inner: A,
    margin: Duration,
    tokens: Mutex<HashMap<String, AccessToken>>,
}

impl<A: Authenticator> CachedAuthenticator<A> {
    /// Wraps `inner`, refreshing tokens one minute before expiry.
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            margin: Duration::minutes(1),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, scope: &str) -> Option<AccessToken> {
        let tokens = self.tokens.lock().ok()?;
        tokens.get(scope).filter(|t| t.is_fresh(self.margin)).cloned()
    }
}

#[async_trait]
impl<A: Authenticator> Authenticator for CachedAuthenticator<A> {
    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        if let Some(token) = self.cached(scope) {
            return Ok(token);
        }

        log::debug!("Fetching access token for {}", scope);
        let token = self.inner.get_token(scope).await?;
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.insert(scope.to_string(), token.clone());
        }
        Ok(token)
    }
}
