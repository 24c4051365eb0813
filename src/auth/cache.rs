//! Time-bounded bearer token cache
//!
//! One [`TokenCache`] exists per platform endpoint. It is created once,
//! wrapped in an `Arc`, and handed to every consumer that calls the platform
//! API. The check-validity/refresh/publish sequence runs under a single async
//! mutex, so concurrent callers that all see an expired credential trigger
//! exactly one issuance and the rest reuse its result.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::common::{Error, Result};

/// A token freshly issued by an [`Authenticator`]
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    /// Absolute expiry reported by the server, if it reports one
    pub expires_at: Option<SystemTime>,
}

/// Issues bearer tokens for a platform endpoint
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Request a token that should live for `ttl`
    async fn issue_token(&self, ttl: Duration) -> Result<IssuedToken>;
}

/// Wall-clock source, replaceable in tests
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// The real system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Cached bearer credential
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub token: Option<String>,
    pub expires_at: Option<SystemTime>,
}

impl Credential {
    /// A credential is valid only while a token is present and `now < expires_at`
    pub fn is_valid(&self, now: SystemTime) -> bool {
        match (&self.token, self.expires_at) {
            (Some(_), Some(expires_at)) => now < expires_at,
            _ => false,
        }
    }

    fn clear(&mut self) {
        self.token = None;
        self.expires_at = None;
    }
}

/// Shared, lazily refreshed credential for one endpoint
pub struct TokenCache {
    authenticator: Arc<dyn Authenticator>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    state: Mutex<Credential>,
}

impl TokenCache {
    pub fn new(authenticator: Arc<dyn Authenticator>, ttl: Duration) -> Self {
        Self::with_clock(authenticator, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(
        authenticator: Arc<dyn Authenticator>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            authenticator,
            clock,
            ttl,
            state: Mutex::new(Credential::default()),
        }
    }

    /// Return a valid token, issuing a new one if the cached one is absent or expired
    ///
    /// If issuance fails the cache is left invalid and the failure is
    /// returned as [`Error::AuthenticationFailed`]; a stale token is never
    /// handed out.
    pub async fn get_valid_credential(&self) -> Result<String> {
        let mut state = self.state.lock().await;

        if state.is_valid(self.clock.now()) {
            if let Some(token) = &state.token {
                return Ok(token.clone());
            }
        }

        tracing::debug!(ttl_secs = self.ttl.as_secs(), "Refreshing platform token");
        state.clear();

        let issued_at = self.clock.now();
        let issued = self.authenticator.issue_token(self.ttl).await.map_err(|e| match e {
            Error::AuthenticationFailed(_) => e,
            other => Error::AuthenticationFailed(other.to_string()),
        })?;

        if issued.token.is_empty() {
            return Err(Error::AuthenticationFailed(
                "platform returned an empty token".to_string(),
            ));
        }

        let expires_at = issued.expires_at.unwrap_or(issued_at + self.ttl);
        tracing::info!(
            expires_in_secs = expires_at
                .duration_since(issued_at)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            "Platform token issued"
        );

        state.token = Some(issued.token.clone());
        state.expires_at = Some(expires_at);
        Ok(issued.token)
    }

    /// Drop the cached credential if it is still the `rejected` token
    ///
    /// A caller holding a token the server refused must not discard a newer
    /// one that another caller has already obtained.
    pub async fn invalidate_if(&self, rejected: &str) {
        let mut state = self.state.lock().await;
        if state.token.as_deref() == Some(rejected) {
            state.clear();
        }
    }

    /// Snapshot of the cached credential
    pub async fn credential(&self) -> Credential {
        self.state.lock().await.clone()
    }
}
