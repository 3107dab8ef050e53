//! Token lifecycle management for the maintenance API.
//!
//! The [`TokenManager`] caches bearer tokens per scope and re-acquires them
//! silently once they are within five minutes of expiry. When silent
//! acquisition fails it hands control to the identity provider via an
//! interactive redirect; during that window `get_token` returns `Ok(None)`
//! ("token not yet available"), which callers must not treat as an error.
//!
//! The API client depends on the [`TokenProvider`] trait rather than on the
//! manager directly, so tests can substitute fakes and no global refresh
//! callback exists.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::Error;

/// Reuse window: a token expiring within this many milliseconds is treated
/// as stale and re-acquired.
const EXPIRY_SKEW_MS: i64 = 5 * 60 * 1000;

/// Named token scopes understood by the identity broker.
///
/// Only `MaintenanceApi` is exercised by the core; the notification hub is an
/// external collaborator that shares the same broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenScope {
    MaintenanceApi,
    NotificationHub,
}

impl TokenScope {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MaintenanceApi => "maintenance-api",
            Self::NotificationHub => "notification-hub",
        }
    }
}

/// Acquisition states of the manager, in document order:
/// `NoAccount → SilentAcquire → {Cached | RedirectPending} → Cached`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    NoAccount,
    SilentAcquire,
    Cached,
    RedirectPending,
}

/// Seam to the platform identity broker (MSAL-style).
///
/// `begin_interactive` does not yield a token on the same call; navigation
/// transfers control to the identity provider and the session resumes later.
#[async_trait]
pub trait IdentityBroker: Send + Sync {
    /// Whether a signed-in account is available for silent acquisition.
    fn has_account(&self) -> bool;

    /// Acquire a token without user interaction.
    async fn acquire_silent(&self, scope: TokenScope) -> Result<String, Error>;

    /// Start an interactive redirect acquisition.
    async fn begin_interactive(&self, scope: TokenScope) -> Result<(), Error>;
}

/// Token source consumed by the API client.
///
/// Passed explicitly at client construction; there is no global refresh
/// registration.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A currently valid bearer token, if one is available.
    async fn bearer_token(&self) -> Option<String>;

    /// Invalidate any cached token and acquire a fresh one. Returns the new
    /// token, or `None` when acquisition is pending or failed.
    async fn refresh(&self) -> Option<String>;
}

/// Fixed-token provider for CLI and test use; it cannot refresh.
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    #[must_use]
    pub const fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }

    async fn refresh(&self) -> Option<String> {
        None
    }
}

struct ManagerState {
    tokens: HashMap<TokenScope, String>,
    state: TokenState,
}

/// Expiry-aware token cache over an [`IdentityBroker`].
pub struct TokenManager {
    broker: Arc<dyn IdentityBroker>,
    state: RwLock<ManagerState>,
}

impl TokenManager {
    #[must_use]
    pub fn new(broker: Arc<dyn IdentityBroker>) -> Self {
        Self {
            broker,
            state: RwLock::new(ManagerState {
                tokens: HashMap::new(),
                state: TokenState::NoAccount,
            }),
        }
    }

    /// Current acquisition state (observability only).
    pub async fn state(&self) -> TokenState {
        self.state.read().await.state
    }

    /// Return a valid token for `scope`, acquiring one if needed.
    ///
    /// `Ok(None)` means no token is available yet: either no account is
    /// signed in, or an interactive redirect is pending.
    ///
    /// # Errors
    ///
    /// Returns an error only when the interactive fallback itself fails;
    /// silent-acquisition failures fall through to the redirect path.
    pub async fn get_token(&self, scope: TokenScope) -> Result<Option<String>, Error> {
        if !self.broker.has_account() {
            let mut state = self.state.write().await;
            state.tokens.clear();
            state.state = TokenState::NoAccount;
            return Ok(None);
        }

        {
            let state = self.state.read().await;
            if let Some(token) = state.tokens.get(&scope) {
                if token_is_fresh(token) {
                    return Ok(Some(token.clone()));
                }
            }
        }

        self.acquire(scope).await
    }

    /// Drop any cached token for `scope` (logout or forced refresh).
    pub async fn invalidate(&self, scope: TokenScope) {
        let mut state = self.state.write().await;
        state.tokens.remove(&scope);
        state.state = TokenState::SilentAcquire;
    }

    async fn acquire(&self, scope: TokenScope) -> Result<Option<String>, Error> {
        {
            let mut state = self.state.write().await;
            state.state = TokenState::SilentAcquire;
        }

        match self.broker.acquire_silent(scope).await {
            Ok(token) => {
                debug!(scope = scope.as_str(), "Silent token acquisition succeeded");
                let mut state = self.state.write().await;
                state.tokens.insert(scope, token.clone());
                state.state = TokenState::Cached;
                Ok(Some(token))
            }
            Err(e) => {
                warn!(
                    scope = scope.as_str(),
                    error = %e,
                    "Silent acquisition failed, falling back to interactive redirect"
                );
                self.broker.begin_interactive(scope).await?;
                let mut state = self.state.write().await;
                state.tokens.remove(&scope);
                state.state = TokenState::RedirectPending;
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl TokenProvider for TokenManager {
    async fn bearer_token(&self) -> Option<String> {
        match self.get_token(TokenScope::MaintenanceApi).await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Token acquisition failed; proceeding without a token");
                None
            }
        }
    }

    async fn refresh(&self) -> Option<String> {
        self.invalidate(TokenScope::MaintenanceApi).await;
        self.bearer_token().await
    }
}

/// Read the `exp` claim (epoch seconds) from a JWT's middle segment.
///
/// Returns `None` for anything that does not decode; callers treat that as
/// already expired (fail-closed).
#[must_use]
pub fn token_expiry_ms(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("exp")?.as_i64()?.checked_mul(1000)
}

fn token_is_fresh(token: &str) -> bool {
    match token_expiry_ms(token) {
        Some(expiry_ms) => expiry_ms - chrono::Utc::now().timestamp_millis() > EXPIRY_SKEW_MS,
        None => false,
    }
}
