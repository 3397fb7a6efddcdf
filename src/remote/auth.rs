//! Bearer token cache for the remote backup store
//!
//! The interactive sign-in happens elsewhere; this module only keeps the
//! resulting access token, persists it in the local store and tracks whether
//! it is still usable.
//!
//! State transitions:
//!
//! ```text
//! Uninitialized --authenticate--> Authenticated --(clock or 401/403)--> Expired
//!       ^                                                                  |
//!       +------------------------------ logout ----------------------------+
//! ```

use crate::error::Result;
use crate::storage::KeyValueBackend;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Key under which the token is persisted
pub const TOKEN_KEY: &str = "agregllm_remote_token";

/// Tokens are treated as expired this long before their real expiry
pub const EXPIRY_MARGIN_SECONDS: i64 = 60;

/// An access token and its absolute expiry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub access_token: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Creates a token that expires `expires_in` from now
    pub fn new(access_token: impl Into<String>, expires_in: Duration) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: Utc::now() + expires_in,
        }
    }

    /// Checks expiry with the safety margin applied
    ///
    /// # Examples
    ///
    /// ```
    /// use agregllm::remote::AccessToken;
    /// use chrono::Duration;
    ///
    /// assert!(!AccessToken::new("tok", Duration::hours(1)).is_expired());
    /// assert!(AccessToken::new("tok", Duration::seconds(30)).is_expired());
    /// ```
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at - Duration::seconds(EXPIRY_MARGIN_SECONDS)
    }
}

/// Where the cache stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// No token has been loaded or provided
    Uninitialized,
    /// A token is held and was valid when last checked
    Authenticated(AccessToken),
    /// The token ran out or was rejected; a new sign-in is needed
    Expired,
}

impl AuthState {
    pub fn label(&self) -> &'static str {
        match self {
            AuthState::Uninitialized => "uninitialized",
            AuthState::Authenticated(_) => "authenticated",
            AuthState::Expired => "expired",
        }
    }
}

/// Persisted token cache with an explicit state machine
pub struct TokenCache {
    backend: Arc<dyn KeyValueBackend>,
    /// `None` until the persisted token has been read
    state: RwLock<Option<AuthState>>,
}

impl TokenCache {
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self {
            backend,
            state: RwLock::new(None),
        }
    }

    /// Reads the persisted token, if any, and derives the state from it
    pub async fn load(&self) -> Result<AuthState> {
        let state = match self.backend.get(TOKEN_KEY).await? {
            None => AuthState::Uninitialized,
            Some(stored) => match serde_json::from_str::<AccessToken>(&stored.value) {
                Ok(token) if token.is_expired() => AuthState::Expired,
                Ok(token) => AuthState::Authenticated(token),
                Err(e) => {
                    tracing::warn!(error = %e, "Stored remote token is unreadable, ignoring it");
                    AuthState::Uninitialized
                }
            },
        };

        *self.state.write().await = Some(state.clone());
        Ok(state)
    }

    /// Stores a freshly obtained token
    pub async fn authenticate(&self, token: AccessToken) -> Result<()> {
        let json = serde_json::to_string(&token)?;
        self.backend.put(TOKEN_KEY, json).await?;
        tracing::info!(expires_at = %token.expires_at, "Remote token stored");

        *self.state.write().await = Some(AuthState::Authenticated(token));
        Ok(())
    }

    /// Forgets the token
    pub async fn logout(&self) -> Result<()> {
        self.backend.remove(TOKEN_KEY).await?;
        *self.state.write().await = Some(AuthState::Uninitialized);
        tracing::info!("Remote token removed");
        Ok(())
    }

    /// Current state, with the clock applied to a held token
    pub async fn state(&self) -> Result<AuthState> {
        let current = self.state.read().await.clone();
        let current = match current {
            Some(state) => state,
            None => self.load().await?,
        };

        if let AuthState::Authenticated(token) = &current {
            if token.is_expired() {
                tracing::debug!("Remote token expired");
                *self.state.write().await = Some(AuthState::Expired);
                return Ok(AuthState::Expired);
            }
        }
        Ok(current)
    }

    /// The bearer token when one is usable
    pub async fn valid_token(&self) -> Result<Option<String>> {
        match self.state().await? {
            AuthState::Authenticated(token) => Ok(Some(token.access_token)),
            AuthState::Uninitialized | AuthState::Expired => Ok(None),
        }
    }

    /// Records that the remote rejected the token
    ///
    /// The persisted copy is dropped so a restart does not revive it.
    pub async fn mark_expired(&self) -> Result<()> {
        *self.state.write().await = Some(AuthState::Expired);
        self.backend.remove(TOKEN_KEY).await?;
        tracing::warn!("Remote token rejected, sign-in required");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    fn cache() -> (TokenCache, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        (TokenCache::new(backend.clone()), backend)
    }

    #[tokio::test]
    async fn test_initial_state_is_uninitialized() {
        let (tokens, _) = cache();
        assert_eq!(tokens.state().await.unwrap(), AuthState::Uninitialized);
        assert!(tokens.valid_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_authenticate_persists_token() {
        let (tokens, backend) = cache();
        tokens
            .authenticate(AccessToken::new("abc", Duration::hours(1)))
            .await
            .unwrap();
        assert_eq!(tokens.valid_token().await.unwrap().as_deref(), Some("abc"));

        let reloaded = TokenCache::new(backend);
        assert_eq!(reloaded.valid_token().await.unwrap().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_token_within_margin_is_expired() {
        let (tokens, _) = cache();
        tokens
            .authenticate(AccessToken::new("abc", Duration::seconds(10)))
            .await
            .unwrap();
        assert_eq!(tokens.state().await.unwrap(), AuthState::Expired);
        assert!(tokens.valid_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_expired_drops_persisted_token() {
        let (tokens, backend) = cache();
        tokens
            .authenticate(AccessToken::new("abc", Duration::hours(1)))
            .await
            .unwrap();
        tokens.mark_expired().await.unwrap();

        assert_eq!(tokens.state().await.unwrap(), AuthState::Expired);
        assert!(backend.get(TOKEN_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_logout_resets_state() {
        let (tokens, _) = cache();
        tokens
            .authenticate(AccessToken::new("abc", Duration::hours(1)))
            .await
            .unwrap();
        tokens.logout().await.unwrap();
        assert_eq!(tokens.state().await.unwrap(), AuthState::Uninitialized);
    }

    #[tokio::test]
    async fn test_corrupt_persisted_token_is_ignored() {
        let (tokens, backend) = cache();
        backend.put(TOKEN_KEY, "garbage".to_string()).await.unwrap();
        assert_eq!(tokens.load().await.unwrap(), AuthState::Uninitialized);
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(AuthState::Uninitialized.label(), "uninitialized");
        assert_eq!(AuthState::Expired.label(), "expired");
    }
}
