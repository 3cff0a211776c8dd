//! Access token lifecycle
//!
//! The token is fetched lazily on the first signed call and then reused for
//! the lifetime of the client. There is no automatic refresh: callers that
//! hit an expired token can [`TokenManager::clear`] it and the next call will
//! log in again.

use std::future::Future;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Result, TuyaClientError};
use crate::types::AccessToken;

/// Path and query of the client-credentials token request
pub const TOKEN_PATH: &str = "/v1.0/token?grant_type=1";

/// Owns the access token of one client instance
#[derive(Debug, Default)]
pub struct TokenManager {
    token: Mutex<Option<AccessToken>>,
}

impl TokenManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached token, fetching it with `fetch` if none is held
    ///
    /// The lock is held across the fetch so concurrent first callers share
    /// a single token request.
    pub async fn ensure_token<F, Fut>(&self, fetch: F) -> Result<AccessToken>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessToken>>,
    {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }

        debug!("No access token held, logging in");
        let token = fetch().await?;
        info!(expire_time = ?token.expire_time, "Obtained access token");
        *guard = Some(token.clone());
        Ok(token)
    }

    /// The token currently held, if any
    pub async fn current_token(&self) -> Option<AccessToken> {
        self.token.lock().await.clone()
    }

    /// Forget the held token so the next signed call logs in again
    pub async fn clear(&self) {
        *self.token.lock().await = None;
    }

    /// Extract the token from the `result` of a token response
    pub fn parse_token_result(result: &Value) -> Result<AccessToken> {
        match result.get("access_token") {
            Some(Value::String(s)) if !s.is_empty() => serde_json::from_value(result.clone())
                .map_err(|e| TuyaClientError::Auth(format!("malformed token result: {}", e))),
            _ => Err(TuyaClientError::Auth(format!(
                "token response has no access_token: {}",
                result
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn token(raw: &str) -> AccessToken {
        TokenManager::parse_token_result(&json!({"access_token": raw})).unwrap()
    }

    #[tokio::test]
    async fn test_token_fetched_once() {
        let manager = TokenManager::new();
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        for _ in 0..3 {
            let t = manager
                .ensure_token(|| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(token("tok-1"))
                })
                .await
                .unwrap();
            assert_eq!(t.as_str(), "tok-1");
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_no_token() {
        let manager = TokenManager::new();
        let err = manager
            .ensure_token(|| async { Err(TuyaClientError::Transport("down".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, TuyaClientError::Transport(_)));
        assert!(manager.current_token().await.is_none());
    }

    #[tokio::test]
    async fn test_clear_forces_new_fetch() {
        let manager = TokenManager::new();
        manager.ensure_token(|| async { Ok(token("old")) }).await.unwrap();
        manager.clear().await;
        let t = manager.ensure_token(|| async { Ok(token("new")) }).await.unwrap();
        assert_eq!(t.as_str(), "new");
        assert_eq!(manager.current_token().await.unwrap().as_str(), "new");
    }

    #[test]
    fn test_parse_token_result_requires_access_token() {
        let err = TokenManager::parse_token_result(&json!({"uid": "x"})).unwrap_err();
        assert!(matches!(err, TuyaClientError::Auth(_)));

        let err = TokenManager::parse_token_result(&json!([])).unwrap_err();
        assert!(matches!(err, TuyaClientError::Auth(_)));

        let t = TokenManager::parse_token_result(&json!({
            "access_token": "abc",
            "expire_time": 7200,
            "refresh_token": "r",
            "uid": "u"
        }))
        .unwrap();
        assert_eq!(t.as_str(), "abc");
        assert_eq!(t.expire_time, Some(7200));
    }
}
