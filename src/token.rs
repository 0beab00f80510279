//! Room access tokens
//!
//! Tokens come from the town service; the core only needs the
//! [`TokenProvider`] seam. [`TokenFetcher`] adds the "fetching" flag and
//! error reporting the UI shows while a request is outstanding.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, TokenError};

/// Which room a token is requested for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomDescriptor {
    pub room_id: String,
    pub user_name: String,
}

impl RoomDescriptor {
    pub fn new(room_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            user_name: user_name.into(),
        }
    }
}

/// Credential issued for one connection attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub token: String,
    pub expiry: Option<DateTime<Utc>>,
    pub room_connection_id: Option<String>,
}

impl TokenGrant {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now)
    }
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn get_token(&self, room: &RoomDescriptor) -> Result<TokenGrant, TokenError>;
}

/// Latest error for the UI to show; cleared by the UI once dismissed
#[derive(Clone, Default)]
pub struct ErrorSlot {
    current: Arc<Mutex<Option<Arc<Error>>>>,
}

impl ErrorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&self) -> Option<Arc<Error>> {
        self.current.lock().clone()
    }

    pub fn set_error(&self, error: Error) {
        tracing::warn!("{}", error);
        *self.current.lock() = Some(Arc::new(error));
    }

    pub fn clear_error(&self) {
        *self.current.lock() = None;
    }
}

/// Wraps a [`TokenProvider`], tracking whether a request is outstanding
pub struct TokenFetcher {
    provider: Arc<dyn TokenProvider>,
    errors: ErrorSlot,
    fetching: AtomicBool,
}

impl TokenFetcher {
    pub fn new(provider: Arc<dyn TokenProvider>, errors: ErrorSlot) -> Self {
        Self {
            provider,
            errors,
            fetching: AtomicBool::new(false),
        }
    }

    pub fn is_fetching(&self) -> bool {
        self.fetching.load(Ordering::SeqCst)
    }

    /// Request a token. Failures are recorded in the error slot and
    /// returned; nothing is retried.
    pub async fn get_token(&self, room: &RoomDescriptor) -> Result<TokenGrant, TokenError> {
        let result = {
            self.fetching.store(true, Ordering::SeqCst);
            let _fetching = FetchingFlag(&self.fetching);
            self.provider.get_token(room).await
        };

        let result = result.and_then(|grant| {
            if grant.token.is_empty() {
                Err(TokenError::Missing(room.room_id.clone()))
            } else {
                Ok(grant)
            }
        });
        if let Err(e) = &result {
            self.errors.set_error(Error::Token(e.clone()));
        }
        result
    }
}

struct FetchingFlag<'a>(&'a AtomicBool);

impl Drop for FetchingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::sim::SimTokenProvider;
    use chrono::Duration;

    #[tokio::test]
    async fn test_fetch_success() {
        let errors = ErrorSlot::new();
        let fetcher = TokenFetcher::new(Arc::new(SimTokenProvider::new()), errors.clone());

        let grant = fetcher.get_token(&RoomDescriptor::new("town-1", "ada")).await.unwrap();
        assert_eq!(grant.token, "token:town-1:ada");
        assert!(!fetcher.is_fetching());
        assert!(errors.error().is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_recorded() {
        let errors = ErrorSlot::new();
        let provider = SimTokenProvider::new();
        provider.fail_with(TokenError::RequestFailed("503".into()));
        let fetcher = TokenFetcher::new(Arc::new(provider), errors.clone());

        let err = fetcher.get_token(&RoomDescriptor::new("town-1", "ada")).await.unwrap_err();
        assert_eq!(err, TokenError::RequestFailed("503".into()));
        assert!(matches!(errors.error().as_deref(), Some(Error::Token(_))));
        assert!(!fetcher.is_fetching());

        errors.clear_error();
        assert!(errors.error().is_none());
    }

    #[tokio::test]
    async fn test_empty_token_is_missing() {
        let provider = SimTokenProvider::new();
        provider.issue_empty(true);
        let fetcher = TokenFetcher::new(Arc::new(provider), ErrorSlot::new());

        let err = fetcher.get_token(&RoomDescriptor::new("town-2", "bo")).await.unwrap_err();
        assert_eq!(err, TokenError::Missing("town-2".into()));
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let grant = TokenGrant {
            token: "t".into(),
            expiry: Some(now - Duration::seconds(1)),
            room_connection_id: None,
        };
        assert!(grant.is_expired(now));
        assert!(!TokenGrant { expiry: None, ..grant }.is_expired(now));
    }
}
