//! Session access for the recipe cache
//!
//! Sign-in itself happens elsewhere; the cache only needs to know who owns
//! the recipes and which token to send.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of the signed-in user's identity
pub trait SessionProvider: Send + Sync {
    /// Id of the signed-in user, `None` when unauthenticated
    fn current_owner_id(&self) -> Option<String>;

    /// Bearer token for the signed-in user
    fn access_token(&self) -> Option<String>;
}

/// Session data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
    pub token_type: String,
    pub expires_in: i64,
    pub expires_at: Option<i64>,
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs() as i64
}

impl Session {
    pub fn new(access_token: &str, refresh_token: &str, user_id: &str, expires_in: i64) -> Self {
        Self {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            user_id: user_id.to_string(),
            token_type: "bearer".to_string(),
            expires_in,
            expires_at: Some(unix_now() + expires_in),
        }
    }

    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => unix_now() >= expires_at,
            None => false,
        }
    }
}

/// Shared holder for the current session
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    session: Arc<RwLock<Option<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        let store = Self::new();
        store.set_session(session);
        store
    }

    pub fn set_session(&self, session: Session) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
    }

    pub fn clear(&self) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// The stored session unless it has expired
    pub fn get_session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|s| !s.is_expired())
    }
}

impl SessionProvider for SessionStore {
    fn current_owner_id(&self) -> Option<String> {
        self.get_session().map(|s| s.user_id)
    }

    fn access_token(&self) -> Option<String> {
        self.get_session().map(|s| s.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_store_is_unauthenticated() {
        let store = SessionStore::new();
        assert_eq!(store.current_owner_id(), None);
        assert_eq!(store.access_token(), None);
    }

    #[test]
    fn test_active_session_exposes_owner() {
        let store = SessionStore::with_session(Session::new("tok", "ref", "user-1", 3600));
        assert_eq!(store.current_owner_id().as_deref(), Some("user-1"));
        assert_eq!(store.access_token().as_deref(), Some("tok"));

        store.clear();
        assert_eq!(store.current_owner_id(), None);
    }

    #[test]
    fn test_expired_session_is_ignored() {
        let mut session = Session::new("tok", "ref", "user-1", 3600);
        session.expires_at = Some(unix_now() - 10);
        let store = SessionStore::with_session(session);

        assert_eq!(store.current_owner_id(), None);
        assert_eq!(store.access_token(), None);
    }
}
