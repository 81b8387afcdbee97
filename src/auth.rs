//! User accounts, password hashing, and bearer sessions.
//!
//! The pipeline core only needs a stable opaque owner identifier; everything
//! else here (argon2 hashing, session tokens) backs the signup/login surface.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::jobs::types::current_timestamp_rfc3339;

/// Errors raised by account and session operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Signup attempted with a username that already exists.
    #[error("username `{0}` is already taken")]
    UsernameTaken(String),
    /// Login failed: unknown user or wrong password.
    #[error("invalid username or password")]
    InvalidCredentials,
    /// Password hashing infrastructure failed.
    #[error("failed to hash password: {0}")]
    Hashing(String),
}

struct UserRecord {
    user_id: String,
    password_hash: String,
    #[allow(dead_code)]
    created_at: String,
}

#[derive(Default)]
struct UserStoreInner {
    users: HashMap<String, UserRecord>,
    // bearer token -> username
    sessions: HashMap<String, String>,
}

/// In-memory account store issuing opaque bearer session tokens.
#[derive(Default)]
pub struct UserStore {
    inner: RwLock<UserStoreInner>,
}

impl UserStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new user, returning the opaque user id.
    pub async fn signup(&self, username: &str, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|err| AuthError::Hashing(err.to_string()))?
            .to_string();

        let mut inner = self.inner.write().await;
        if inner.users.contains_key(username) {
            return Err(AuthError::UsernameTaken(username.to_string()));
        }
        let user_id = Uuid::new_v4().to_string();
        inner.users.insert(
            username.to_string(),
            UserRecord {
                user_id: user_id.clone(),
                password_hash,
                created_at: current_timestamp_rfc3339(),
            },
        );
        tracing::info!(username, "User registered");
        Ok(user_id)
    }

    /// Verify credentials and mint a bearer session token.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, AuthError> {
        let mut inner = self.inner.write().await;
        let password_hash = inner
            .users
            .get(username)
            .map(|record| record.password_hash.clone())
            .ok_or(AuthError::InvalidCredentials)?;

        let parsed_hash = PasswordHash::new(&password_hash)
            .map_err(|err| AuthError::Hashing(err.to_string()))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| AuthError::InvalidCredentials)?;

        let token = Uuid::new_v4().to_string();
        inner.sessions.insert(token.clone(), username.to_string());
        Ok(token)
    }

    /// Resolve a bearer token to the username it was issued for.
    pub async fn resolve_token(&self, token: &str) -> Option<String> {
        let inner = self.inner.read().await;
        inner.sessions.get(token).cloned()
    }

    /// Resolve a username to its opaque owner identifier.
    pub async fn get_owner_id(&self, username: &str) -> Option<String> {
        let inner = self.inner.read().await;
        inner.users.get(username).map(|record| record.user_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signup_then_login_round_trips() {
        let store = UserStore::new();
        let user_id = store.signup("alice", "hunter2").await.expect("signup");
        assert!(!user_id.is_empty());

        let token = store.login("alice", "hunter2").await.expect("login");
        assert_eq!(store.resolve_token(&token).await.as_deref(), Some("alice"));
        assert_eq!(store.get_owner_id("alice").await, Some(user_id));
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let store = UserStore::new();
        store.signup("bob", "pw").await.expect("first signup");
        let err = store.signup("bob", "other").await.unwrap_err();
        assert!(matches!(err, AuthError::UsernameTaken(ref name) if name == "bob"));
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials() {
        let store = UserStore::new();
        store.signup("carol", "secret").await.expect("signup");
        let err = store.login("carol", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn unknown_token_and_user_resolve_to_none() {
        let store = UserStore::new();
        assert!(store.resolve_token("bogus").await.is_none());
        assert!(store.get_owner_id("nobody").await.is_none());
    }
}
