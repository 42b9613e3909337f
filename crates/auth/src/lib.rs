use std::sync::Arc;
use std::time::Duration;

use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use parlor_config::AuthConfig;
use parlor_hub::{IdentityStore, Session, SessionStore, StoreError, User};
use thiserror::Error;
use tracing::{debug, info};

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 32;
pub const PASSWORD_MIN_LEN: usize = 8;

#[derive(Clone)]
pub struct Authenticator {
    identities: Arc<dyn IdentityStore>,
    sessions: Arc<dyn SessionStore>,
    session_ttl: Duration,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user already exists")]
    UserExists,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error(
        "username must be {USERNAME_MIN_LEN}-{USERNAME_MAX_LEN} characters of letters, digits, '_' or '-'"
    )]
    InvalidUsername,
    #[error("password must be at least {PASSWORD_MIN_LEN} characters")]
    WeakPassword,
    #[error("invalid or expired session")]
    InvalidSession,
    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] argon2::password_hash::Error),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl Authenticator {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        sessions: Arc<dyn SessionStore>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            identities,
            sessions,
            session_ttl: Duration::from_secs(config.session_ttl_seconds),
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<User, AuthError> {
        validate_username(username)?;
        if password.chars().count() < PASSWORD_MIN_LEN {
            return Err(AuthError::WeakPassword);
        }

        let password_hash = hash_password(password)?;
        let user = self
            .identities
            .create_user(username, &password_hash)
            .await
            .map_err(|error| match error {
                StoreError::Conflict(_) => AuthError::UserExists,
                other => AuthError::Store(other),
            })?;

        info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(user)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let user = match self.identities.find_user_by_username(username).await {
            Ok(user) => user,
            Err(StoreError::NotFound(_)) => return Err(AuthError::InvalidCredentials),
            Err(other) => return Err(other.into()),
        };

        let secret = self.identities.password_hash(user.id).await?;
        let stored_hash = PasswordHash::new(&secret)?;
        Argon2::default()
            .verify_password(password.as_bytes(), &stored_hash)
            .map_err(|_| AuthError::InvalidCredentials)?;

        let session = self
            .sessions
            .create_session(user.id, self.session_ttl)
            .await?;

        info!(user_id = %user.id, "user logged in");
        Ok(session)
    }

    /// Resolve the user behind a session id.
    pub async fn authenticate(&self, session_id: &str) -> Result<User, AuthError> {
        let session = match self.sessions.get_session(session_id).await {
            Ok(session) => session,
            Err(StoreError::NotFound(_) | StoreError::Expired) => {
                debug!("rejecting unknown or expired session");
                return Err(AuthError::InvalidSession);
            }
            Err(other) => return Err(other.into()),
        };

        match self.identities.find_user_by_id(session.user_id).await {
            Ok(user) => Ok(user),
            Err(StoreError::NotFound(_)) => Err(AuthError::InvalidSession),
            Err(other) => Err(other.into()),
        }
    }

    pub async fn logout(&self, session_id: &str) -> Result<(), AuthError> {
        self.sessions.delete_session(session_id).await?;
        Ok(())
    }
}

fn validate_username(username: &str) -> Result<(), AuthError> {
    let len = username.chars().count();
    let allowed = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if (USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) && allowed {
        Ok(())
    } else {
        Err(AuthError::InvalidUsername)
    }
}

fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames_follow_the_allowed_alphabet() {
        for valid in ["bob", "alice_01", "x-y-z", &"a".repeat(USERNAME_MAX_LEN)] {
            assert!(validate_username(valid).is_ok(), "{valid} should be accepted");
        }
        for invalid in ["ab", "", "has space", "émile", "semi;colon", &"a".repeat(33)] {
            assert!(
                matches!(validate_username(invalid), Err(AuthError::InvalidUsername)),
                "{invalid} should be rejected"
            );
        }
    }

    #[test]
    fn hashes_are_salted() {
        let first = hash_password("correct horse").unwrap();
        let second = hash_password("correct horse").unwrap();
        assert!(first.starts_with("$argon2"));
        assert_ne!(first, second);
    }
}
