//! In-memory account registry and bearer-token sessions.
//!
//! Stands in for a managed authentication provider during development and
//! tests. Accounts and issued tokens live only in process memory; tokens
//! expire after a configurable time to live.

use std::collections::HashMap;
use std::time::Duration;

use alldone_proto::auth::{AuthResponse, AuthUser, BEARER, UserCredentials};
use alldone_proto::task::UserId;
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

/// Minimum accepted password length in characters.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Default access-token lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Errors from signup and login.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The email address is not plausibly an address.
    #[error("invalid email address")]
    InvalidEmail,
    /// The password is shorter than [`MIN_PASSWORD_LENGTH`].
    #[error("password must be at least {MIN_PASSWORD_LENGTH} characters")]
    WeakPassword,
    /// An account with this email already exists.
    #[error("user already registered")]
    EmailTaken,
    /// Unknown email or wrong password.
    #[error("invalid login credentials")]
    InvalidCredentials,
}

struct Account {
    user: AuthUser,
    password: String,
}

struct IssuedToken {
    user: AuthUser,
    expires_at: Instant,
}

/// Registry of accounts (by email) and live access tokens.
pub struct AccountRegistry {
    accounts: RwLock<HashMap<String, Account>>,
    tokens: RwLock<HashMap<String, IssuedToken>>,
    token_ttl: Duration,
}

impl Default for AccountRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountRegistry {
    /// Creates an empty registry with the default token lifetime.
    #[must_use]
    pub fn new() -> Self {
        Self::with_token_ttl(DEFAULT_TOKEN_TTL)
    }

    /// Creates an empty registry whose tokens live for `token_ttl`.
    #[must_use]
    pub fn with_token_ttl(token_ttl: Duration) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            tokens: RwLock::new(HashMap::new()),
            token_ttl,
        }
    }

    /// Registers a new account and signs it in.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidEmail`], [`AuthError::WeakPassword`] or
    /// [`AuthError::EmailTaken`].
    pub async fn sign_up(&self, credentials: &UserCredentials) -> Result<AuthResponse, AuthError> {
        let email = normalize_email(&credentials.email)?;
        if credentials.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::WeakPassword);
        }

        let user = {
            let mut accounts = self.accounts.write().await;
            if accounts.contains_key(&email) {
                return Err(AuthError::EmailTaken);
            }
            let user = AuthUser {
                id: UserId::new(Uuid::new_v4().to_string()),
                email: email.clone(),
            };
            accounts.insert(
                email,
                Account {
                    user: user.clone(),
                    password: credentials.password.clone(),
                },
            );
            user
        };

        tracing::info!(user_id = %user.id, "account registered");
        Ok(self.issue(user).await)
    }

    /// Signs in an existing account.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] for an unknown email or a
    /// wrong password.
    pub async fn sign_in(&self, credentials: &UserCredentials) -> Result<AuthResponse, AuthError> {
        let email = normalize_email(&credentials.email).map_err(|_| AuthError::InvalidCredentials)?;
        let user = {
            let accounts = self.accounts.read().await;
            let account = accounts.get(&email).ok_or(AuthError::InvalidCredentials)?;
            if account.password != credentials.password {
                return Err(AuthError::InvalidCredentials);
            }
            account.user.clone()
        };

        tracing::info!(user_id = %user.id, "user signed in");
        Ok(self.issue(user).await)
    }

    /// Resolves a bearer token to its user, if the token is live.
    ///
    /// Expired tokens are removed on lookup.
    pub async fn user_for_token(&self, token: &str) -> Option<AuthUser> {
        let now = Instant::now();
        {
            let tokens = self.tokens.read().await;
            match tokens.get(token) {
                None => return None,
                Some(issued) if issued.expires_at > now => return Some(issued.user.clone()),
                Some(_) => {}
            }
        }
        self.tokens.write().await.remove(token);
        tracing::debug!("expired access token discarded");
        None
    }

    /// Number of tokens currently held, expired ones included.
    pub async fn token_count(&self) -> usize {
        self.tokens.read().await.len()
    }

    /// Issues a fresh token for `user`, reclaiming every expired one.
    async fn issue(&self, user: AuthUser) -> AuthResponse {
        let access_token = Uuid::new_v4().simple().to_string();
        let now = Instant::now();
        {
            let mut tokens = self.tokens.write().await;
            let before = tokens.len();
            tokens.retain(|_, issued| issued.expires_at > now);
            let purged = before - tokens.len();
            if purged > 0 {
                tracing::debug!(purged, "expired access tokens reclaimed");
            }
            tokens.insert(
                access_token.clone(),
                IssuedToken {
                    user: user.clone(),
                    expires_at: now + self.token_ttl,
                },
            );
        }
        AuthResponse {
            access_token,
            token_type: BEARER.to_string(),
            expires_in: self.token_ttl.as_secs(),
            // Opaque; this registry has no refresh endpoint.
            refresh_token: Uuid::new_v4().simple().to_string(),
            user,
        }
    }
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(AuthError::InvalidEmail);
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(AuthError::InvalidEmail);
    }
    Ok(email)
}
