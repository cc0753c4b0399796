//! Authentication payloads for `/auth/signup` and `/auth/login`.

use serde::{Deserialize, Serialize};

use crate::task::UserId;

/// Default token type reported in [`AuthResponse`].
pub const BEARER: &str = "Bearer";

/// Email and password submitted to sign up or log in.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredentials {
    /// Account email address.
    pub email: String,
    /// Account password.
    pub password: String,
}

impl UserCredentials {
    /// Bundles an email and password.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Public details of an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Stable user identifier; tasks are scoped to it.
    pub id: UserId,
    /// Email the account was registered with.
    pub email: String,
}

/// Session issued after a successful signup or login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Bearer token for the `Authorization` header.
    pub access_token: String,
    /// Token type, always `Bearer`.
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Seconds until `access_token` expires.
    pub expires_in: u64,
    /// Opaque refresh token, kept for wire compatibility with hosted auth
    /// providers. `alldone-server` issues one but never redeems it; signing
    /// in again is the only way to get a new access token.
    pub refresh_token: String,
    /// The authenticated user.
    pub user: AuthUser,
}

fn default_token_type() -> String {
    BEARER.to_string()
}
