//! Session state published to the task manager.
//!
//! [`SessionProvider`] owns the signed-in user and bearer token and
//! publishes every change over a `watch` channel. Consumers hold a
//! [`watch::Receiver`] and never reach into ambient globals.

use std::fmt;

use alldone_proto::auth::AuthResponse;
use alldone_proto::task::UserId;
use tokio::sync::watch;

/// A signed-in user and the bearer token for their requests.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Owner of the tasks.
    pub user_id: UserId,
    /// Bearer token sent with every task request.
    pub access_token: String,
}

impl Session {
    /// Creates a session.
    pub fn new(user_id: UserId, access_token: impl Into<String>) -> Self {
        Self {
            user_id,
            access_token: access_token.into(),
        }
    }

    /// Builds a session only when both the user and the token are present
    /// and non-empty.
    #[must_use]
    pub fn from_parts(user_id: Option<UserId>, access_token: Option<String>) -> Option<Self> {
        match (user_id, access_token) {
            (Some(user_id), Some(token)) if !user_id.as_str().is_empty() && !token.is_empty() => {
                Some(Self::new(user_id, token))
            }
            _ => None,
        }
    }
}

impl From<&AuthResponse> for Session {
    fn from(auth: &AuthResponse) -> Self {
        Self::new(auth.user.id.clone(), auth.access_token.clone())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// What the provider currently knows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// The active session, if any.
    pub session: Option<Session>,
    /// `true` while a sign-in is in progress.
    pub is_loading: bool,
}

impl SessionState {
    /// The active session, if any.
    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }
}

/// Publishes [`SessionState`] changes.
#[derive(Debug)]
pub struct SessionProvider {
    tx: watch::Sender<SessionState>,
}

impl Default for SessionProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionProvider {
    /// Creates a signed-out provider.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::default());
        Self { tx }
    }

    /// Marks a sign-in as in progress.
    pub fn begin_loading(&self) {
        self.tx.send_modify(|state| state.is_loading = true);
    }

    /// Ends a sign-in attempt that failed, keeping any existing session.
    pub fn abort_loading(&self) {
        self.tx.send_if_modified(|state| std::mem::replace(&mut state.is_loading, false));
    }

    /// Publishes a freshly established session.
    pub fn establish(&self, session: Session) {
        tracing::info!(user = %session.user_id, "session established");
        self.tx.send_replace(SessionState {
            session: Some(session),
            is_loading: false,
        });
    }

    /// Replaces the bearer token of the current session.
    ///
    /// Returns `false` (and publishes nothing) when signed out.
    pub fn refresh_token(&self, access_token: impl Into<String>) -> bool {
        let access_token = access_token.into();
        self.tx.send_if_modified(|state| match state.session.as_mut() {
            Some(session) => {
                session.access_token = access_token;
                true
            }
            None => false,
        })
    }

    /// Clears the session.
    pub fn sign_out(&self) {
        tracing::info!("session cleared");
        self.tx.send_replace(SessionState::default());
    }

    /// Returns a copy of the current state.
    #[must_use]
    pub fn current(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }
}
