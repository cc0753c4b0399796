//! REST API: shared state, bearer-token extraction, handlers, and server
//! startup.
//!
//! Routes:
//! - `GET /` health check
//! - `POST /auth/signup`, `POST /auth/login`
//! - `GET /tasks/`, `POST /tasks/`, `PUT /tasks/{id}`, `DELETE /tasks/{id}`
//!
//! Every `/tasks` route is scoped to the user behind the
//! `Authorization: Bearer <token>` header. Errors are rendered as
//! `{"detail": "..."}`.

use std::sync::Arc;
use std::time::Duration;

use alldone_proto::auth::{AuthResponse, AuthUser, UserCredentials};
use alldone_proto::task::{ErrorBody, Task, TaskCreate, TaskId, TaskUpdate, normalize_text};
use axum::extract::{FromRequestParts, Path, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use axum::http::request::Parts;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::accounts::{AccountRegistry, AuthError};
use crate::config::ServerConfig;
use crate::store::{StoreError, TaskStore};

/// Shared server state: accounts and tasks.
#[derive(Default)]
pub struct AppState {
    /// Registered accounts and live tokens.
    pub accounts: AccountRegistry,
    /// Every user's tasks.
    pub tasks: TaskStore,
}

impl AppState {
    /// Creates an empty state with the default token lifetime.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty state whose access tokens live for `token_ttl`.
    #[must_use]
    pub fn with_token_ttl(token_ttl: Duration) -> Self {
        Self {
            accounts: AccountRegistry::with_token_ttl(token_ttl),
            tasks: TaskStore::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// An HTTP error response with a `{detail}` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFailure {
    status: StatusCode,
    detail: String,
}

impl ApiFailure {
    /// Creates a failure with an explicit status and detail.
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    /// 400 Bad Request.
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    /// 401 Unauthorized; rendered with a `WWW-Authenticate: Bearer` challenge.
    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, detail)
    }

    /// Returns the HTTP status of this failure.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the detail message of this failure.
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(ErrorBody::new(self.detail))).into_response();
        if self.status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<StoreError> for ApiFailure {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "Task not found."),
            StoreError::Forbidden(_) => Self::new(
                StatusCode::FORBIDDEN,
                "Not authorized to modify this task.",
            ),
        }
    }
}

impl From<AuthError> for ApiFailure {
    fn from(err: AuthError) -> Self {
        let status = match err {
            AuthError::InvalidEmail | AuthError::WeakPassword => StatusCode::BAD_REQUEST,
            AuthError::EmailTaken => StatusCode::CONFLICT,
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        };
        Self::new(status, err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Authentication extractor
// ---------------------------------------------------------------------------

/// The user behind the request's bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthUser);

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiFailure;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| ApiFailure::unauthorized("Not authenticated."))?;

        state
            .accounts
            .user_for_token(token)
            .await
            .map(CurrentUser)
            .ok_or_else(|| {
                tracing::debug!("rejected unknown or expired bearer token");
                ApiFailure::unauthorized("Invalid or expired token.")
            })
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> Json<serde_json::Value> {
    tracing::debug!("health check");
    Json(serde_json::json!({ "message": "Alldone API is running" }))
}

async fn signup(
    State(state): State<Arc<AppState>>,
    Json(credentials): Json<UserCredentials>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiFailure> {
    tracing::info!(email = %credentials.email, "signup attempt");
    let session = state.accounts.sign_up(&credentials).await.map_err(|e| {
        tracing::warn!(email = %credentials.email, error = %e, "signup rejected");
        ApiFailure::from(e)
    })?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(credentials): Json<UserCredentials>,
) -> Result<Json<AuthResponse>, ApiFailure> {
    tracing::info!(email = %credentials.email, "login attempt");
    let session = state.accounts.sign_in(&credentials).await.map_err(|e| {
        tracing::warn!(email = %credentials.email, error = %e, "login rejected");
        ApiFailure::from(e)
    })?;
    Ok(Json(session))
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Json<Vec<Task>> {
    let tasks = state.tasks.list(&user.id).await;
    tracing::debug!(user_id = %user.id, count = tasks.len(), "listed tasks");
    Json(tasks)
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(create): Json<TaskCreate>,
) -> Result<(StatusCode, Json<Task>), ApiFailure> {
    let text = normalize_text(&create.text).map_err(|e| ApiFailure::bad_request(e.to_string()))?;
    let create = TaskCreate {
        text: text.to_string(),
        completed: create.completed,
    };
    let task = state.tasks.create(&user.id, create).await;
    tracing::info!(user_id = %user.id, task_id = %task.id, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(mut update): Json<TaskUpdate>,
) -> Result<Json<Task>, ApiFailure> {
    if let Some(text) = update.text.as_deref() {
        let text = normalize_text(text).map_err(|e| ApiFailure::bad_request(e.to_string()))?;
        update.text = Some(text.to_string());
    }
    let id = TaskId::new(id);
    let task = state.tasks.update(&user.id, &id, update).await.map_err(|e| {
        tracing::warn!(user_id = %user.id, task_id = %id, error = %e, "update refused");
        ApiFailure::from(e)
    })?;
    tracing::info!(user_id = %user.id, task_id = %task.id, "task updated");
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiFailure> {
    let id = TaskId::new(id);
    state.tasks.delete(&user.id, &id).await.map_err(|e| {
        tracing::warn!(user_id = %user.id, task_id = %id, error = %e, "delete refused");
        ApiFailure::from(e)
    })?;
    tracing::info!(user_id = %user.id, task_id = %id, "task deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Router and startup
// ---------------------------------------------------------------------------

/// Builds the application router with CORS restricted to `cors_origins`.
pub fn router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .route("/", get(health))
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/", get(list_tasks).post(create_task))
        .route("/tasks/{id}", put(update_task).delete(delete_task))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Starts the server from a resolved [`ServerConfig`] and returns the bound
/// address and a join handle.
///
/// This is the entry point used by `main.rs`.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the configured address.
pub async fn start_server(
    config: &ServerConfig,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let state = Arc::new(AppState::with_token_ttl(config.token_ttl));
    start_server_with_state(&config.bind_addr, state, &config.cors_origins).await
}

/// Starts the server with a pre-built [`AppState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<AppState>,
    cors_origins: &[String],
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state, cors_origins);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}

/// Starts the server on `127.0.0.1:0` with default configuration.
///
/// Used by tests in this workspace; the OS picks the port.
///
/// # Errors
///
/// Returns an error if the loopback listener cannot be bound.
pub async fn start_local_server() -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        ..ServerConfig::default()
    };
    start_server(&config).await
}
