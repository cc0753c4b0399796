//! HTTP implementation of [`TaskApi`] backed by `reqwest`.
//!
//! Also exposes the signup and login calls, which are not part of the task
//! resource but share the same base URL and error handling.

use std::time::Duration;

use alldone_proto::auth::{AuthResponse, UserCredentials};
use alldone_proto::task::{ErrorBody, Task, TaskCreate, TaskId, TaskUpdate};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::{ApiError, TaskApi};

/// REST client for the Alldone server.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base: Url,
}

impl RestClient {
    /// Creates a client for the server at `base`.
    ///
    /// `timeout` bounds every request end to end.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NetworkFailure`] if `base` cannot carry a path
    /// (e.g. `mailto:`) or the HTTP client cannot be initialized.
    pub fn new(base: Url, timeout: Duration) -> Result<Self, ApiError> {
        if base.cannot_be_a_base() {
            return Err(ApiError::network(format!("unusable base URL: {base}")));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::network(e.to_string()))?;
        Ok(Self { http, base })
    }

    /// Returns the base URL requests are resolved against.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base
    }

    /// `POST /auth/signup`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure or a non-2xx response.
    pub async fn sign_up(&self, credentials: &UserCredentials) -> Result<AuthResponse, ApiError> {
        let request = self
            .http
            .post(self.endpoint(&["auth", "signup"]))
            .json(credentials);
        read_json(send(request).await?).await
    }

    /// `POST /auth/login`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure or a non-2xx response.
    pub async fn sign_in(&self, credentials: &UserCredentials) -> Result<AuthResponse, ApiError> {
        let request = self
            .http
            .post(self.endpoint(&["auth", "login"]))
            .json(credentials);
        read_json(send(request).await?).await
    }

    /// Resolves `segments` below the base path; each segment is
    /// percent-encoded, so opaque task IDs are safe to pass.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

impl TaskApi for RestClient {
    async fn list(&self, token: &str) -> Result<Vec<Task>, ApiError> {
        let request = self.http.get(self.endpoint(&["tasks", ""])).bearer_auth(token);
        read_json(send(request).await?).await
    }

    async fn create(&self, token: &str, create: &TaskCreate) -> Result<Task, ApiError> {
        let request = self
            .http
            .post(self.endpoint(&["tasks", ""]))
            .bearer_auth(token)
            .json(create);
        read_json(send(request).await?).await
    }

    async fn update(
        &self,
        token: &str,
        id: &TaskId,
        update: &TaskUpdate,
    ) -> Result<Task, ApiError> {
        let request = self
            .http
            .put(self.endpoint(&["tasks", id.as_str()]))
            .bearer_auth(token)
            .json(update);
        read_json(send(request).await?).await
    }

    async fn delete(&self, token: &str, id: &TaskId) -> Result<(), ApiError> {
        let request = self
            .http
            .delete(self.endpoint(&["tasks", id.as_str()]))
            .bearer_auth(token);
        send(request).await?;
        Ok(())
    }
}

/// Sends a request and turns non-2xx responses into
/// [`ApiError::RemoteRejected`].
async fn send(request: RequestBuilder) -> Result<Response, ApiError> {
    let response = request.send().await.map_err(|e| {
        tracing::warn!(error = %e, "request failed before a response arrived");
        ApiError::network(e.to_string())
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = rejection_message(status, &body);
    tracing::warn!(status = status.as_u16(), message = %message, "request rejected");
    Err(ApiError::rejected(status.as_u16(), message))
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    response
        .json()
        .await
        .map_err(|e| ApiError::network(format!("malformed response body: {e}")))
}

/// The server's `detail` if the body carries one, otherwise the status text.
fn rejection_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|b| b.detail)
        .filter(|detail| !detail.is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .map_or_else(|| status.as_str().to_string(), ToString::to_string)
        })
}
