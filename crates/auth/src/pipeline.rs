// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated request pipeline.
//!
//! Every request gets the stored access token as a bearer credential. A
//! response classified as an authorization failure triggers one renewal
//! and one replay of the same request; a replayed request is never
//! replayed again.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::config::{join_url, SessionConfig};
use crate::error::ErrorCode;
use crate::refresh::RefreshCoordinator;

/// One logical request. Cloning keeps the retry flag.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), body: None, retried: false }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn post_json(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, path).with_json(body)
    }

    pub fn put_json(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::PUT, path).with_json(body)
    }

    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    /// Whether this request has already been replayed after a renewal.
    pub fn is_retried(&self) -> bool {
        self.retried
    }
}

/// A response with its body fully read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// The JSON `detail` member, when it is a string.
    pub fn detail(&self) -> Option<String> {
        error_detail(&self.body)
    }
}

/// Request failures, as seen by the caller.
#[derive(Debug)]
pub enum RequestError {
    /// The server answered with a non-success status.
    Status(ApiResponse),
    /// No response: connect failure, timeout, or an unreadable body.
    Transport(reqwest::Error),
}

impl RequestError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status(resp) => Some(resp.status),
            Self::Transport(e) => e.status(),
        }
    }

    pub fn response(&self) -> Option<&ApiResponse> {
        match self {
            Self::Status(resp) => Some(resp),
            Self::Transport(_) => None,
        }
    }

    /// Whether this failure means the credential was rejected.
    pub fn is_authorization_failure(&self) -> bool {
        match self {
            Self::Status(resp) => is_authorization_failure(resp.status, &resp.body),
            Self::Transport(_) => false,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Status(_) if self.is_authorization_failure() => ErrorCode::Unauthorized,
            Self::Status(_) => ErrorCode::RequestFailed,
            Self::Transport(_) => ErrorCode::Transport,
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(resp) => match resp.detail() {
                Some(detail) => write!(f, "request failed ({}): {detail}", resp.status),
                None => write!(f, "request failed ({})", resp.status),
            },
            Self::Transport(e) => write!(f, "transport error: {e}"),
        }
    }
}

impl std::error::Error for RequestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Status(_) => None,
            Self::Transport(e) => Some(e),
        }
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e)
    }
}

/// Extract the string `detail` member of a JSON error body.
pub fn error_detail(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value.get("detail")?.as_str().map(str::to_owned)
}

/// Classify a response as a credential rejection.
///
/// 401 always counts. A 500 counts when its `detail` mentions "token" or
/// "expired" (any case): the backend reports some expired-token conditions
/// as generic server faults.
pub fn is_authorization_failure(status: StatusCode, body: &[u8]) -> bool {
    if status == StatusCode::UNAUTHORIZED {
        return true;
    }
    if status != StatusCode::INTERNAL_SERVER_ERROR {
        return false;
    }
    error_detail(body).is_some_and(|detail| {
        let detail = detail.to_lowercase();
        detail.contains("token") || detail.contains("expired")
    })
}

/// HTTP client that authenticates requests and recovers once from an
/// expired credential.
#[derive(Clone)]
pub struct AuthedClient {
    http: reqwest::Client,
    base_url: String,
    coordinator: Arc<RefreshCoordinator>,
}

impl AuthedClient {
    pub fn new(config: &SessionConfig, coordinator: Arc<RefreshCoordinator>) -> Self {
        crate::ensure_crypto();
        let http =
            reqwest::Client::builder().timeout(config.request_timeout()).build().unwrap_or_default();
        Self { http, base_url: config.base_url.clone(), coordinator }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request, renewing and replaying once on a credential rejection.
    ///
    /// If the renewal fails the first failure is returned unchanged. If the
    /// replay fails, its failure is returned and nothing is retried again.
    pub async fn send(&self, mut req: ApiRequest) -> Result<ApiResponse, RequestError> {
        // A partial pair reads as logged out: nothing is attached.
        let token = self.coordinator.store().pair().map(|p| p.access_token);
        let failure = match self.dispatch(&req, token.as_deref()).await {
            Ok(resp) => return Ok(resp),
            Err(e) => e,
        };

        if !failure.is_authorization_failure() || req.retried {
            return Err(failure);
        }
        if self.coordinator.store().refresh_token().is_none() {
            tracing::debug!(path = %req.path, "credential rejected, no refresh token to renew with");
            return Err(failure);
        }

        req.retried = true;
        tracing::debug!(method = %req.method, path = %req.path, "credential rejected, renewing");
        let renewed = match self.coordinator.request_refresh().await {
            Ok(token) => token,
            Err(e) => {
                tracing::debug!(path = %req.path, err = %e, "renewal failed, returning original failure");
                return Err(failure);
            }
        };

        // Re-read: a later renewal may already have replaced the token we were handed.
        let token = self.coordinator.store().pair().map_or(renewed, |p| p.access_token);
        self.dispatch(&req, Some(&token)).await
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, RequestError> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<ApiResponse, RequestError> {
        self.send(ApiRequest::post_json(path, body)).await
    }

    async fn dispatch(
        &self,
        req: &ApiRequest,
        token: Option<&str>,
    ) -> Result<ApiResponse, RequestError> {
        let url = join_url(&self.base_url, &req.path);
        let mut builder = self.http.request(req.method.clone(), url);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = req.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        let resp = ApiResponse { status, body };
        if status.is_success() {
            Ok(resp)
        } else {
            Err(RequestError::Status(resp))
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
