// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight credential renewal.
//!
//! [`RefreshCoordinator`] owns every credential write. At most one renewal
//! call is outstanding at any time; callers arriving while one is in flight
//! share its outcome. A failed renewal is terminal for the cycle: the store
//! is cleared, timers stop, and one `SessionExpired` event goes out.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use crate::clock::{self, CredentialClock};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::events::{NoticeThrottle, SessionEvent};
use crate::schedule::RenewalScheduler;
use crate::store::{CredentialPair, CredentialStore};

/// Body returned by the renewal endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Omitted by servers that do not rotate refresh tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// Performs the renewal network call.
pub trait Renewer: Send + Sync {
    fn renew<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, anyhow::Result<TokenResponse>>;
}

/// Renewer that POSTs `{ refresh_token }` to the renewal endpoint.
///
/// Uses its own client rather than the authenticated pipeline so a rejected
/// renewal never re-enters renewal.
pub struct HttpRenewer {
    http: reqwest::Client,
    url: String,
}

impl HttpRenewer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        crate::ensure_crypto();
        let http = reqwest::Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { http, url: url.into() }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.refresh_url(), config.request_timeout())
    }
}

impl Renewer for HttpRenewer {
    fn renew<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, anyhow::Result<TokenResponse>> {
        Box::pin(do_refresh(&self.http, &self.url, refresh_token))
    }
}

/// Perform a single renewal request.
pub async fn do_refresh(
    client: &reqwest::Client,
    url: &str,
    refresh_token: &str,
) -> anyhow::Result<TokenResponse> {
    let resp = client
        .post(url)
        .json(&serde_json::json!({ "refresh_token": refresh_token }))
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        anyhow::bail!("refresh failed ({status}): {text}");
    }

    let token: TokenResponse = resp.json().await?;
    Ok(token)
}

type Outcome = Result<String, SessionError>;

enum RefreshState {
    Idle,
    /// Receiver shared with every caller of the current cycle.
    InFlight(watch::Receiver<Option<Outcome>>),
}

/// Coordinates renewal and owns all credential writes.
pub struct RefreshCoordinator {
    store: Arc<CredentialStore>,
    clock: CredentialClock,
    renewer: Arc<dyn Renewer>,
    scheduler: RenewalScheduler,
    /// Session epoch, bumped by every login and clear. Held across every
    /// credential write and timer start/stop so a renewal started under an
    /// older epoch can never land after a newer login or logout. Lock order:
    /// `epoch` before `state`.
    epoch: Mutex<u64>,
    state: Mutex<RefreshState>,
    events: broadcast::Sender<SessionEvent>,
    notices: NoticeThrottle,
    renew_timeout: Duration,
}

impl RefreshCoordinator {
    pub fn new(
        config: &SessionConfig,
        store: Arc<CredentialStore>,
        clock: CredentialClock,
        renewer: Arc<dyn Renewer>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            scheduler: RenewalScheduler::new(config, clock.clone()),
            store,
            clock,
            renewer,
            state: Mutex::new(RefreshState::Idle),
            epoch: Mutex::new(0),
            events,
            notices: NoticeThrottle::new(config.notice_throttle()),
            renew_timeout: config.request_timeout(),
        })
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn clock(&self) -> &CredentialClock {
        &self.clock
    }

    pub fn scheduler(&self) -> &RenewalScheduler {
        &self.scheduler
    }

    /// Whether a renewal call is outstanding.
    pub fn is_in_flight(&self) -> bool {
        matches!(*self.state.lock(), RefreshState::InFlight(_))
    }

    /// Install a pair from the login flow and (re)start the timers.
    pub fn install(self: &Arc<Self>, pair: &CredentialPair) {
        let mut epoch = self.epoch.lock();
        *epoch += 1;
        self.store.set(pair);
        self.scheduler.start(self);
    }

    /// Clear credentials and stop the timers.
    pub fn clear(&self) {
        let mut epoch = self.epoch.lock();
        *epoch += 1;
        self.scheduler.stop();
        self.store.clear();
    }

    /// Renew credentials, or join the renewal already in flight.
    ///
    /// Resolves to the new access token. Every caller of one cycle gets the
    /// same outcome.
    pub async fn request_refresh(self: &Arc<Self>) -> Result<String, SessionError> {
        let mut rx = self.begin()?;
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| {
            Err(SessionError::RenewalFailed("renewal ended without an outcome".to_owned()))
        })
    }

    /// Start a renewal unless one is in flight, without waiting for it.
    pub fn trigger_refresh(self: &Arc<Self>) {
        if let Err(e) = self.begin() {
            tracing::debug!(err = %e, "proactive renewal skipped");
        }
    }

    fn begin(self: &Arc<Self>) -> Result<watch::Receiver<Option<Outcome>>, SessionError> {
        let current = self.epoch.lock();
        let mut state = self.state.lock();
        if let RefreshState::InFlight(ref rx) = *state {
            // A dropped sender means the cycle died without reporting; start over.
            if rx.has_changed().is_ok() {
                return Ok(rx.clone());
            }
        }

        let refresh_token = self.store.refresh_token().ok_or(SessionError::NoRefreshToken)?;
        let (tx, rx) = watch::channel(None);
        *state = RefreshState::InFlight(rx.clone());
        let started = *current;

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let result = this.renew(&refresh_token).await;
            let outcome = this.complete(started, result);
            let _ = tx.send(Some(outcome));
        });
        tracing::debug!("renewal started");
        Ok(rx)
    }

    async fn renew(&self, refresh_token: &str) -> Result<CredentialPair, String> {
        let response =
            match tokio::time::timeout(self.renew_timeout, self.renewer.renew(refresh_token)).await
            {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => return Err(format!("{e:#}")),
                Err(_) => return Err(format!("renewal timed out after {:?}", self.renew_timeout)),
            };

        if response.access_token.is_empty() {
            return Err("renewal response carried no access token".to_owned());
        }
        if let Err(e) = clock::decode(&response.access_token) {
            tracing::warn!(err = %e, "renewed access token does not decode; it will renew on the next check");
        }
        let refresh = response
            .refresh_token
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| refresh_token.to_owned());
        Ok(CredentialPair::new(response.access_token, refresh))
    }

    /// Apply a renewal result and return the outcome for the waiters.
    fn complete(self: &Arc<Self>, started: u64, result: Result<CredentialPair, String>) -> Outcome {
        let mut epoch = self.epoch.lock();
        if *epoch != started {
            // Logged in or out while the call was in flight; leave that alone.
            *self.state.lock() = RefreshState::Idle;
            tracing::info!("discarding renewal result from a superseded session");
            return self.store.pair().map(|p| p.access_token).ok_or_else(|| {
                SessionError::RenewalFailed("session was cleared during renewal".to_owned())
            });
        }

        match result {
            Ok(pair) => {
                self.store.set(&pair);
                self.scheduler.start(self);
                *self.state.lock() = RefreshState::Idle;

                let announce = self.notices.allow();
                let _ = self.events.send(SessionEvent::Renewed { announce });
                tracing::info!("credentials renewed");
                Ok(pair.access_token)
            }
            Err(reason) => {
                *epoch += 1;
                self.scheduler.stop();
                self.store.clear();
                *self.state.lock() = RefreshState::Idle;

                let _ = self.events.send(SessionEvent::SessionExpired { reason: reason.clone() });
                tracing::warn!(err = %reason, "credential renewal failed, session cleared");
                Err(SessionError::RenewalFailed(reason))
            }
        }
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
