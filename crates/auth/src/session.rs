// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session manager: wires the store, clock, coordinator, timers, and
//! request pipeline for one login session.
//!
//! Each [`Session`] is independent; nothing here is process-global.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::clock::{CredentialClock, DecodeError};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::pipeline::AuthedClient;
use crate::refresh::{HttpRenewer, RefreshCoordinator, Renewer};
use crate::store::{CredentialPair, CredentialStore, TokenKind};

/// One client session.
pub struct Session {
    coordinator: Arc<RefreshCoordinator>,
    client: AuthedClient,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    /// Build a session from config: file or memory store, HTTP renewal,
    /// wall-clock expiry.
    pub fn new(config: &SessionConfig) -> Self {
        let store = match config.state_file() {
            Some(path) => CredentialStore::open(path),
            None => CredentialStore::in_memory(),
        };
        Self::with_parts(
            config,
            Arc::new(store),
            CredentialClock::system(),
            Arc::new(HttpRenewer::from_config(config)),
        )
    }

    /// Build a session from explicit parts.
    pub fn with_parts(
        config: &SessionConfig,
        store: Arc<CredentialStore>,
        clock: CredentialClock,
        renewer: Arc<dyn Renewer>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        let coordinator = RefreshCoordinator::new(config, store, clock, renewer, events.clone());
        let client = AuthedClient::new(config, Arc::clone(&coordinator));
        Self { coordinator, client, events }
    }

    /// Resume a persisted session: start the timers if a full pair is stored.
    pub fn resume(&self) -> bool {
        let started = self.coordinator.scheduler().start(&self.coordinator);
        if started {
            tracing::info!("resumed stored session");
        }
        started
    }

    /// Stop background work without touching stored credentials.
    pub fn teardown(&self) {
        self.coordinator.scheduler().stop();
    }

    /// Entry point for the login flow: store the pair and start the timers.
    pub fn login(&self, pair: CredentialPair) -> Result<(), SessionError> {
        if !pair.is_complete() {
            return Err(SessionError::IncompleteCredentials);
        }
        self.coordinator.install(&pair);
        let _ = self.events.send(SessionEvent::LoggedIn);
        tracing::info!("logged in");
        Ok(())
    }

    /// Forget credentials and stop the timers.
    pub fn logout(&self) {
        self.coordinator.clear();
        let _ = self.events.send(SessionEvent::LoggedOut);
        tracing::info!("logged out");
    }

    /// Renew now, or join the renewal in flight.
    pub async fn refresh(&self) -> Result<String, SessionError> {
        self.coordinator.request_refresh().await
    }

    pub fn is_logged_in(&self) -> bool {
        self.coordinator.store().has()
    }

    /// Current access token for consumers that attach it themselves
    /// (e.g. a WebSocket handshake). `None` unless a full pair is stored.
    pub fn access_token(&self) -> Option<String> {
        self.coordinator.store().pair().map(|p| p.access_token)
    }

    pub fn client(&self) -> &AuthedClient {
        &self.client
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the session for diagnostics.
    pub fn status(&self) -> SessionStatus {
        let store = self.coordinator.store();
        let clock = self.coordinator.clock();
        let scheduler = self.coordinator.scheduler();
        let describe = |kind: TokenKind| {
            store.get(kind).map(|token| TokenStatus::describe(clock, kind, &token, scheduler.threshold(kind)))
        };
        SessionStatus {
            logged_in: store.has(),
            renewal_in_flight: self.coordinator.is_in_flight(),
            timers_running: scheduler.is_running(),
            state_file: store.path().map(|p| p.display().to_string()),
            access: describe(TokenKind::Access),
            refresh: describe(TokenKind::Refresh),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Diagnostic view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub logged_in: bool,
    pub renewal_in_flight: bool,
    pub timers_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<TokenStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<TokenStatus>,
}

/// Diagnostic view of one stored token. Never includes the token itself.
#[derive(Debug, Clone, Serialize)]
pub struct TokenStatus {
    pub key: &'static str,
    pub length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<i64>,
    pub expiring_soon: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decode_error: Option<String>,
}

impl TokenStatus {
    fn describe(
        clock: &CredentialClock,
        kind: TokenKind,
        token: &str,
        threshold: std::time::Duration,
    ) -> Self {
        let remaining = clock.remaining_ms(token);
        Self {
            key: kind.key(),
            length: token.len(),
            expires_in_secs: remaining.as_ref().ok().map(|ms| ms / 1000),
            expiring_soon: clock.is_expiring_soon(token, threshold),
            decode_error: remaining.err().map(|e: DecodeError| e.to_string()),
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
