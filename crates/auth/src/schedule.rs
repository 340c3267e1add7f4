// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proactive renewal timers.
//!
//! Two recurring checks, one per credential. Each tick re-reads the store
//! and asks the coordinator for a renewal when the credential is close to
//! expiry. Both stop as soon as the session is cleared.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::clock::CredentialClock;
use crate::config::SessionConfig;
use crate::refresh::RefreshCoordinator;
use crate::store::TokenKind;

/// Period and threshold of one check.
#[derive(Debug, Clone, Copy)]
pub struct CheckSpec {
    pub kind: TokenKind,
    pub period: Duration,
    pub threshold: Duration,
}

/// Owns the two renewal timers.
pub struct RenewalScheduler {
    access: CheckSpec,
    refresh: CheckSpec,
    clock: CredentialClock,
    running: Mutex<Option<CancellationToken>>,
}

impl RenewalScheduler {
    pub fn new(config: &SessionConfig, clock: CredentialClock) -> Self {
        Self {
            access: CheckSpec {
                kind: TokenKind::Access,
                period: config.access_check_interval(),
                threshold: config.access_threshold(),
            },
            refresh: CheckSpec {
                kind: TokenKind::Refresh,
                period: config.refresh_check_interval(),
                threshold: config.refresh_threshold(),
            },
            clock,
            running: Mutex::new(None),
        }
    }

    /// Threshold applied to a credential kind.
    pub fn threshold(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access.threshold,
            TokenKind::Refresh => self.refresh.threshold,
        }
    }

    /// (Re)start both timers. Any running timers are stopped first. Does
    /// nothing unless the store holds a full pair.
    pub fn start(&self, coordinator: &Arc<RefreshCoordinator>) -> bool {
        let mut running = self.running.lock();
        if let Some(prev) = running.take() {
            prev.cancel();
        }
        if !coordinator.store().has() {
            tracing::debug!("no credential pair stored, renewal timers not started");
            return false;
        }

        let cancel = CancellationToken::new();
        for spec in [self.access, self.refresh] {
            spawn_check(spec, self.clock.clone(), Arc::downgrade(coordinator), cancel.clone());
        }
        *running = Some(cancel);
        tracing::debug!("renewal timers started");
        true
    }

    /// Stop both timers.
    pub fn stop(&self) {
        if let Some(cancel) = self.running.lock().take() {
            cancel.cancel();
            tracing::debug!("renewal timers stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().as_ref().is_some_and(|c| !c.is_cancelled())
    }
}

impl Drop for RenewalScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn one recurring check. The first tick fires one period after start.
fn spawn_check(
    spec: CheckSpec,
    clock: CredentialClock,
    coordinator: Weak<RefreshCoordinator>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + spec.period;
        let mut timer = tokio::time::interval_at(start, spec.period);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {}
            }

            let Some(coordinator) = coordinator.upgrade() else {
                break;
            };
            // A timer that outlived its session must not renew anything.
            if cancel.is_cancelled() || !coordinator.store().has() {
                tracing::debug!(kind = spec.kind.key(), "renewal check skipped, no credential pair");
                continue;
            }
            let Some(token) = coordinator.store().get(spec.kind) else {
                continue;
            };
            if clock.is_expiring_soon(&token, spec.threshold) {
                tracing::info!(kind = spec.kind.key(), "credential expiring soon, renewing");
                coordinator.trigger_refresh();
            } else {
                tracing::debug!(kind = spec.kind.key(), "credential still fresh");
            }
        }
    });
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
