// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle events for UI and downstream consumers.

use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Events broadcast by the session core. Fire-and-forget: nothing in the
/// core waits on a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A credential pair was installed by the login flow.
    LoggedIn,
    /// A renewal succeeded. `announce` is throttled so a UI can show a
    /// "session renewed" notice without repeating it.
    Renewed { announce: bool },
    /// A renewal failed terminally; credentials are gone and the user must
    /// log in again. Sent once per failed renewal cycle.
    #[serde(rename = "session:expired")]
    SessionExpired { reason: String },
    /// Credentials were cleared on request.
    LoggedOut,
}

/// Lets one announcement through per window.
#[derive(Debug)]
pub struct NoticeThrottle {
    window: Duration,
    last: Mutex<Option<Instant>>,
}

impl NoticeThrottle {
    pub fn new(window: Duration) -> Self {
        Self { window, last: Mutex::new(None) }
    }

    /// Returns true if an announcement is due, and records it.
    pub fn allow(&self) -> bool {
        let now = Instant::now();
        let mut last = self.last.lock();
        match *last {
            Some(prev) if now.duration_since(prev) <= self.window => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
