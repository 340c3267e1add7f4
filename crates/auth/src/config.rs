// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the session core: endpoints, timer periods, and expiry thresholds.
#[derive(Debug, Clone, clap::Args)]
pub struct SessionConfig {
    /// Base URL every API path is joined onto.
    #[arg(long, default_value = "http://127.0.0.1:8000/api/v1", env = "COOPAUTH_BASE_URL")]
    pub base_url: String,

    /// Path of the renewal endpoint, relative to the base URL.
    #[arg(long, default_value = "/auth/refresh", env = "COOPAUTH_REFRESH_PATH")]
    pub refresh_path: String,

    /// Overall timeout for every outbound request, renewal included.
    #[arg(long, default_value_t = 10_000, env = "COOPAUTH_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Access-check timer period in milliseconds.
    #[arg(long, default_value_t = 60_000, env = "COOPAUTH_ACCESS_CHECK_MS")]
    pub access_check_ms: u64,

    /// Refresh-check timer period in milliseconds.
    #[arg(long, default_value_t = 43_200_000, env = "COOPAUTH_REFRESH_CHECK_MS")]
    pub refresh_check_ms: u64,

    /// Renew when the access token expires within this many milliseconds.
    #[arg(long, default_value_t = 300_000, env = "COOPAUTH_ACCESS_THRESHOLD_MS")]
    pub access_threshold_ms: u64,

    /// Renew when the refresh token expires within this many milliseconds.
    #[arg(long, default_value_t = 86_400_000, env = "COOPAUTH_REFRESH_THRESHOLD_MS")]
    pub refresh_threshold_ms: u64,

    /// Minimum gap between two announced renewals.
    #[arg(long, default_value_t = 10_000, env = "COOPAUTH_NOTICE_THROTTLE_MS")]
    pub notice_throttle_ms: u64,

    /// Credential file. Defaults to `session.json` in the state directory.
    #[arg(long, env = "COOPAUTH_STATE_FILE")]
    pub state_file: Option<PathBuf>,

    /// Keep credentials in memory only.
    #[arg(long, env = "COOPAUTH_EPHEMERAL")]
    pub ephemeral: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api/v1".to_owned(),
            refresh_path: "/auth/refresh".to_owned(),
            request_timeout_ms: 10_000,
            access_check_ms: 60_000,
            refresh_check_ms: 43_200_000,
            access_threshold_ms: 300_000,
            refresh_threshold_ms: 86_400_000,
            notice_throttle_ms: 10_000,
            state_file: None,
            ephemeral: false,
        }
    }
}

impl SessionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn access_check_interval(&self) -> Duration {
        Duration::from_millis(self.access_check_ms)
    }

    pub fn refresh_check_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_check_ms)
    }

    pub fn access_threshold(&self) -> Duration {
        Duration::from_millis(self.access_threshold_ms)
    }

    pub fn refresh_threshold(&self) -> Duration {
        Duration::from_millis(self.refresh_threshold_ms)
    }

    pub fn notice_throttle(&self) -> Duration {
        Duration::from_millis(self.notice_throttle_ms)
    }

    /// Full URL of the renewal endpoint.
    pub fn refresh_url(&self) -> String {
        join_url(&self.base_url, &self.refresh_path)
    }

    /// Resolved credential file, or `None` when running ephemeral.
    pub fn state_file(&self) -> Option<PathBuf> {
        if self.ephemeral {
            return None;
        }
        Some(self.state_file.clone().unwrap_or_else(|| state_dir().join("session.json")))
    }
}

/// Resolve the state directory for persisted credentials.
///
/// Checks `COOPAUTH_STATE_DIR`, then `$XDG_STATE_HOME/coop/auth`,
/// then `$HOME/.local/state/coop/auth`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("COOPAUTH_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("coop/auth");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/coop/auth");
    }
    PathBuf::from(".coop/auth")
}

/// Join a base URL and a path with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.is_empty() {
        return base.to_owned();
    }
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_owned();
    }
    format!("{base}/{}", path.trim_start_matches('/'))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
