// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential expiry evaluation.
//!
//! Tokens are decoded structurally: the payload segment is base64url-decoded
//! and parsed as JSON to read `exp`. The signature is never verified here.
//! The client only needs the expiry to schedule renewal; trust is enforced
//! by the server on every request.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::ErrorCode;

/// Claims read from a token payload. Everything except `exp` is kept opaque.
#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    /// Expiry as whole epoch seconds. A fractional NumericDate is floored.
    pub exp: i64,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Claims {
    pub fn expires_at_ms(&self) -> i64 {
        self.exp.saturating_mul(1000)
    }
}

/// Why a token could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not three dot-separated segments.
    Segments(usize),
    /// Payload segment is not valid base64url.
    Base64,
    /// Payload is not a JSON object.
    Json(String),
    /// Payload has no numeric `exp` claim.
    MissingExpiry,
}

impl DecodeError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::MalformedToken
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Segments(n) => write!(f, "expected 3 token segments, found {n}"),
            Self::Base64 => f.write_str("token payload is not base64url"),
            Self::Json(e) => write!(f, "token payload is not JSON: {e}"),
            Self::MissingExpiry => f.write_str("token payload has no exp claim"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode a token's claims without verifying its signature.
pub fn decode(token: &str) -> Result<Claims, DecodeError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(DecodeError::Segments(segments.len()));
    }
    // Some issuers keep the padding; URL_SAFE_NO_PAD rejects it.
    let payload = segments[1].trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD.decode(payload).map_err(|_| DecodeError::Base64)?;

    let value: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|e| DecodeError::Json(e.to_string()))?;
    let serde_json::Value::Object(mut extra) = value else {
        return Err(DecodeError::Json("payload is not an object".to_owned()));
    };
    let exp = extra.remove("exp").as_ref().and_then(exp_seconds).ok_or(DecodeError::MissingExpiry)?;
    Ok(Claims { exp, extra })
}

/// Read a NumericDate as whole seconds. Integers pass through, fractions are
/// floored, and anything outside the `i64` range is rejected.
fn exp_seconds(value: &serde_json::Value) -> Option<i64> {
    if let Some(secs) = value.as_i64() {
        return Some(secs);
    }
    if value.is_u64() {
        return Some(i64::MAX);
    }
    let secs = value.as_f64()?.floor();
    if !secs.is_finite() || secs < i64::MIN as f64 || secs >= i64::MAX as f64 {
        return None;
    }
    Some(secs as i64)
}

/// Source of the current epoch time in milliseconds.
pub trait TimeSource: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> i64 {
        epoch_ms()
    }
}

/// Epoch time anchored once, then advanced by tokio's clock.
///
/// Follows `tokio::time::pause`/`advance`, so expiry evaluation and the
/// renewal timers move together under a paused runtime.
#[derive(Debug, Clone, Copy)]
pub struct TokioTimeSource {
    anchor_ms: i64,
    anchor: tokio::time::Instant,
}

impl TokioTimeSource {
    pub fn new() -> Self {
        Self { anchor_ms: epoch_ms(), anchor: tokio::time::Instant::now() }
    }
}

impl Default for TokioTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for TokioTimeSource {
    fn now_ms(&self) -> i64 {
        let elapsed = self.anchor.elapsed().as_millis() as i64;
        self.anchor_ms.saturating_add(elapsed)
    }
}

/// Answers "is this token expiring within a threshold?".
#[derive(Clone)]
pub struct CredentialClock {
    time: Arc<dyn TimeSource>,
}

impl CredentialClock {
    pub fn new(time: Arc<dyn TimeSource>) -> Self {
        Self { time }
    }

    /// Clock backed by wall-clock time.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemTimeSource))
    }

    pub fn now_ms(&self) -> i64 {
        self.time.now_ms()
    }

    /// Milliseconds until the token expires (negative once expired).
    pub fn remaining_ms(&self, token: &str) -> Result<i64, DecodeError> {
        let claims = decode(token)?;
        Ok(claims.expires_at_ms().saturating_sub(self.now_ms()))
    }

    /// True when the token expires within `threshold`, or cannot be decoded.
    ///
    /// The boundary renews: a token expiring exactly `threshold` from now
    /// counts as expiring soon.
    pub fn is_expiring_soon(&self, token: &str, threshold: Duration) -> bool {
        let threshold_ms = i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX);
        match self.remaining_ms(token) {
            Ok(remaining) => remaining <= threshold_ms,
            Err(e) => {
                tracing::debug!(err = %e, "undecodable token treated as expiring");
                true
            }
        }
    }
}

impl Default for CredentialClock {
    fn default() -> Self {
        Self::system()
    }
}

impl fmt::Debug for CredentialClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialClock").field("now_ms", &self.now_ms()).finish()
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
