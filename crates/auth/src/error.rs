// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors surfaced by the renewal entry point.
///
/// `Clone` so a single renewal outcome can be handed to every waiter of
/// that cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Renewal was requested with no stored refresh token. No network call
    /// was made.
    NoRefreshToken,
    /// The renewal call itself failed. Credentials have been cleared.
    RenewalFailed(String),
    /// A login supplied only one of the two credentials.
    IncompleteCredentials,
}

impl SessionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NoRefreshToken => ErrorCode::NoRefreshToken,
            Self::RenewalFailed(_) => ErrorCode::RenewalFailed,
            Self::IncompleteCredentials => ErrorCode::IncompleteCredentials,
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRefreshToken => f.write_str("no refresh token available"),
            Self::RenewalFailed(reason) => write!(f, "credential renewal failed: {reason}"),
            Self::IncompleteCredentials => {
                f.write_str("both an access token and a refresh token are required")
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// Machine-readable error codes, shared by the library errors and the
/// binary's JSON output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    MalformedToken,
    NoRefreshToken,
    RenewalFailed,
    IncompleteCredentials,
    Unauthorized,
    RequestFailed,
    Transport,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedToken => "MALFORMED_TOKEN",
            Self::NoRefreshToken => "NO_REFRESH_TOKEN",
            Self::RenewalFailed => "RENEWAL_FAILED",
            Self::IncompleteCredentials => "INCOMPLETE_CREDENTIALS",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::RequestFailed => "REQUEST_FAILED",
            Self::Transport => "TRANSPORT",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error envelope printed by the binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
