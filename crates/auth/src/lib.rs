// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coopauth: client-side session lifecycle for coop's HTTP API.
//!
//! Stores an access/refresh credential pair, renews it before expiry with
//! at most one renewal in flight, and wraps outgoing requests so a request
//! rejected for an expired credential is renewed and replayed once.

pub mod clock;
pub mod command;
pub mod config;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod refresh;
pub mod schedule;
pub mod session;
pub mod store;

#[cfg(test)]
mod test_support;

use std::sync::Once;

pub use crate::config::SessionConfig;
pub use crate::error::SessionError;
pub use crate::events::SessionEvent;
pub use crate::pipeline::{ApiRequest, ApiResponse, AuthedClient, RequestError};
pub use crate::session::Session;
pub use crate::store::{CredentialPair, TokenKind};

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times; only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
