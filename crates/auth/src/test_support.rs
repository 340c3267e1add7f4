// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for unit tests: unsigned tokens and a scripted renewer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::clock::{CredentialClock, TimeSource, TokioTimeSource};
use crate::refresh::{Renewer, TokenResponse};

/// Build an unsigned three-segment token carrying `exp` and a marker claim.
pub fn mint(exp_secs: i64, marker: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = serde_json::json!({ "exp": exp_secs, "sub": marker });
    let payload = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

/// Token expiring `secs_from_now` seconds after `clock`'s now.
pub fn mint_in(clock: &CredentialClock, secs_from_now: i64, marker: &str) -> String {
    mint(clock.now_ms() / 1000 + secs_from_now, marker)
}

/// Clock anchored to tokio's (possibly paused) time.
pub fn tokio_clock() -> CredentialClock {
    CredentialClock::new(Arc::new(TokioTimeSource::new()))
}

/// Clock frozen at a fixed epoch millisecond.
pub struct FixedTime(pub i64);

impl TimeSource for FixedTime {
    fn now_ms(&self) -> i64 {
        self.0
    }
}

/// What the scripted renewer answers on a call.
#[derive(Clone)]
pub enum Reply {
    Ok(TokenResponse),
    Err(String),
}

/// Renewer that counts calls and answers from a script.
///
/// With an empty script it mints a fresh pair (access valid 600 s, refresh
/// valid 7 days) numbered by call count. When gated, every call parks until
/// the gate is notified so concurrent callers pile up in flight.
pub struct FakeRenewer {
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<String>>,
    script: Mutex<VecDeque<Reply>>,
    clock: CredentialClock,
    gate: Option<Arc<Notify>>,
}

impl FakeRenewer {
    pub fn new(clock: CredentialClock) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            clock,
            gate: None,
        })
    }

    pub fn gated(clock: CredentialClock, gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            clock,
            gate: Some(gate),
        })
    }

    pub fn push(&self, reply: Reply) {
        self.script.lock().push_back(reply);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Renewer for FakeRenewer {
    fn renew<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, anyhow::Result<TokenResponse>> {
        Box::pin(async move {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.seen.lock().push(refresh_token.to_owned());
            if let Some(ref gate) = self.gate {
                gate.notified().await;
            }
            let scripted = self.script.lock().pop_front();
            match scripted {
                Some(Reply::Ok(token)) => Ok(token),
                Some(Reply::Err(e)) => anyhow::bail!(e),
                None => Ok(TokenResponse {
                    access_token: mint_in(&self.clock, 600, &format!("access-{n}")),
                    refresh_token: Some(mint_in(&self.clock, 7 * 24 * 3600, &format!("refresh-{n}"))),
                    token_type: Some("bearer".to_owned()),
                }),
            }
        })
    }
}
