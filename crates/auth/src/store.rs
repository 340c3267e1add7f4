// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential storage: the access/refresh pair, optionally backed by a JSON
//! file with atomic writes.
//!
//! Pure storage. Starting or stopping renewal timers is the caller's job.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Which of the two credentials to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    /// Fixed key the credential is persisted under.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Access => "access_token",
            Self::Refresh => "refresh_token",
        }
    }
}

/// A complete access/refresh pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self { access_token: access_token.into(), refresh_token: refresh_token.into() }
    }

    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }
}

/// On-disk layout: two optional strings under fixed keys.
///
/// Either key may be missing in a hand-edited or half-written file; such a
/// partial state reads as logged out.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PersistedTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl PersistedTokens {
    fn get(&self, kind: TokenKind) -> Option<&str> {
        let value = match kind {
            TokenKind::Access => self.access_token.as_deref(),
            TokenKind::Refresh => self.refresh_token.as_deref(),
        };
        value.filter(|v| !v.is_empty())
    }
}

/// Access and refresh credentials with all-or-nothing updates.
pub struct CredentialStore {
    tokens: RwLock<PersistedTokens>,
    path: Option<PathBuf>,
}

impl CredentialStore {
    /// Store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self { tokens: RwLock::new(PersistedTokens::default()), path: None }
    }

    /// Store backed by a JSON file. A missing or unreadable file starts
    /// logged out.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let tokens = if path.exists() {
            match load(&path) {
                Ok(tokens) => tokens,
                Err(e) => {
                    tracing::warn!(path = %path.display(), err = %e, "ignoring unreadable credential file");
                    PersistedTokens::default()
                }
            }
        } else {
            PersistedTokens::default()
        };
        Self { tokens: RwLock::new(tokens), path: Some(path) }
    }

    /// Read one credential. Empty strings read as absent.
    pub fn get(&self, kind: TokenKind) -> Option<String> {
        self.tokens.read().get(kind).map(str::to_owned)
    }

    pub fn access_token(&self) -> Option<String> {
        self.get(TokenKind::Access)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.get(TokenKind::Refresh)
    }

    /// Both credentials, or `None` for any partial state.
    pub fn pair(&self) -> Option<CredentialPair> {
        let tokens = self.tokens.read();
        let access = tokens.get(TokenKind::Access)?;
        let refresh = tokens.get(TokenKind::Refresh)?;
        Some(CredentialPair::new(access, refresh))
    }

    /// Whether a full pair is stored.
    pub fn has(&self) -> bool {
        let tokens = self.tokens.read();
        tokens.get(TokenKind::Access).is_some() && tokens.get(TokenKind::Refresh).is_some()
    }

    /// Replace both credentials in one step.
    pub(crate) fn set(&self, pair: &CredentialPair) {
        self.replace(PersistedTokens {
            access_token: Some(pair.access_token.clone()),
            refresh_token: Some(pair.refresh_token.clone()),
        });
    }

    /// Remove both credentials.
    pub(crate) fn clear(&self) {
        self.replace(PersistedTokens::default());
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Stage the file write outside the lock; only the rename and the
    /// in-memory swap happen under it, so file order matches memory order.
    fn replace(&self, next: PersistedTokens) {
        let staged = self.stage(&next);
        let mut tokens = self.tokens.write();
        if let (Some(tmp), Some(path)) = (staged, self.path.as_deref()) {
            if let Err(e) = std::fs::rename(&tmp, path) {
                tracing::warn!(path = %path.display(), err = %e, "failed to persist credentials");
                let _ = std::fs::remove_file(&tmp);
            }
        }
        *tokens = next;
    }

    fn stage(&self, tokens: &PersistedTokens) -> Option<PathBuf> {
        let path = self.path.as_deref()?;
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                if let Err(e) = std::fs::create_dir_all(dir) {
                    tracing::warn!(err = %e, "failed to create state dir");
                    return None;
                }
            }
        }
        match write_temp(path, tokens) {
            Ok(tmp) => Some(tmp),
            Err(e) => {
                tracing::warn!(path = %path.display(), err = %e, "failed to persist credentials");
                None
            }
        }
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("has_pair", &self.has())
            .field("path", &self.path)
            .finish()
    }
}

/// Load persisted credentials from a JSON file.
pub fn load(path: &Path) -> anyhow::Result<PersistedTokens> {
    let contents = std::fs::read_to_string(path)?;
    let tokens: PersistedTokens = serde_json::from_str(&contents)?;
    Ok(tokens)
}

/// Save credentials to a JSON file atomically (write tmp + rename).
pub fn save(path: &Path, tokens: &PersistedTokens) -> anyhow::Result<()> {
    let tmp = write_temp(path, tokens)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Write credentials to a sibling temp file and return its path.
///
/// The temp name is unique per process and call so two saves racing on the
/// same directory never share a half-written file.
fn write_temp(path: &Path, tokens: &PersistedTokens) -> anyhow::Result<PathBuf> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let json = serde_json::to_string_pretty(tokens)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    Ok(tmp_path)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
