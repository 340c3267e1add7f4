// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `coopauth` subcommands.

use reqwest::Method;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::SessionConfig;
use crate::error::{ErrorCode, ErrorResponse};
use crate::events::SessionEvent;
use crate::pipeline::ApiRequest;
use crate::session::Session;
use crate::store::CredentialPair;

/// Client-side session manager for coop's HTTP API.
#[derive(Debug, clap::Parser)]
#[command(name = "coopauth", version)]
pub struct Cli {
    #[command(flatten)]
    pub config: SessionConfig,

    /// Log format (json or text).
    #[arg(long, env = "COOPAUTH_LOG_FORMAT", default_value = "text", global = true)]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "COOPAUTH_LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Store a credential pair obtained from the login flow.
    Login {
        #[arg(long, env = "COOPAUTH_ACCESS_TOKEN", hide_env_values = true)]
        access_token: String,
        #[arg(long, env = "COOPAUTH_REFRESH_TOKEN", hide_env_values = true)]
        refresh_token: String,
    },
    /// Forget stored credentials.
    Logout,
    /// Print session diagnostics as JSON.
    Status,
    /// Renew credentials now.
    Refresh,
    /// Send one authenticated request and print the response body.
    Request {
        /// HTTP method (GET, POST, PUT, DELETE, ...).
        method: String,
        /// Path relative to the base URL.
        path: String,
        /// JSON request body.
        #[arg(long)]
        data: Option<String>,
    },
    /// Keep the session fresh and print events as JSON lines until Ctrl-C.
    Watch,
}

/// Run a subcommand. Returns the process exit code.
pub async fn run(cli: Cli) -> anyhow::Result<i32> {
    let session = Session::new(&cli.config);

    match cli.command {
        Command::Login { access_token, refresh_token } => {
            match session.login(CredentialPair::new(access_token, refresh_token)) {
                Ok(()) => {
                    print_json(&session.status())?;
                    Ok(0)
                }
                Err(e) => fail(e.code(), e.to_string()),
            }
        }
        Command::Logout => {
            session.logout();
            Ok(0)
        }
        Command::Status => {
            print_json(&session.status())?;
            Ok(0)
        }
        Command::Refresh => match session.refresh().await {
            Ok(_) => {
                print_json(&session.status())?;
                Ok(0)
            }
            Err(e) => fail(e.code(), e.to_string()),
        },
        Command::Request { method, path, data } => {
            let method = match Method::from_bytes(method.to_uppercase().as_bytes()) {
                Ok(method) => method,
                Err(e) => return fail(ErrorCode::RequestFailed, format!("invalid method: {e}")),
            };
            let mut req = ApiRequest::new(method, path);
            if let Some(data) = data {
                match serde_json::from_str(&data) {
                    Ok(body) => req = req.with_json(body),
                    Err(e) => return fail(ErrorCode::RequestFailed, format!("invalid --data JSON: {e}")),
                }
            }
            match session.client().send(req).await {
                Ok(resp) => {
                    println!("{}", resp.text());
                    Ok(0)
                }
                Err(e) => fail(e.code(), e.to_string()),
            }
        }
        Command::Watch => watch(&session).await,
    }
}

async fn watch(session: &Session) -> anyhow::Result<i32> {
    let mut rx = session.subscribe();
    if !session.resume() {
        return fail(ErrorCode::NoRefreshToken, "no stored session to watch");
    }

    let code = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break 0,
            event = rx.recv() => match event {
                Ok(event) => {
                    print_json(&event)?;
                    if matches!(event, SessionEvent::SessionExpired { .. } | SessionEvent::LoggedOut) {
                        break 1;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "watch lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break 0,
            },
        }
    };

    session.teardown();
    Ok(code)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn fail(code: ErrorCode, message: impl Into<String>) -> anyhow::Result<i32> {
    let body = ErrorResponse { error: code.to_error_body(message) };
    eprintln!("{}", serde_json::to_string(&body)?);
    Ok(1)
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
