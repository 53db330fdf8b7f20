//! JMS stock transfer client.
//!
//! The library holds the client side of the branch-to-branch transfer
//! workflow: item search, the transfer draft, the list and detail pages with
//! their status-driven actions, and the receive panel. The `jms-transfer`
//! binary drives it through a line-delimited JSON bridge on stdin/stdout.
//!
//! Bridge protocol, one JSON object per line:
//! - in: `{"id": 1, "command": "transfer_list", "arg0": {...}, "arg1": {...}}`
//! - out: `{"id": 1, "ok": true, "data": ...}` or `{"id": 1, "ok": false, "error": "..."}`
//! - events: `{"event": "notice", "data": {...}}`, `{"event": "barcode_scanned", ...}`,
//!   `{"event": "search_results", "data": {"keyword": ..., "generation": ..., "results": [...]}}`

use anyhow::Context;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod accumulator;
pub mod actions;
pub mod api;
pub mod commands;
pub mod config;
pub mod detail;
pub mod diagnostics;
pub mod draft;
pub mod error;
pub mod list;
pub mod models;
pub mod notify;
pub mod receive;
pub mod scanner;
pub mod search;
pub mod storage;
pub mod table;

#[cfg(test)]
mod test_support;

use commands::AppState;
use config::AppConfig;
use notify::Notifier;

const DEFAULT_LOG_FILTER: &str = "info,jms_transfer_lib=debug";
const ENV_LOG_JSON: &str = "JMS_LOG_JSON";

// ============================================================================
// Payload helpers
// ============================================================================

/// Merge the two positional arguments of a command into one payload.
/// Object keys of `arg1` win over `arg0`.
pub(crate) fn parse_channel_payload(arg0: Option<Value>, arg1: Option<Value>) -> Value {
    match (arg0, arg1) {
        (Some(Value::Object(mut obj0)), Some(Value::Object(obj1))) => {
            for (k, v) in obj1 {
                obj0.insert(k, v);
            }
            Value::Object(obj0)
        }
        (Some(v), _) => v,
        (None, Some(v)) => v,
        _ => json!({}),
    }
}

pub(crate) fn value_str(v: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = v.get(*key).and_then(|x| x.as_str()) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

pub(crate) fn value_i64(v: &Value, keys: &[&str]) -> Option<i64> {
    for key in keys {
        if let Some(n) = v.get(*key).and_then(|x| x.as_i64()) {
            return Some(n);
        }
    }
    None
}

// ============================================================================
// Bridge
// ============================================================================

#[derive(Debug, Deserialize)]
struct BridgeRequest {
    #[serde(default)]
    id: Value,
    command: String,
    #[serde(default, alias = "payload")]
    arg0: Option<Value>,
    #[serde(default)]
    arg1: Option<Value>,
}

async fn handle_line(state: &mut AppState<api::AdminClient>, line: &str) -> Value {
    let request: BridgeRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "malformed bridge request");
            return json!({ "id": Value::Null, "ok": false, "error": format!("Malformed request: {e}") });
        }
    };

    let payload = diagnostics::redact_sensitive_fields(request.arg0.clone().unwrap_or_default());
    debug!(
        id = %request.id,
        command = %request.command,
        payload = %payload,
        "command received"
    );

    match commands::invoke(state, &request.command, request.arg0, request.arg1).await {
        Ok(data) => json!({ "id": request.id, "ok": true, "data": data }),
        Err(message) => {
            debug!(command = %request.command, error = %message, "command failed");
            json!({ "id": request.id, "ok": false, "error": message })
        }
    }
}

async fn write_message<W: AsyncWrite + Unpin>(out: &mut W, message: &Value) -> anyhow::Result<()> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    out.write_all(line.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}

async fn serve() -> anyhow::Result<()> {
    let (notifier, mut notices) = Notifier::channel();
    let (scan_tx, mut scans) = mpsc::unbounded_channel();
    let (search_tx, mut search_updates) = mpsc::unbounded_channel();

    let config = AppConfig::load();
    let settings = config.as_ref().map(|c| c.search).unwrap_or_default();
    let mut state = AppState::new(notifier, scan_tx, settings).with_search_updates(search_tx);
    match &config {
        Ok(config) => {
            debug!(?config, "configuration loaded");
            commands::settings::connect_from_config(&mut state, config)
                .map_err(anyhow::Error::msg)
                .context("failed to create API client")?;
        }
        Err(e) => warn!(error = %e, "not configured, waiting for a connection string"),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = tokio::io::stdout();
    write_message(
        &mut out,
        &json!({ "event": "ready", "data": { "connected": state.is_connected() } }),
    )
    .await?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let response = handle_line(&mut state, &line).await;
                write_message(&mut out, &response).await?;
            }
            Some(notice) = notices.recv() => {
                write_message(&mut out, &json!({ "event": "notice", "data": notice })).await?;
            }
            Some(update) = search_updates.recv() => {
                write_message(&mut out, &json!({ "event": "search_results", "data": update })).await?;
            }
            Some(scan) = scans.recv() => {
                // A scan feeds the create page the same way a typed barcode does.
                let draft = if state.is_connected() {
                    commands::dispatch(&mut state, "transfer_scan", &json!({ "barcode": scan.barcode }))
                        .await
                        .ok()
                } else {
                    None
                };
                write_message(
                    &mut out,
                    &json!({ "event": "barcode_scanned", "data": scan, "draft": draft }),
                )
                .await?;
            }
        }
    }

    info!("stdin closed, shutting down");
    state.scanner.stop();
    state.disconnect();
    for notice in notify::drain(&mut notices) {
        write_message(&mut out, &json!({ "event": "notice", "data": notice })).await?;
    }
    Ok(())
}

// ============================================================================
// App entry point
// ============================================================================

fn init_logging() -> tracing_appender::non_blocking::WorkerGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    diagnostics::prune_old_logs();

    let log_dir = diagnostics::get_log_dir();
    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(&log_dir, diagnostics::LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let json_logs = std::env::var(ENV_LOG_JSON).is_ok_and(|v| v == "1" || v == "true");
    let (json_layer, text_layer) = if json_logs {
        (
            Some(fmt::layer().json().with_writer(non_blocking)),
            None,
        )
    } else {
        (
            None,
            Some(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(true),
            ),
        )
    };
    // stdout carries the bridge protocol.
    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(json_layer)
        .with(text_layer)
        .init();

    guard
}

pub fn run() {
    let guard = init_logging();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_sha = env!("BUILD_GIT_SHA"),
        "Starting JMS transfer client"
    );

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(serve()) {
        error!(error = ?e, "bridge stopped");
        drop(guard);
        std::process::exit(1);
    }
}
