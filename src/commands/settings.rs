use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::{payload_string, to_value, AppState};
use crate::api::AdminClient;
use crate::config::AppConfig;
use crate::storage;

/// Build a client from `config` and start a fresh session with it.
pub fn connect_from_config(
    state: &mut AppState<AdminClient>,
    config: &AppConfig,
) -> Result<(), String> {
    let client = AdminClient::from_config(config).map_err(|e| e.to_string())?;
    info!(admin_url = %client.base_url(), branch_id = ?config.branch_id, "connecting");
    state.connect(Arc::new(client), config.branch_id);
    Ok(())
}

/// Reload settings after the keyring changed. Environment variables still win.
fn reconnect(state: &mut AppState<AdminClient>) -> Result<bool, String> {
    match AppConfig::load() {
        Ok(config) => {
            connect_from_config(state, &config)?;
            Ok(true)
        }
        Err(e) => {
            warn!(error = %e, "no usable configuration, disconnecting");
            state.disconnect();
            Ok(false)
        }
    }
}

pub(crate) fn store_connection_string(
    state: &mut AppState<AdminClient>,
    payload: &Value,
) -> Result<Value, String> {
    let raw = payload_string(
        payload,
        &["connection_string", "connectionString", "value"],
    )
    .ok_or("Missing connection string")?;
    let written = storage::store_connection_string(&raw)?;
    let connected = reconnect(state)?;
    if connected {
        state.notifier.success("Connection settings saved");
    } else {
        state
            .notifier
            .warning("Connection settings saved but incomplete");
    }
    Ok(json!({ "success": true, "stored": written, "connected": connected }))
}

pub(crate) fn show() -> Value {
    storage::describe_stored()
}

pub(crate) fn clear(state: &mut AppState<AdminClient>) -> Result<Value, String> {
    storage::clear_all()?;
    let connected = reconnect(state)?;
    Ok(json!({ "success": true, "connected": connected }))
}

pub(crate) async fn check_connectivity(
    state: &mut AppState<AdminClient>,
) -> Result<Value, String> {
    let api = Arc::clone(&state.session()?.api);
    let result = api.test_connectivity().await;
    if !result.success {
        if let Some(error) = &result.error {
            state.notifier.warning(error.clone());
        }
    }
    to_value(&result)
}
