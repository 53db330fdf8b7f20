use serde_json::{json, Value};

use super::{payload_string, to_value, AppState};
use crate::api::TransferApi;
use crate::scanner;

const DEFAULT_BAUD_RATE: u32 = 9600;

fn parse_scanner_start_args(payload: &Value) -> Result<(String, u32), String> {
    let port =
        payload_string(payload, &["port", "portName", "port_name"]).ok_or("Missing port")?;
    let baud = crate::value_i64(payload, &["baud", "baudRate", "baud_rate"])
        .and_then(|b| u32::try_from(b).ok())
        .unwrap_or(DEFAULT_BAUD_RATE);
    Ok((port, baud))
}

pub(crate) fn list_ports() -> Result<Value, String> {
    let ports = scanner::list_ports().map_err(|e| e.to_string())?;
    Ok(json!({ "success": true, "ports": ports }))
}

pub(crate) async fn start<A: TransferApi + 'static>(
    state: &mut AppState<A>,
    payload: &Value,
) -> Result<Value, String> {
    let (port, baud) = parse_scanner_start_args(payload)?;
    if let Err(e) = state.scanner.start(&port, baud).await {
        state.notifier.error(e.to_string());
        return Err(e.to_string());
    }
    Ok(json!({ "success": true, "port": port, "baudRate": baud }))
}

pub(crate) fn stop<A: TransferApi + 'static>(state: &mut AppState<A>) -> Value {
    let was_running = state.scanner.stop();
    json!({ "success": true, "wasRunning": was_running })
}

pub(crate) async fn retry<A: TransferApi + 'static>(
    state: &mut AppState<A>,
) -> Result<Value, String> {
    if let Err(e) = state.scanner.retry().await {
        state.notifier.error(e.to_string());
        return Err(e.to_string());
    }
    status(state)
}

pub(crate) fn status<A: TransferApi + 'static>(state: &mut AppState<A>) -> Result<Value, String> {
    to_value(&state.scanner.status())
}
