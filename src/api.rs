//! JMS server API client.
//!
//! `TransferApi` is the request/response contract the transfer pages drive;
//! `AdminClient` is its reqwest implementation. The server is the single
//! source of truth for validation, stock mutation and status transitions.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::error::ApiError;
use crate::models::{
    ActionOutcome, Branch, CreateTransferRequest, CreatedTransfer, ReceiveLine, StockSearchResult,
    TransferDetail, TransferFilter, TransferListPage,
};

/// Default timeout for API requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout used specifically for the lightweight connectivity test.
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(10);

const TRANSFER_BASE: &str = "/api/transfer-stok";

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TransferApi: Send + Sync {
    async fn search_items(&self, keyword: &str) -> Result<Vec<StockSearchResult>, ApiError>;

    async fn list_branches(&self) -> Result<Vec<Branch>, ApiError>;

    async fn create_transfer(
        &self,
        request: &CreateTransferRequest,
    ) -> Result<CreatedTransfer, ApiError>;

    async fn list_transfers(&self, filter: &TransferFilter) -> Result<TransferListPage, ApiError>;

    async fn get_transfer(&self, id: i64) -> Result<TransferDetail, ApiError>;

    async fn approve_transfer(&self, id: i64) -> Result<ActionOutcome, ApiError>;

    async fn reject_transfer(&self, id: i64) -> Result<ActionOutcome, ApiError>;

    async fn delete_transfer(&self, id: i64) -> Result<ActionOutcome, ApiError>;

    async fn receive_transfer(
        &self,
        id: i64,
        lines: &[ReceiveLine],
    ) -> Result<ActionOutcome, ApiError>;
}

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the JMS server URL:
/// - strip trailing slashes
/// - strip a trailing `/api` segment
/// - ensure a scheme is present (https, or http for localhost)
pub fn normalize_admin_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }

    if url.ends_with("/api") {
        url.truncate(url.len() - 4);
    }

    // "/api/" leaves a slash behind
    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Connection strings
// ---------------------------------------------------------------------------

/// A connection string is a JSON object `{ "url", "key", "bid" }`, either
/// raw or base64url-encoded, handed out by the JMS admin when a terminal is
/// registered.
fn decode_connection_string_payload(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        return serde_json::from_str::<Value>(trimmed).ok();
    }

    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() < 20 {
        return None;
    }

    let base64 = compact.replace('-', "+").replace('_', "/");
    let padded = format!(
        "{}{}",
        base64,
        "=".repeat((4usize.wrapping_sub(base64.len() % 4)) % 4)
    );
    let decoded = BASE64_STANDARD.decode(padded).ok()?;
    serde_json::from_slice::<Value>(&decoded).ok()
}

pub fn extract_api_key_from_connection_string(raw: &str) -> Option<String> {
    decode_connection_string_payload(raw)
        .and_then(|v| crate::value_str(&v, &["key", "apiKey", "api_key"]))
}

pub fn extract_admin_url_from_connection_string(raw: &str) -> Option<String> {
    decode_connection_string_payload(raw)
        .and_then(|v| crate::value_str(&v, &["url", "adminUrl"]))
        .map(|s| normalize_admin_url(&s))
}

pub fn extract_branch_id_from_connection_string(raw: &str) -> Option<i64> {
    let payload = decode_connection_string_payload(raw)?;
    crate::value_i64(&payload, &["bid", "branchId", "branch_id"]).or_else(|| {
        crate::value_str(&payload, &["bid", "branchId", "branch_id"])
            .and_then(|s| s.parse().ok())
    })
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> ApiError {
    let msg = if err.is_connect() {
        format!("Cannot reach JMS server at {url}")
    } else if err.is_timeout() {
        format!("Connection to {url} timed out")
    } else if err.is_builder() {
        format!("Invalid JMS server URL: {url}")
    } else {
        format!("Network error communicating with {url}: {err}")
    };
    ApiError::Network(msg)
}

/// Generic message for a status code when the server sent nothing usable.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Session expired or API key is invalid".to_string(),
        403 => "You are not allowed to perform this action".to_string(),
        404 => "Transfer or endpoint not found".to_string(),
        419 => "Session expired, reload and try again".to_string(),
        422 => "The server rejected the submitted data".to_string(),
        s if s >= 500 => format!("JMS server error (HTTP {s})"),
        s => format!("Unexpected response from JMS server (HTTP {s})"),
    }
}

/// Build the error for a non-2xx response, preferring the server's own
/// `message`/`error` text and appending validation details when present.
pub(crate) fn error_from_response(status: StatusCode, body_text: &str) -> ApiError {
    let trimmed = body_text.trim();
    let message = match serde_json::from_str::<Value>(trimmed) {
        Ok(json) => {
            let message = crate::value_str(&json, &["message", "error"])
                .unwrap_or_else(|| status_error(status));
            match json.get("errors").or_else(|| json.get("details")) {
                Some(details) if !details.is_null() => format!("{message}: {details}"),
                _ => message,
            }
        }
        Err(_) if !trimmed.is_empty() && trimmed.len() <= 200 && !trimmed.starts_with('<') => {
            format!("{}: {trimmed}", status_error(status))
        }
        Err(_) => status_error(status),
    };
    ApiError::Status {
        status: status.as_u16(),
        message,
    }
}

/// Unwrap the `{ "data": ... }` envelope the server puts around most payloads.
fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut obj) if obj.contains_key("data") => {
            obj.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(unwrap_data(value)).map_err(|e| ApiError::Decode(e.to_string()))
}

/// List responses come as a bare array, `{data: [...], counts}` or
/// `{transfers: [...], counts}`.
fn decode_list_page(value: Value) -> Result<TransferListPage, ApiError> {
    let nested = value.get("data").is_some_and(Value::is_object);
    let page = match value {
        Value::Array(_) => TransferListPage {
            transfers: serde_json::from_value(value)
                .map_err(|e| ApiError::Decode(e.to_string()))?,
            counts: Default::default(),
        },
        Value::Null => TransferListPage::default(),
        other if nested => decode(other)?,
        other => serde_json::from_value(other).map_err(|e| ApiError::Decode(e.to_string()))?,
    };
    Ok(page)
}

fn decode_outcome(value: Value) -> Result<ActionOutcome, ApiError> {
    if value.is_null() {
        return Ok(ActionOutcome::default());
    }
    let message = crate::value_str(&value, &["message"]);
    let mut outcome: ActionOutcome = decode(value).unwrap_or_default();
    if outcome.message.is_none() {
        outcome.message = message;
    }
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Connectivity test
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Serialize)]
pub struct ConnectivityResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// reqwest implementation
// ---------------------------------------------------------------------------

pub struct AdminClient {
    base: String,
    api_key: Zeroizing<String>,
    branch_id: Option<i64>,
    http: Client,
}

impl AdminClient {
    pub fn new(admin_url: &str, api_key: &str, branch_id: Option<i64>) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to create HTTP client: {e}")))?;
        let api_key = extract_api_key_from_connection_string(api_key)
            .unwrap_or_else(|| api_key.trim().to_string());
        Ok(Self {
            base: normalize_admin_url(admin_url),
            api_key: Zeroizing::new(api_key),
            branch_id,
            http,
        })
    }

    pub fn from_config(config: &crate::config::AppConfig) -> Result<Self, ApiError> {
        Self::new(&config.admin_url, &config.api_key, config.branch_id)
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self
            .http
            .request(method, format!("{}{path}", self.base))
            .bearer_auth(self.api_key.as_str())
            .header("Accept", "application/json");
        if let Some(bid) = self.branch_id {
            req = req.header("x-branch-id", bid.to_string());
        }
        req
    }

    async fn send(&self, req: RequestBuilder) -> Result<Value, ApiError> {
        let started = Instant::now();
        let resp = req.send().await.map_err(|e| friendly_error(&self.base, &e))?;
        let status = resp.status();
        let url = resp.url().path().to_string();
        let body_text = resp.text().await.unwrap_or_default();

        debug!(
            path = %url,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "JMS request finished"
        );

        if !status.is_success() {
            let err = error_from_response(status, &body_text);
            warn!(path = %url, status = status.as_u16(), error = %err, "JMS request rejected");
            return Err(err);
        }

        // Empty 204 responses carry no body.
        if body_text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body_text).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Lightweight health check against `/api/health`.
    pub async fn test_connectivity(&self) -> ConnectivityResult {
        let start = Instant::now();
        let resp = self
            .request(Method::GET, "/api/health")
            .timeout(CONNECTIVITY_TIMEOUT)
            .send()
            .await;

        let resp = match resp {
            Ok(r) => r,
            Err(e) => {
                return ConnectivityResult {
                    success: false,
                    latency_ms: None,
                    error: Some(friendly_error(&self.base, &e).to_string()),
                };
            }
        };

        let latency = start.elapsed().as_millis() as u64;
        let status = resp.status();
        if status.is_success() {
            info!(latency_ms = latency, "connectivity test passed");
            ConnectivityResult {
                success: true,
                latency_ms: Some(latency),
                error: None,
            }
        } else {
            ConnectivityResult {
                success: false,
                latency_ms: Some(latency),
                error: Some(status_error(status)),
            }
        }
    }
}

#[async_trait]
impl TransferApi for AdminClient {
    async fn search_items(&self, keyword: &str) -> Result<Vec<StockSearchResult>, ApiError> {
        let req = self
            .request(Method::GET, &format!("{TRANSFER_BASE}/search-items"))
            .query(&[("keyword", keyword)]);
        decode(self.send(req).await?)
    }

    async fn list_branches(&self) -> Result<Vec<Branch>, ApiError> {
        let req = self.request(Method::GET, "/api/branches");
        decode(self.send(req).await?)
    }

    async fn create_transfer(
        &self,
        request: &CreateTransferRequest,
    ) -> Result<CreatedTransfer, ApiError> {
        let req = self.request(Method::POST, TRANSFER_BASE).json(request);
        decode(self.send(req).await?)
    }

    async fn list_transfers(&self, filter: &TransferFilter) -> Result<TransferListPage, ApiError> {
        let req = self.request(Method::GET, TRANSFER_BASE).query(filter);
        decode_list_page(self.send(req).await?)
    }

    async fn get_transfer(&self, id: i64) -> Result<TransferDetail, ApiError> {
        let req = self.request(Method::GET, &format!("{TRANSFER_BASE}/{id}"));
        decode(self.send(req).await?)
    }

    async fn approve_transfer(&self, id: i64) -> Result<ActionOutcome, ApiError> {
        let req = self.request(Method::POST, &format!("{TRANSFER_BASE}/{id}/approve"));
        decode_outcome(self.send(req).await?)
    }

    async fn reject_transfer(&self, id: i64) -> Result<ActionOutcome, ApiError> {
        let req = self.request(Method::POST, &format!("{TRANSFER_BASE}/{id}/reject"));
        decode_outcome(self.send(req).await?)
    }

    async fn delete_transfer(&self, id: i64) -> Result<ActionOutcome, ApiError> {
        let req = self.request(Method::DELETE, &format!("{TRANSFER_BASE}/{id}"));
        decode_outcome(self.send(req).await?)
    }

    async fn receive_transfer(
        &self,
        id: i64,
        lines: &[ReceiveLine],
    ) -> Result<ActionOutcome, ApiError> {
        let req = self
            .request(Method::POST, &format!("{TRANSFER_BASE}/{id}/receive"))
            .json(&serde_json::json!({ "items": lines }));
        decode_outcome(self.send(req).await?)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
