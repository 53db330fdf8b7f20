//! Credential storage in the OS credential store.
//!
//! Windows Credential Manager, macOS Keychain and the Linux kernel keyring
//! via the `keyring` crate. Only connection settings live here; transfer data
//! is never persisted by the client.

use keyring::Entry;
use serde_json::Value;
use tracing::{info, warn};

const SERVICE_NAME: &str = "jms-transfer";

pub const KEY_ADMIN_URL: &str = "admin_url";
pub const KEY_API_KEY: &str = "api_key";
pub const KEY_BRANCH_ID: &str = "branch_id";

const ALL_KEYS: &[&str] = &[KEY_ADMIN_URL, KEY_API_KEY, KEY_BRANCH_ID];

/// Retrieve a single credential. Returns `None` when the entry does not exist
/// or the platform store is unavailable.
pub fn get_credential(key: &str) -> Option<String> {
    let entry = match Entry::new(SERVICE_NAME, key) {
        Ok(e) => e,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to create entry");
            return None;
        }
    };
    match entry.get_password() {
        Ok(pw) if !pw.trim().is_empty() => Some(pw),
        Ok(_) => None,
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to read credential");
            None
        }
    }
}

pub fn set_credential(key: &str, value: &str) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| e.to_string())?;
    entry.set_password(value).map_err(|e| e.to_string())?;
    Ok(())
}

/// Silently succeeds if the entry does not exist.
pub fn delete_credential(key: &str) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| e.to_string())?;
    match entry.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

/// Store the pieces of a connection string (`{url, key, bid}`) as separate
/// credentials. Returns the list of keys written.
pub fn store_connection_string(raw: &str) -> Result<Vec<&'static str>, String> {
    let mut written = Vec::new();
    if let Some(url) = crate::api::extract_admin_url_from_connection_string(raw) {
        set_credential(KEY_ADMIN_URL, &url)?;
        written.push(KEY_ADMIN_URL);
    }
    if let Some(key) = crate::api::extract_api_key_from_connection_string(raw) {
        set_credential(KEY_API_KEY, &key)?;
        written.push(KEY_API_KEY);
    }
    if let Some(bid) = crate::api::extract_branch_id_from_connection_string(raw) {
        set_credential(KEY_BRANCH_ID, &bid.to_string())?;
        written.push(KEY_BRANCH_ID);
    }
    if written.is_empty() {
        return Err("Connection string could not be decoded".into());
    }
    info!(keys = ?written, "Stored connection credentials");
    Ok(written)
}

/// Stored settings with the API key masked, for diagnostics output.
pub fn describe_stored() -> Value {
    serde_json::json!({
        "admin_url": get_credential(KEY_ADMIN_URL),
        "api_key_present": get_credential(KEY_API_KEY).is_some(),
        "branch_id": get_credential(KEY_BRANCH_ID),
    })
}

pub fn clear_all() -> Result<(), String> {
    for key in ALL_KEYS {
        delete_credential(key)?;
    }
    info!("Cleared stored credentials");
    Ok(())
}
