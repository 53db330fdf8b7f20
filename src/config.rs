//! Runtime configuration.
//!
//! Environment variables win over credentials stored in the OS keyring. A
//! connection string (`JMS_CONNECTION_STRING`) fills whatever the individual
//! variables leave unset.

use std::time::Duration;
use zeroize::Zeroizing;

use crate::error::ConfigError;
use crate::storage;

pub const ENV_ADMIN_URL: &str = "JMS_ADMIN_URL";
pub const ENV_API_KEY: &str = "JMS_API_KEY";
pub const ENV_BRANCH_ID: &str = "JMS_BRANCH_ID";
pub const ENV_CONNECTION_STRING: &str = "JMS_CONNECTION_STRING";
pub const ENV_SEARCH_DEBOUNCE_MS: &str = "JMS_SEARCH_DEBOUNCE_MS";
pub const ENV_SEARCH_MIN_CHARS: &str = "JMS_SEARCH_MIN_CHARS";

/// Quiescence window before a typed keyword is searched.
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);
pub const DEFAULT_SEARCH_MIN_CHARS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSettings {
    pub debounce: Duration,
    pub min_chars: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_SEARCH_DEBOUNCE,
            min_chars: DEFAULT_SEARCH_MIN_CHARS,
        }
    }
}

pub struct AppConfig {
    pub admin_url: String,
    pub api_key: Zeroizing<String>,
    /// Origin branch of this terminal. Transfers are created from here.
    pub branch_id: Option<i64>,
    pub search: SearchSettings,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("admin_url", &self.admin_url)
            .field("api_key", &"<redacted>")
            .field("branch_id", &self.branch_id)
            .field("search", &self.search)
            .finish()
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_branch_id(raw: &str) -> Result<i64, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key: ENV_BRANCH_ID,
        value: raw.to_string(),
    })
}

impl AppConfig {
    /// Environment first, then the OS keyring.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_store(storage::get_credential)
    }

    pub fn load_with_store(stored: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let connection = env_var(ENV_CONNECTION_STRING);

        let admin_url = env_var(ENV_ADMIN_URL)
            .or_else(|| {
                connection
                    .as_deref()
                    .and_then(crate::api::extract_admin_url_from_connection_string)
            })
            .or_else(|| stored(storage::KEY_ADMIN_URL))
            .ok_or(ConfigError::MissingAdminUrl)?;

        let api_key = env_var(ENV_API_KEY)
            .or_else(|| {
                connection
                    .as_deref()
                    .and_then(crate::api::extract_api_key_from_connection_string)
            })
            .or_else(|| stored(storage::KEY_API_KEY))
            .ok_or(ConfigError::MissingApiKey)?;

        let branch_id = match env_var(ENV_BRANCH_ID) {
            Some(raw) => Some(parse_branch_id(&raw)?),
            None => match connection
                .as_deref()
                .and_then(crate::api::extract_branch_id_from_connection_string)
            {
                Some(bid) => Some(bid),
                None => stored(storage::KEY_BRANCH_ID)
                    .map(|raw| parse_branch_id(&raw))
                    .transpose()?,
            },
        };

        let mut search = SearchSettings::default();
        if let Some(raw) = env_var(ENV_SEARCH_DEBOUNCE_MS) {
            let ms: u64 = raw.parse().map_err(|_| ConfigError::Invalid {
                key: ENV_SEARCH_DEBOUNCE_MS,
                value: raw.clone(),
            })?;
            search.debounce = Duration::from_millis(ms);
        }
        if let Some(raw) = env_var(ENV_SEARCH_MIN_CHARS) {
            search.min_chars = raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n >= 1)
                .ok_or(ConfigError::Invalid {
                    key: ENV_SEARCH_MIN_CHARS,
                    value: raw.clone(),
                })?;
        }

        Ok(Self {
            admin_url: crate::api::normalize_admin_url(&admin_url),
            api_key: Zeroizing::new(api_key),
            branch_id,
            search,
        })
    }
}
