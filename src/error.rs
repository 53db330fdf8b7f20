//! Error types for the transfer client.
//!
//! Every failure here is recoverable: callers surface it as a notice and
//! leave page state untouched so the action can be retried.

use thiserror::Error;

use crate::models::{TransferAction, TransferStatus};

/// Failure talking to the JMS server.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connect, timeout or transport failure. The message is already
    /// user-facing.
    #[error("{0}")]
    Network(String),

    /// Non-2xx response. `message` carries the server-provided text when the
    /// body had one, otherwise a generic per-status fallback.
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("Invalid response from JMS server: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Client-side precondition failures. Each one aborts before any request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Select a destination branch")]
    MissingDestination,

    #[error("Destination branch must differ from the origin branch")]
    SameBranch,

    #[error("Add at least one item to the transfer")]
    NoItems,

    #[error("Quantity for {code} must be at least 1")]
    QuantityNotPositive { code: String },

    #[error("Requested quantity for {code} ({requested}) exceeds available stock ({available})")]
    QuantityExceedsStock {
        code: String,
        requested: i64,
        available: i64,
    },

    #[error("Received quantity for {code} must be between 0 and {requested} (got {received})")]
    ReceivedOutOfRange {
        code: String,
        received: i64,
        requested: i64,
    },
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Cannot {action} a transfer that is {status}")]
    ActionNotAllowed {
        action: TransferAction,
        status: TransferStatus,
    },

    #[error("Open transfer {id} to confirm receipt")]
    ReceiveNeedsForm { id: i64 },

    #[error("Transfer {0} is not loaded")]
    NotLoaded(i64),

    #[error("No transfer is loaded")]
    NothingLoaded,

    #[error("Item {0} is not among the current search results")]
    UnknownItem(i64),

    #[error("Unknown line {0}")]
    UnknownLine(String),

    /// The page was torn down while the request was in flight; the response
    /// was dropped.
    #[error("Page closed before the request completed")]
    Detached,
}

impl TransferError {
    pub fn is_validation(&self) -> bool {
        matches!(self, TransferError::Validation(_))
    }
}

/// Failure opening or reading a barcode scanner. Messages are user-facing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScannerError {
    #[error("Scanner access was denied. Allow access to {0} and retry")]
    PermissionDenied(String),

    #[error("No scanner found at {0}. Check the cable and retry")]
    NotFound(String),

    #[error("Scanner {0} is in use by another application")]
    Busy(String),

    #[error("Scanner error: {0}")]
    Other(String),

    #[error("Scanner already running, stop it first")]
    AlreadyRunning,

    #[error("No scanner has been started yet")]
    NeverStarted,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JMS server URL is not configured (set JMS_ADMIN_URL or store admin_url)")]
    MissingAdminUrl,

    #[error("API key is not configured (set JMS_API_KEY or store api_key)")]
    MissingApiKey,

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}
