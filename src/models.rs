//! Transfer data model and the transfer status table.
//!
//! All entities are owned by the JMS server. The client only holds copies
//! fetched for the current page and replaces them wholesale on reload.
//!
//! **Status rules** live in one table (`STATUS_RULES`): label, badge style,
//! the actions a page may offer, and the statuses the server may move to
//! next. List and detail pages both read from it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Status table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Approved,
    Shipped,
    Received,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferAction {
    Approve,
    Reject,
    Delete,
    Receive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeStyle {
    Warning,
    Info,
    Primary,
    Success,
    Danger,
}

#[derive(Debug)]
pub struct StatusRule {
    pub status: TransferStatus,
    pub label: &'static str,
    pub badge: BadgeStyle,
    pub actions: &'static [TransferAction],
    pub next: &'static [TransferStatus],
}

/// Indexed by `TransferStatus as usize`.
static STATUS_RULES: [StatusRule; 5] = [
    StatusRule {
        status: TransferStatus::Pending,
        label: "Menunggu",
        badge: BadgeStyle::Warning,
        actions: &[
            TransferAction::Approve,
            TransferAction::Reject,
            TransferAction::Delete,
        ],
        next: &[TransferStatus::Approved, TransferStatus::Rejected],
    },
    StatusRule {
        status: TransferStatus::Approved,
        label: "Disetujui",
        badge: BadgeStyle::Info,
        actions: &[],
        next: &[TransferStatus::Shipped],
    },
    StatusRule {
        status: TransferStatus::Shipped,
        label: "Dikirim",
        badge: BadgeStyle::Primary,
        actions: &[TransferAction::Receive],
        next: &[TransferStatus::Received],
    },
    StatusRule {
        status: TransferStatus::Received,
        label: "Diterima",
        badge: BadgeStyle::Success,
        actions: &[],
        next: &[],
    },
    StatusRule {
        status: TransferStatus::Rejected,
        label: "Ditolak",
        badge: BadgeStyle::Danger,
        actions: &[],
        next: &[],
    },
];

impl TransferStatus {
    pub const ALL: [TransferStatus; 5] = [
        TransferStatus::Pending,
        TransferStatus::Approved,
        TransferStatus::Shipped,
        TransferStatus::Received,
        TransferStatus::Rejected,
    ];

    pub fn rule(self) -> &'static StatusRule {
        &STATUS_RULES[self as usize]
    }

    pub fn allowed_actions(self) -> &'static [TransferAction] {
        self.rule().actions
    }

    pub fn allows(self, action: TransferAction) -> bool {
        self.allowed_actions().contains(&action)
    }

    pub fn label(self) -> &'static str {
        self.rule().label
    }

    pub fn badge(self) -> BadgeStyle {
        self.rule().badge
    }

    pub fn is_terminal(self) -> bool {
        self.rule().next.is_empty()
    }

    /// Whether the server may legitimately report `next` after `self`.
    pub fn can_transition_to(self, next: TransferStatus) -> bool {
        self.rule().next.contains(&next)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Approved => "approved",
            TransferStatus::Shipped => "shipped",
            TransferStatus::Received => "received",
            TransferStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransferStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown transfer status: {s}"))
    }
}

impl TransferAction {
    pub fn as_str(self) -> &'static str {
        match self {
            TransferAction::Approve => "approve",
            TransferAction::Reject => "reject",
            TransferAction::Delete => "delete",
            TransferAction::Receive => "receive",
        }
    }

    /// Past-tense wording for success notices.
    pub fn done_label(self) -> &'static str {
        match self {
            TransferAction::Approve => "approved",
            TransferAction::Reject => "rejected",
            TransferAction::Delete => "deleted",
            TransferAction::Receive => "received",
        }
    }
}

impl fmt::Display for TransferAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(TransferAction::Approve),
            "reject" => Ok(TransferAction::Reject),
            "delete" => Ok(TransferAction::Delete),
            "receive" => Ok(TransferAction::Receive),
            other => Err(format!("Unknown transfer action: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: i64,
    #[serde(alias = "nama", alias = "nama_cabang")]
    pub name: String,
}

/// Candidate returned by the item search. Never persisted by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSearchResult {
    pub id: i64,
    #[serde(alias = "kode", alias = "kode_barang")]
    pub code: String,
    #[serde(alias = "nama", alias = "nama_barang")]
    pub name: String,
    #[serde(alias = "stok", alias = "stock")]
    pub available_qty: i64,
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

/// Accept `2026-03-02` as well as a datetime such as
/// `2026-03-02T00:00:00.000000Z` or `2026-03-02 00:00:00`; the calendar date
/// is kept as written.
fn date_or_datetime<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.date_naive());
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.date())
        .map_err(|_| serde::de::Error::custom(format!("invalid transfer date: {raw}")))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferSummary {
    pub id: i64,
    #[serde(alias = "no_transfer")]
    pub transfer_number: String,
    #[serde(alias = "tanggal_transfer", deserialize_with = "date_or_datetime")]
    pub transfer_date: NaiveDate,
    #[serde(alias = "cabang_asal")]
    pub origin_branch: String,
    #[serde(alias = "cabang_tujuan")]
    pub destination_branch: String,
    pub status: TransferStatus,
    #[serde(default, alias = "total_item")]
    pub total_items: i64,
    #[serde(default, alias = "keterangan")]
    pub note: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferItem {
    pub id: i64,
    #[serde(alias = "barang_id")]
    pub item_id: i64,
    #[serde(alias = "kode_barang")]
    pub code: String,
    #[serde(alias = "nama_barang")]
    pub name: String,
    #[serde(alias = "qty_request")]
    pub requested_qty: i64,
    #[serde(default, alias = "qty_diterima")]
    pub received_qty: Option<i64>,
    #[serde(default, alias = "keterangan")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferDetail {
    #[serde(flatten)]
    pub summary: TransferSummary,
    #[serde(default)]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub approved_at: Option<String>,
    #[serde(default)]
    pub received_by: Option<String>,
    #[serde(default)]
    pub received_at: Option<String>,
    #[serde(default)]
    pub items: Vec<TransferItem>,
}

impl TransferDetail {
    pub fn id(&self) -> i64 {
        self.summary.id
    }

    pub fn status(&self) -> TransferStatus {
        self.summary.status
    }
}

/// Per-status totals shown as stat cards above the list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusCounts {
    pub pending: i64,
    pub approved: i64,
    pub shipped: i64,
    pub received: i64,
    pub rejected: i64,
}

impl StatusCounts {
    pub fn get(&self, status: TransferStatus) -> i64 {
        match status {
            TransferStatus::Pending => self.pending,
            TransferStatus::Approved => self.approved,
            TransferStatus::Shipped => self.shipped,
            TransferStatus::Received => self.received,
            TransferStatus::Rejected => self.rejected,
        }
    }

    pub fn total(&self) -> i64 {
        TransferStatus::ALL.iter().map(|s| self.get(*s)).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferListPage {
    #[serde(default, alias = "data")]
    pub transfers: Vec<TransferSummary>,
    #[serde(default)]
    pub counts: StatusCounts,
}

// ---------------------------------------------------------------------------
// Requests / responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TransferStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_from: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_to: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTransferItem {
    pub item_id: i64,
    pub requested_qty: i64,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTransferRequest {
    pub transfer_date: NaiveDate,
    pub destination_branch_id: i64,
    pub note: String,
    pub items: Vec<CreateTransferItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedTransfer {
    pub id: i64,
    #[serde(default, alias = "no_transfer")]
    pub transfer_number: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveLine {
    pub line_id: i64,
    pub received_qty: i64,
}

/// Whatever the server chose to echo back after an action. The client does
/// not act on `status`; it re-fetches instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    #[serde(default)]
    pub status: Option<TransferStatus>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_table_is_indexed_by_status() {
        for status in TransferStatus::ALL {
            assert_eq!(status.rule().status, status);
        }
    }

    #[test]
    fn test_pending_offers_approve_reject_delete() {
        assert_eq!(
            TransferStatus::Pending.allowed_actions(),
            &[
                TransferAction::Approve,
                TransferAction::Reject,
                TransferAction::Delete
            ]
        );
    }

    #[test]
    fn test_shipped_offers_only_receive() {
        assert_eq!(
            TransferStatus::Shipped.allowed_actions(),
            &[TransferAction::Receive]
        );
    }

    #[test]
    fn test_read_only_statuses_offer_nothing() {
        for status in [
            TransferStatus::Approved,
            TransferStatus::Received,
            TransferStatus::Rejected,
        ] {
            assert!(status.allowed_actions().is_empty(), "{status}");
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TransferStatus::Received.is_terminal());
        assert!(TransferStatus::Rejected.is_terminal());
        assert!(!TransferStatus::Pending.is_terminal());
        assert!(TransferStatus::Pending.can_transition_to(TransferStatus::Rejected));
        assert!(TransferStatus::Approved.can_transition_to(TransferStatus::Shipped));
        assert!(!TransferStatus::Pending.can_transition_to(TransferStatus::Received));
    }

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!(
            "Shipped".parse::<TransferStatus>().unwrap(),
            TransferStatus::Shipped
        );
        assert!("dikirim".parse::<TransferStatus>().is_err());
        assert_eq!(
            " DELETE ".parse::<TransferAction>().unwrap(),
            TransferAction::Delete
        );
    }

    #[test]
    fn test_detail_deserializes_with_server_aliases() {
        let json = serde_json::json!({
            "id": 7,
            "no_transfer": "TRF-2026-0007",
            "tanggal_transfer": "2026-03-02",
            "cabang_asal": "Cabang A",
            "cabang_tujuan": "Cabang B",
            "status": "shipped",
            "total_item": 1,
            "items": [{
                "id": 11,
                "barang_id": 3,
                "kode_barang": "BRG-001",
                "nama_barang": "Baterai",
                "qty_request": 5,
                "qty_diterima": null
            }]
        });
        let detail: TransferDetail = serde_json::from_value(json).unwrap();
        assert_eq!(detail.id(), 7);
        assert_eq!(detail.status(), TransferStatus::Shipped);
        assert_eq!(detail.summary.transfer_number, "TRF-2026-0007");
        assert_eq!(detail.items[0].received_qty, None);
        assert_eq!(detail.items[0].code, "BRG-001");
    }

    #[test]
    fn test_transfer_date_accepts_datetime_forms() {
        let summary = |date: &str| {
            serde_json::from_value::<TransferSummary>(serde_json::json!({
                "id": 1,
                "transfer_number": "TRF-2026-0001",
                "transfer_date": date,
                "origin_branch": "Cabang A",
                "destination_branch": "Cabang B",
                "status": "pending"
            }))
        };
        let expected = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        for date in [
            "2026-03-02",
            "2026-03-02T00:00:00.000000Z",
            "2026-03-02T23:30:00+07:00",
            "2026-03-02 08:15:00",
        ] {
            assert_eq!(summary(date).unwrap().transfer_date, expected, "{date}");
        }
        assert!(summary("02/03/2026").is_err());
    }

    #[test]
    fn test_counts_total() {
        let counts = StatusCounts {
            pending: 2,
            shipped: 1,
            received: 4,
            ..Default::default()
        };
        assert_eq!(counts.total(), 7);
        assert_eq!(counts.get(TransferStatus::Shipped), 1);
    }

    #[test]
    fn test_filter_skips_empty_fields() {
        let filter = TransferFilter {
            status: Some(TransferStatus::Pending),
            ..Default::default()
        };
        let value = serde_json::to_value(&filter).unwrap();
        assert_eq!(value, serde_json::json!({ "status": "pending" }));
    }
}
