//! In-memory `TransferApi` used by unit tests.
//!
//! Behaves like a small JMS server: it keeps transfers, applies status
//! transitions on actions and records every call it receives.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::api::TransferApi;
use crate::error::ApiError;
use crate::models::{
    ActionOutcome, Branch, CreateTransferRequest, CreatedTransfer, ReceiveLine, StatusCounts,
    StockSearchResult, TransferDetail, TransferFilter, TransferItem, TransferListPage,
    TransferStatus, TransferSummary,
};

#[derive(Default)]
pub(crate) struct FakeState {
    pub catalog: Vec<StockSearchResult>,
    pub branches: Vec<Branch>,
    pub transfers: Vec<TransferDetail>,
    pub calls: Vec<String>,
    pub search_keywords: Vec<String>,
    pub search_delays: HashMap<String, Duration>,
    /// Operation name -> (status, message) to fail with, consumed once.
    pub failures: HashMap<String, (u16, String)>,
    pub created: Vec<CreateTransferRequest>,
    pub received: Vec<(i64, Vec<ReceiveLine>)>,
}

#[derive(Default)]
pub(crate) struct FakeApi {
    pub state: Mutex<FakeState>,
}

pub(crate) fn item(id: i64, code: &str, name: &str, available: i64) -> StockSearchResult {
    StockSearchResult {
        id,
        code: code.to_string(),
        name: name.to_string(),
        available_qty: available,
    }
}

pub(crate) fn line(id: i64, code: &str, requested: i64, received: Option<i64>) -> TransferItem {
    TransferItem {
        id,
        item_id: id * 100,
        code: code.to_string(),
        name: format!("Item {code}"),
        requested_qty: requested,
        received_qty: received,
        note: None,
    }
}

pub(crate) fn transfer(id: i64, status: TransferStatus, items: Vec<TransferItem>) -> TransferDetail {
    TransferDetail {
        summary: TransferSummary {
            id,
            transfer_number: format!("TRF-2026-{id:04}"),
            transfer_date: NaiveDate::from_ymd_opt(2026, 3, id as u32 % 28 + 1)
                .unwrap_or_default(),
            origin_branch: "Cabang A".into(),
            destination_branch: "Cabang B".into(),
            status,
            total_items: items.len() as i64,
            note: None,
            created_by: Some("admin".into()),
        },
        approved_by: None,
        approved_at: None,
        received_by: None,
        received_at: None,
        items,
    }
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(self, catalog: Vec<StockSearchResult>) -> Self {
        self.state.lock().unwrap().catalog = catalog;
        self
    }

    pub fn with_branches(self, branches: Vec<Branch>) -> Self {
        self.state.lock().unwrap().branches = branches;
        self
    }

    pub fn with_transfers(self, transfers: Vec<TransferDetail>) -> Self {
        self.state.lock().unwrap().transfers = transfers;
        self
    }

    pub fn fail_next(&self, op: &str, status: u16, message: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(op.to_string(), (status, message.to_string()));
    }

    pub fn delay_search(&self, keyword: &str, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .search_delays
            .insert(keyword.to_string(), delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn search_keywords(&self) -> Vec<String> {
        self.state.lock().unwrap().search_keywords.clone()
    }

    pub fn status_of(&self, id: i64) -> Option<TransferStatus> {
        self.state
            .lock()
            .unwrap()
            .transfers
            .iter()
            .find(|t| t.id() == id)
            .map(|t| t.status())
    }

    /// Change a transfer behind the client's back, as another user would.
    pub fn set_status(&self, id: i64, status: TransferStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some(t) = state.transfers.iter_mut().find(|t| t.id() == id) {
            t.summary.status = status;
        }
    }

    fn record(&self, op: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(op.to_string());
        match state.failures.remove(op) {
            Some((status, message)) => Err(ApiError::Status { status, message }),
            None => Ok(()),
        }
    }

    fn transition(
        &self,
        op: &str,
        id: i64,
        from: TransferStatus,
        to: TransferStatus,
    ) -> Result<ActionOutcome, ApiError> {
        self.record(op)?;
        let mut state = self.state.lock().unwrap();
        let t = state
            .transfers
            .iter_mut()
            .find(|t| t.id() == id)
            .ok_or(ApiError::Status {
                status: 404,
                message: "Transfer not found".into(),
            })?;
        if t.status() != from {
            return Err(ApiError::Status {
                status: 422,
                message: format!("Transfer is already {}", t.status()),
            });
        }
        t.summary.status = to;
        Ok(ActionOutcome {
            status: Some(to),
            message: None,
        })
    }
}

#[async_trait]
impl TransferApi for FakeApi {
    async fn search_items(&self, keyword: &str) -> Result<Vec<StockSearchResult>, ApiError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.search_keywords.push(keyword.to_string());
            state.search_delays.get(keyword).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record("search")?;
        let needle = keyword.to_lowercase();
        let state = self.state.lock().unwrap();
        Ok(state
            .catalog
            .iter()
            .filter(|c| {
                c.code.to_lowercase().contains(&needle) || c.name.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }

    async fn list_branches(&self) -> Result<Vec<Branch>, ApiError> {
        self.record("branches")?;
        Ok(self.state.lock().unwrap().branches.clone())
    }

    async fn create_transfer(
        &self,
        request: &CreateTransferRequest,
    ) -> Result<CreatedTransfer, ApiError> {
        self.record("create")?;
        let mut state = self.state.lock().unwrap();
        let id = state.transfers.iter().map(|t| t.id()).max().unwrap_or(0) + 1;
        let items = request
            .items
            .iter()
            .enumerate()
            .map(|(i, it)| TransferItem {
                id: id * 10 + i as i64,
                item_id: it.item_id,
                code: format!("ITEM-{}", it.item_id),
                name: String::new(),
                requested_qty: it.requested_qty,
                received_qty: None,
                note: Some(it.note.clone()).filter(|n| !n.is_empty()),
            })
            .collect();
        let detail = transfer(id, TransferStatus::Pending, items);
        let number = detail.summary.transfer_number.clone();
        state.transfers.push(detail);
        state.created.push(request.clone());
        Ok(CreatedTransfer {
            id,
            transfer_number: Some(number),
        })
    }

    async fn list_transfers(&self, filter: &TransferFilter) -> Result<TransferListPage, ApiError> {
        self.record("list")?;
        let state = self.state.lock().unwrap();
        let mut counts = StatusCounts::default();
        for t in &state.transfers {
            match t.status() {
                TransferStatus::Pending => counts.pending += 1,
                TransferStatus::Approved => counts.approved += 1,
                TransferStatus::Shipped => counts.shipped += 1,
                TransferStatus::Received => counts.received += 1,
                TransferStatus::Rejected => counts.rejected += 1,
            }
        }
        let transfers = state
            .transfers
            .iter()
            .filter(|t| filter.status.map_or(true, |s| t.status() == s))
            .map(|t| t.summary.clone())
            .collect();
        Ok(TransferListPage { transfers, counts })
    }

    async fn get_transfer(&self, id: i64) -> Result<TransferDetail, ApiError> {
        self.record("detail")?;
        self.state
            .lock()
            .unwrap()
            .transfers
            .iter()
            .find(|t| t.id() == id)
            .cloned()
            .ok_or(ApiError::Status {
                status: 404,
                message: "Transfer not found".into(),
            })
    }

    async fn approve_transfer(&self, id: i64) -> Result<ActionOutcome, ApiError> {
        self.transition("approve", id, TransferStatus::Pending, TransferStatus::Approved)
    }

    async fn reject_transfer(&self, id: i64) -> Result<ActionOutcome, ApiError> {
        self.transition("reject", id, TransferStatus::Pending, TransferStatus::Rejected)
    }

    async fn delete_transfer(&self, id: i64) -> Result<ActionOutcome, ApiError> {
        self.record("delete")?;
        let mut state = self.state.lock().unwrap();
        let before = state.transfers.len();
        state.transfers.retain(|t| t.id() != id);
        if state.transfers.len() == before {
            return Err(ApiError::Status {
                status: 404,
                message: "Transfer not found".into(),
            });
        }
        Ok(ActionOutcome::default())
    }

    async fn receive_transfer(
        &self,
        id: i64,
        lines: &[ReceiveLine],
    ) -> Result<ActionOutcome, ApiError> {
        let outcome = self.transition("receive", id, TransferStatus::Shipped, TransferStatus::Received)?;
        let mut state = self.state.lock().unwrap();
        if let Some(t) = state.transfers.iter_mut().find(|t| t.id() == id) {
            for l in lines {
                if let Some(item) = t.items.iter_mut().find(|i| i.id == l.line_id) {
                    item.received_qty = Some(l.received_qty);
                }
            }
        }
        state.received.push((id, lines.to_vec()));
        Ok(outcome)
    }
}
