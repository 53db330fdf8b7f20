//! Transfer creation page: draft, validation and submission.
//!
//! **Rules:**
//! - Destination branch must be chosen (and differ from the origin branch)
//! - At least one line
//! - Every line requests `1..=available` where `available` is the stock
//!   figure captured when the line was added
//! - Any failed precondition aborts before a request is sent
//! - A server rejection keeps the draft so the user can correct and retry
//!
//! The stock check is a courtesy; the server re-validates and may still
//! reject a draft that passed here.

use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::accumulator::{LineId, LineItems};
use crate::actions::until_teardown;
use crate::api::TransferApi;
use crate::config::SearchSettings;
use crate::error::{TransferError, ValidationError};
use crate::models::{
    Branch, CreateTransferItem, CreateTransferRequest, CreatedTransfer, StockSearchResult,
};
use crate::notify::Notifier;
use crate::search::ItemSearch;

// ---------------------------------------------------------------------------
// Draft
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct TransferDraft {
    pub transfer_date: NaiveDate,
    pub destination_branch_id: Option<i64>,
    pub note: String,
    pub lines: LineItems,
    #[serde(skip)]
    origin_branch_id: Option<i64>,
}

impl TransferDraft {
    pub fn new(origin_branch_id: Option<i64>) -> Self {
        Self {
            transfer_date: Local::now().date_naive(),
            destination_branch_id: None,
            note: String::new(),
            lines: LineItems::new(),
            origin_branch_id,
        }
    }

    /// Check every precondition and build the create request.
    pub fn validate(&self) -> Result<CreateTransferRequest, ValidationError> {
        let destination = self
            .destination_branch_id
            .ok_or(ValidationError::MissingDestination)?;
        if self.origin_branch_id == Some(destination) {
            return Err(ValidationError::SameBranch);
        }
        if self.lines.is_empty() {
            return Err(ValidationError::NoItems);
        }

        let mut items = Vec::with_capacity(self.lines.len());
        for line in self.lines.lines() {
            if line.requested_qty < 1 {
                return Err(ValidationError::QuantityNotPositive {
                    code: line.code.clone(),
                });
            }
            if line.requested_qty > line.available_qty {
                return Err(ValidationError::QuantityExceedsStock {
                    code: line.code.clone(),
                    requested: line.requested_qty,
                    available: line.available_qty,
                });
            }
            items.push(CreateTransferItem {
                item_id: line.item_id,
                requested_qty: line.requested_qty,
                note: line.note.trim().to_string(),
            });
        }

        Ok(CreateTransferRequest {
            transfer_date: self.transfer_date,
            destination_branch_id: destination,
            note: self.note.trim().to_string(),
            items,
        })
    }

    /// Back to an empty draft for the same origin branch.
    pub fn reset(&mut self) {
        *self = Self::new(self.origin_branch_id);
    }
}

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

pub struct CreateTransferPage<A: TransferApi + 'static> {
    api: Arc<A>,
    notifier: Notifier,
    search: ItemSearch<A>,
    branches: Vec<Branch>,
    draft: TransferDraft,
    teardown: CancellationToken,
}

impl<A: TransferApi + 'static> CreateTransferPage<A> {
    pub fn new(
        api: Arc<A>,
        notifier: Notifier,
        settings: SearchSettings,
        origin_branch_id: Option<i64>,
    ) -> Self {
        let search = ItemSearch::new(Arc::clone(&api), notifier.clone(), settings);
        Self {
            api,
            notifier,
            search,
            branches: Vec::new(),
            draft: TransferDraft::new(origin_branch_id),
            teardown: CancellationToken::new(),
        }
    }

    /// Destination choices, excluding the origin branch.
    pub async fn load_branches(&mut self) -> Result<&[Branch], TransferError> {
        match until_teardown(&self.teardown, self.api.list_branches()).await? {
            Ok(branches) => {
                let origin = self.draft.origin_branch_id;
                self.branches = branches
                    .into_iter()
                    .filter(|b| Some(b.id) != origin)
                    .collect();
                Ok(&self.branches)
            }
            Err(e) => {
                self.notifier.error(format!("Failed to load branches: {e}"));
                Err(e.into())
            }
        }
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn draft(&self) -> &TransferDraft {
        &self.draft
    }

    pub fn search(&self) -> &ItemSearch<A> {
        &self.search
    }

    pub fn select_destination(&mut self, branch_id: Option<i64>) {
        self.draft.destination_branch_id = branch_id;
    }

    pub fn set_note(&mut self, note: &str) {
        self.draft.note = note.to_string();
    }

    pub fn set_transfer_date(&mut self, date: NaiveDate) {
        self.draft.transfer_date = date;
    }

    pub fn on_keyword(&self, keyword: &str) {
        self.search.on_keyword(keyword);
    }

    /// Add a candidate line. Duplicates are refused with a warning.
    pub fn add_candidate(&mut self, candidate: &StockSearchResult) -> Option<LineId> {
        match self.draft.lines.add(candidate) {
            Some(id) => {
                info!(item_id = candidate.id, code = %candidate.code, "line added");
                Some(id)
            }
            None => {
                self.notifier
                    .warning(format!("{} is already in the transfer", candidate.code));
                None
            }
        }
    }

    /// Add one of the current search results by item id.
    pub fn add_from_results(&mut self, item_id: i64) -> Result<Option<LineId>, TransferError> {
        let candidate = self
            .search
            .results()
            .into_iter()
            .find(|c| c.id == item_id)
            .ok_or(TransferError::UnknownItem(item_id))?;
        Ok(self.add_candidate(&candidate))
    }

    /// Look a scanned barcode up right away and add the exact code match.
    pub async fn scan_barcode(&mut self, barcode: &str) -> Result<Option<LineId>, TransferError> {
        let barcode = barcode.trim();
        let found = match until_teardown(&self.teardown, self.api.search_items(barcode)).await? {
            Ok(found) => found,
            Err(e) => {
                self.notifier.error(format!("Barcode lookup failed: {e}"));
                return Err(e.into());
            }
        };

        match found
            .iter()
            .find(|c| c.code.eq_ignore_ascii_case(barcode))
        {
            Some(candidate) => Ok(self.add_candidate(candidate)),
            None => {
                warn!(barcode = %barcode, "scanned barcode has no matching item");
                self.notifier
                    .warning(format!("No item found for barcode {barcode}"));
                Ok(None)
            }
        }
    }

    pub fn update_quantity(&mut self, line: LineId, qty: i64) -> Result<(), TransferError> {
        if self.draft.lines.update_quantity(line, qty) {
            Ok(())
        } else {
            Err(TransferError::UnknownLine(line.to_string()))
        }
    }

    pub fn update_note(&mut self, line: LineId, note: &str) -> Result<(), TransferError> {
        if self.draft.lines.update_note(line, note) {
            Ok(())
        } else {
            Err(TransferError::UnknownLine(line.to_string()))
        }
    }

    pub fn remove_line(&mut self, line: LineId) -> Result<(), TransferError> {
        self.draft
            .lines
            .remove(line)
            .map(|_| ())
            .ok_or_else(|| TransferError::UnknownLine(line.to_string()))
    }

    /// Validate and send the create request. On success the draft is reset;
    /// on any failure it is kept as is.
    pub async fn submit(&mut self) -> Result<CreatedTransfer, TransferError> {
        let request = match self.draft.validate() {
            Ok(request) => request,
            Err(e) => {
                self.notifier.error(e.to_string());
                return Err(e.into());
            }
        };

        let lines = request.items.len();
        match until_teardown(&self.teardown, self.api.create_transfer(&request)).await? {
            Ok(created) => {
                info!(
                    transfer_id = created.id,
                    lines,
                    destination = request.destination_branch_id,
                    "transfer created"
                );
                let label = created
                    .transfer_number
                    .clone()
                    .unwrap_or_else(|| format!("#{}", created.id));
                self.notifier.success(format!("Transfer {label} created"));
                self.draft.reset();
                self.search.clear();
                Ok(created)
            }
            Err(e) => {
                warn!(error = %e, "transfer creation rejected");
                self.notifier
                    .error(format!("Failed to create transfer: {e}"));
                Err(e.into())
            }
        }
    }

    pub fn teardown(&self) {
        self.teardown.cancel();
        self.search.teardown();
    }
}
