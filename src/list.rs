//! Transfer list with per-row actions.
//!
//! **Rules:**
//! - A load replaces rows and counts together; a failed load keeps both.
//! - Row actions come from the status table for the status on screen.
//! - After any accepted action the whole list is fetched again. If that
//!   fetch fails the action still counts as done and the rows are marked
//!   stale until the next successful load.

use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::actions::{run_action, until_teardown};
use crate::api::TransferApi;
use crate::error::TransferError;
use crate::models::{
    ActionOutcome, StatusCounts, TransferAction, TransferFilter, TransferSummary,
};
use crate::notify::Notifier;
use crate::table::{SortDirection, SortValue, TablePage, TableRow, TableState};

impl TableRow for TransferSummary {
    fn matches(&self, needle: &str) -> bool {
        [
            self.transfer_number.as_str(),
            self.origin_branch.as_str(),
            self.destination_branch.as_str(),
            self.status.label(),
            self.note.as_deref().unwrap_or_default(),
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
    }

    fn sort_value(&self, column: &str) -> Option<SortValue> {
        let value = match column {
            "number" => SortValue::text(&self.transfer_number),
            "date" => SortValue::Date(self.transfer_date),
            "origin" => SortValue::text(&self.origin_branch),
            "destination" => SortValue::text(&self.destination_branch),
            "status" => SortValue::text(self.status.as_str()),
            "items" => SortValue::Int(self.total_items),
            _ => return None,
        };
        Some(value)
    }
}

/// One visible row with the actions its status offers.
#[derive(Debug, Serialize)]
pub struct ListRow<'a> {
    #[serde(flatten)]
    pub transfer: &'a TransferSummary,
    pub status_label: &'static str,
    pub actions: &'static [TransferAction],
}

pub struct TransferListPage<A: TransferApi + 'static> {
    api: Arc<A>,
    notifier: Notifier,
    filter: TransferFilter,
    table: TableState,
    transfers: Vec<TransferSummary>,
    counts: StatusCounts,
    stale: bool,
    teardown: CancellationToken,
}

impl<A: TransferApi + 'static> TransferListPage<A> {
    pub fn new(api: Arc<A>, notifier: Notifier) -> Self {
        Self {
            api,
            notifier,
            filter: TransferFilter::default(),
            table: TableState::default(),
            transfers: Vec::new(),
            counts: StatusCounts::default(),
            stale: false,
            teardown: CancellationToken::new(),
        }
    }

    pub async fn load(&mut self) -> Result<(), TransferError> {
        match until_teardown(&self.teardown, self.api.list_transfers(&self.filter)).await? {
            Ok(page) => {
                debug!(rows = page.transfers.len(), "transfer list loaded");
                self.transfers = page.transfers;
                self.counts = page.counts;
                self.stale = false;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "failed to load transfers");
                self.notifier.error(format!("Failed to load transfers: {e}"));
                Err(e.into())
            }
        }
    }

    pub fn filter(&self) -> &TransferFilter {
        &self.filter
    }

    /// Server-side filter. Takes effect on the next `load`.
    pub fn set_filter(&mut self, filter: TransferFilter) {
        self.filter = filter;
        self.table.set_page(1);
    }

    pub fn table(&self) -> &TableState {
        &self.table
    }

    pub fn set_search(&mut self, text: &str) {
        self.table.set_filter(text);
    }

    pub fn sort_by(&mut self, column: &str) {
        self.table.sort_by(column);
    }

    pub fn set_sort(&mut self, column: &str, direction: SortDirection) {
        self.table.set_sort(column, direction);
    }

    pub fn set_page(&mut self, page: usize) {
        self.table.set_page(page);
    }

    pub fn set_per_page(&mut self, per_page: usize) {
        self.table.set_per_page(per_page);
    }

    pub fn transfers(&self) -> &[TransferSummary] {
        &self.transfers
    }

    pub fn rows(&self) -> TablePage<'_, TransferSummary> {
        self.table.apply(&self.transfers)
    }

    pub fn visible_rows(&self) -> (TablePage<'_, TransferSummary>, Vec<ListRow<'_>>) {
        let page = self.rows();
        let rows = page
            .rows
            .iter()
            .map(|t| ListRow {
                transfer: t,
                status_label: t.status.label(),
                actions: t.status.allowed_actions(),
            })
            .collect();
        (page, rows)
    }

    pub fn counts(&self) -> &StatusCounts {
        &self.counts
    }

    /// Rows predate an action the server accepted.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn actions_for(&self, id: i64) -> Result<&'static [TransferAction], TransferError> {
        self.transfers
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.status.allowed_actions())
            .ok_or(TransferError::NotLoaded(id))
    }

    /// Run a row action, then reload. Receive answers `ReceiveNeedsForm`.
    pub async fn perform(
        &mut self,
        id: i64,
        action: TransferAction,
    ) -> Result<ActionOutcome, TransferError> {
        let status = self
            .transfers
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.status)
            .ok_or(TransferError::NotLoaded(id))?;

        let outcome = run_action(
            self.api.as_ref(),
            &self.notifier,
            &self.teardown,
            id,
            status,
            action,
        )
        .await?;
        if let Err(e) = self.load().await {
            warn!(transfer_id = id, error = %e, "list refresh after action failed");
            self.stale = true;
        }
        Ok(outcome)
    }

    pub fn teardown(&self) {
        self.teardown.cancel();
    }
}
