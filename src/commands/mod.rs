//! Command handlers behind the JSON line bridge.
//!
//! Every command takes the merged `arg0`/`arg1` payload and answers with
//! `Result<Value, String>`. Payload keys are accepted in snake_case and
//! camelCase.
//!
//! **Rules:**
//! - Transfer commands need a connected session; settings commands do not.
//! - Leaving a page tears it down and replaces it with a fresh one, so a late
//!   response for the old page is never applied.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::api::{AdminClient, TransferApi};
use crate::config::SearchSettings;
use crate::detail::TransferDetailPage;
use crate::draft::CreateTransferPage;
use crate::list::TransferListPage;
use crate::notify::Notifier;
use crate::scanner::{BarcodeScanner, ScannedBarcode};
use crate::search::SearchUpdate;

pub mod diagnostics;
pub mod scanner;
pub mod settings;
pub mod transfers;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Pages bound to one server connection.
pub struct Session<A: TransferApi + 'static> {
    pub(crate) api: Arc<A>,
    pub(crate) create: CreateTransferPage<A>,
    pub(crate) list: TransferListPage<A>,
    pub(crate) detail: TransferDetailPage<A>,
    origin_branch_id: Option<i64>,
}

fn create_page<A: TransferApi + 'static>(
    api: Arc<A>,
    notifier: &Notifier,
    settings: SearchSettings,
    origin_branch_id: Option<i64>,
    search_updates: Option<&mpsc::UnboundedSender<SearchUpdate>>,
) -> CreateTransferPage<A> {
    let page = CreateTransferPage::new(api, notifier.clone(), settings, origin_branch_id);
    if let Some(tx) = search_updates {
        page.search().subscribe(tx.clone());
    }
    page
}

impl<A: TransferApi + 'static> Session<A> {
    fn new(
        api: Arc<A>,
        notifier: &Notifier,
        settings: SearchSettings,
        origin_branch_id: Option<i64>,
        search_updates: Option<&mpsc::UnboundedSender<SearchUpdate>>,
    ) -> Self {
        Self {
            create: create_page(
                Arc::clone(&api),
                notifier,
                settings,
                origin_branch_id,
                search_updates,
            ),
            list: TransferListPage::new(Arc::clone(&api), notifier.clone()),
            detail: TransferDetailPage::new(Arc::clone(&api), notifier.clone()),
            api,
            origin_branch_id,
        }
    }

    fn teardown(&self) {
        self.create.teardown();
        self.list.teardown();
        self.detail.teardown();
    }
}

pub struct AppState<A: TransferApi + 'static> {
    pub notifier: Notifier,
    pub scanner: BarcodeScanner,
    settings: SearchSettings,
    search_updates: Option<mpsc::UnboundedSender<SearchUpdate>>,
    session: Option<Session<A>>,
}

impl<A: TransferApi + 'static> AppState<A> {
    pub fn new(
        notifier: Notifier,
        scans: mpsc::UnboundedSender<ScannedBarcode>,
        settings: SearchSettings,
    ) -> Self {
        Self {
            notifier,
            scanner: BarcodeScanner::new(scans),
            settings,
            search_updates: None,
            session: None,
        }
    }

    /// Forward applied item-search results of every create page to `tx`.
    pub fn with_search_updates(mut self, tx: mpsc::UnboundedSender<SearchUpdate>) -> Self {
        self.search_updates = Some(tx);
        self
    }

    /// Replace the current session. Pages of the old one are torn down.
    pub fn connect(&mut self, api: Arc<A>, origin_branch_id: Option<i64>) {
        if let Some(old) = self.session.take() {
            old.teardown();
        }
        info!(origin_branch_id = ?origin_branch_id, "session connected");
        self.session = Some(Session::new(
            api,
            &self.notifier,
            self.settings,
            origin_branch_id,
            self.search_updates.as_ref(),
        ));
    }

    pub fn disconnect(&mut self) {
        if let Some(old) = self.session.take() {
            old.teardown();
            info!("session disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub(crate) fn session(&mut self) -> Result<&mut Session<A>, String> {
        self.session
            .as_mut()
            .ok_or_else(|| "Not connected. Store a connection string first".to_string())
    }

    /// Tear down one page and start it afresh.
    pub(crate) fn leave_page(&mut self, page: &str) -> Result<(), String> {
        let notifier = self.notifier.clone();
        let settings = self.settings;
        let search_updates = self.search_updates.clone();
        let session = self.session()?;
        let api = Arc::clone(&session.api);
        match page {
            "create" => {
                session.create.teardown();
                session.create = create_page(
                    api,
                    &notifier,
                    settings,
                    session.origin_branch_id,
                    search_updates.as_ref(),
                );
            }
            "list" => {
                session.list.teardown();
                session.list = TransferListPage::new(api, notifier);
            }
            "detail" => {
                session.detail.teardown();
                session.detail = TransferDetailPage::new(api, notifier);
            }
            other => return Err(format!("Unknown page: {other}")),
        }
        debug!(page, "page left");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Payload helpers
// ---------------------------------------------------------------------------

/// A bare number, a numeric string, or an object holding one under `keys`.
pub(crate) fn payload_id(payload: &Value, keys: &[&str]) -> Option<i64> {
    match payload {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(_) => crate::value_i64(payload, keys).or_else(|| {
            crate::value_str(payload, keys).and_then(|s| s.parse().ok())
        }),
        _ => None,
    }
}

/// A bare string or an object holding one under `keys`.
pub(crate) fn payload_string(payload: &Value, keys: &[&str]) -> Option<String> {
    match payload {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Object(_) => crate::value_str(payload, keys),
        _ => None,
    }
}

pub(crate) fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Entry point for the bridge: settings commands first, then the rest.
pub async fn invoke(
    state: &mut AppState<AdminClient>,
    command: &str,
    arg0: Option<Value>,
    arg1: Option<Value>,
) -> Result<Value, String> {
    let payload = crate::parse_channel_payload(arg0, arg1);
    match command {
        "config_store_connection_string" => settings::store_connection_string(state, &payload),
        "config_show" => Ok(settings::show()),
        "config_clear" => settings::clear(state),
        "api_check_connectivity" => settings::check_connectivity(state).await,
        _ => dispatch(state, command, &payload).await,
    }
}

/// Commands that work against any `TransferApi`.
pub async fn dispatch<A: TransferApi + 'static>(
    state: &mut AppState<A>,
    command: &str,
    payload: &Value,
) -> Result<Value, String> {
    match command {
        // Create page
        "transfer_branches" => transfers::branches(state).await,
        "transfer_search" => transfers::search(state, payload),
        "transfer_search_results" => transfers::search_results(state),
        "transfer_scan" => transfers::scan(state, payload).await,
        "transfer_add_item" => transfers::add_item(state, payload),
        "transfer_update_quantity" => transfers::update_quantity(state, payload),
        "transfer_update_note" => transfers::update_note(state, payload),
        "transfer_remove_line" => transfers::remove_line(state, payload),
        "transfer_set_destination" => transfers::set_destination(state, payload),
        "transfer_set_note" => transfers::set_note(state, payload),
        "transfer_set_date" => transfers::set_date(state, payload),
        "transfer_draft" => transfers::draft(state),
        "transfer_submit" => transfers::submit(state).await,
        // List page
        "transfer_list" => transfers::list(state, payload).await,
        "transfer_list_view" => transfers::list_view(state, payload),
        "transfer_action" => transfers::action(state, payload).await,
        // Detail page
        "transfer_detail" => transfers::detail(state, payload).await,
        "transfer_receive_open" => transfers::receive_open(state),
        "transfer_receive_set" => transfers::receive_set(state, payload),
        "transfer_receive_submit" => transfers::receive_submit(state).await,
        "page_leave" => transfers::leave(state, payload),
        // Scanner
        "scanner_list_ports" => scanner::list_ports(),
        "scanner_start" => scanner::start(state, payload).await,
        "scanner_stop" => Ok(scanner::stop(state)),
        "scanner_retry" => scanner::retry(state).await,
        "scanner_status" => scanner::status(state),
        // Diagnostics
        "diagnostics_get_about" => Ok(diagnostics::about(state.is_connected())),
        other => Err(format!("Unknown command: {other}")),
    }
}
