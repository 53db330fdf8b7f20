use chrono::NaiveDate;
use serde_json::{json, Value};

use super::{payload_id, payload_string, to_value, AppState};
use crate::accumulator::LineId;
use crate::api::TransferApi;
use crate::detail::{Navigation, TransferDetailPage};
use crate::draft::CreateTransferPage;
use crate::error::TransferError;
use crate::list::TransferListPage;
use crate::models::{TransferAction, TransferFilter, TransferStatus};
use crate::table::SortDirection;
use crate::{value_i64, value_str};

const TRANSFER_ID_KEYS: &[&str] = &["id", "transfer_id", "transferId"];
const LINE_ID_KEYS: &[&str] = &["line_id", "lineId", "id"];

fn err(e: TransferError) -> String {
    e.to_string()
}

fn parse_line_id(payload: &Value) -> Result<LineId, String> {
    let raw = payload_string(payload, LINE_ID_KEYS).ok_or("Missing line id")?;
    LineId::parse(&raw).ok_or_else(|| format!("Invalid line id: {raw}"))
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| format!("Invalid date: {raw}"))
}

fn parse_optional_date(payload: &Value, keys: &[&str]) -> Result<Option<NaiveDate>, String> {
    value_str(payload, keys).map(|s| parse_date(&s)).transpose()
}

pub(crate) fn parse_list_filter(payload: &Value) -> Result<TransferFilter, String> {
    let status = match value_str(payload, &["status"]) {
        Some(s) if s.eq_ignore_ascii_case("all") => None,
        Some(s) => Some(s.parse::<TransferStatus>()?),
        None => None,
    };
    Ok(TransferFilter {
        status,
        keyword: value_str(payload, &["keyword", "q"]),
        date_from: parse_optional_date(payload, &["date_from", "dateFrom"])?,
        date_to: parse_optional_date(payload, &["date_to", "dateTo"])?,
    })
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

fn draft_view<A: TransferApi + 'static>(page: &CreateTransferPage<A>) -> Value {
    let draft = page.draft();
    json!({
        "draft": draft,
        "line_count": draft.lines.len(),
        "total_quantity": draft.lines.total_quantity(),
    })
}

fn search_view<A: TransferApi + 'static>(page: &CreateTransferPage<A>) -> Value {
    let search = page.search();
    json!({
        "keyword": search.keyword(),
        "loading": search.is_loading(),
        "results": search.results(),
    })
}

fn list_page_view<A: TransferApi + 'static>(page: &TransferListPage<A>) -> Value {
    let (table, rows) = page.visible_rows();
    let state = page.table();
    json!({
        "rows": rows,
        "total": table.total,
        "filtered": table.filtered,
        "page": table.page,
        "page_count": table.page_count,
        "per_page": state.per_page,
        "search": state.filter,
        "sort": state.sort,
        "filter": page.filter(),
        "counts": page.counts(),
        "stale": page.is_stale(),
    })
}

fn detail_view<A: TransferApi + 'static>(page: &TransferDetailPage<A>) -> Value {
    json!({
        "detail": page.detail(),
        "status_label": page.detail().map(|d| d.status().label()),
        "actions": page.actions(),
        "receive_form": page.receive_form(),
        "stale": page.is_stale(),
    })
}

// ---------------------------------------------------------------------------
// Create page
// ---------------------------------------------------------------------------

pub(crate) async fn branches<A: TransferApi + 'static>(
    state: &mut AppState<A>,
) -> Result<Value, String> {
    let session = state.session()?;
    let branches = session.create.load_branches().await.map_err(err)?;
    to_value(&branches)
}

pub(crate) fn search<A: TransferApi + 'static>(
    state: &mut AppState<A>,
    payload: &Value,
) -> Result<Value, String> {
    let keyword = match payload {
        Value::String(s) => s.clone(),
        _ => value_str(payload, &["keyword", "q"]).unwrap_or_default(),
    };
    let session = state.session()?;
    session.create.on_keyword(&keyword);
    Ok(search_view(&session.create))
}

pub(crate) fn search_results<A: TransferApi + 'static>(
    state: &mut AppState<A>,
) -> Result<Value, String> {
    Ok(search_view(&state.session()?.create))
}

pub(crate) async fn scan<A: TransferApi + 'static>(
    state: &mut AppState<A>,
    payload: &Value,
) -> Result<Value, String> {
    let barcode = payload_string(payload, &["barcode", "code"]).ok_or("Missing barcode")?;
    let session = state.session()?;
    let line_id = session.create.scan_barcode(&barcode).await.map_err(err)?;
    let mut view = draft_view(&session.create);
    view["line_id"] = to_value(&line_id)?;
    Ok(view)
}

pub(crate) fn add_item<A: TransferApi + 'static>(
    state: &mut AppState<A>,
    payload: &Value,
) -> Result<Value, String> {
    let item_id =
        payload_id(payload, &["item_id", "itemId", "id"]).ok_or("Missing item id")?;
    let session = state.session()?;
    let line_id = session.create.add_from_results(item_id).map_err(err)?;
    let mut view = draft_view(&session.create);
    view["line_id"] = to_value(&line_id)?;
    Ok(view)
}

pub(crate) fn update_quantity<A: TransferApi + 'static>(
    state: &mut AppState<A>,
    payload: &Value,
) -> Result<Value, String> {
    let line = parse_line_id(payload)?;
    let qty = value_i64(payload, &["qty", "quantity", "requested_qty", "requestedQty"])
        .ok_or("Missing quantity")?;
    let session = state.session()?;
    session.create.update_quantity(line, qty).map_err(err)?;
    Ok(draft_view(&session.create))
}

pub(crate) fn update_note<A: TransferApi + 'static>(
    state: &mut AppState<A>,
    payload: &Value,
) -> Result<Value, String> {
    let line = parse_line_id(payload)?;
    let note = payload
        .get("note")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let session = state.session()?;
    session.create.update_note(line, note).map_err(err)?;
    Ok(draft_view(&session.create))
}

pub(crate) fn remove_line<A: TransferApi + 'static>(
    state: &mut AppState<A>,
    payload: &Value,
) -> Result<Value, String> {
    let line = parse_line_id(payload)?;
    let session = state.session()?;
    session.create.remove_line(line).map_err(err)?;
    Ok(draft_view(&session.create))
}

pub(crate) fn set_destination<A: TransferApi + 'static>(
    state: &mut AppState<A>,
    payload: &Value,
) -> Result<Value, String> {
    let branch_id = payload_id(
        payload,
        &[
            "branch_id",
            "branchId",
            "destination_branch_id",
            "destinationBranchId",
        ],
    );
    let session = state.session()?;
    session.create.select_destination(branch_id);
    Ok(draft_view(&session.create))
}

pub(crate) fn set_note<A: TransferApi + 'static>(
    state: &mut AppState<A>,
    payload: &Value,
) -> Result<Value, String> {
    let note = match payload {
        Value::String(s) => s.as_str(),
        _ => payload
            .get("note")
            .and_then(Value::as_str)
            .unwrap_or_default(),
    };
    let session = state.session()?;
    session.create.set_note(note);
    Ok(draft_view(&session.create))
}

pub(crate) fn set_date<A: TransferApi + 'static>(
    state: &mut AppState<A>,
    payload: &Value,
) -> Result<Value, String> {
    let raw = payload_string(payload, &["date", "transfer_date", "transferDate"])
        .ok_or("Missing date")?;
    let date = parse_date(&raw)?;
    let session = state.session()?;
    session.create.set_transfer_date(date);
    Ok(draft_view(&session.create))
}

pub(crate) fn draft<A: TransferApi + 'static>(state: &mut AppState<A>) -> Result<Value, String> {
    Ok(draft_view(&state.session()?.create))
}

pub(crate) async fn submit<A: TransferApi + 'static>(
    state: &mut AppState<A>,
) -> Result<Value, String> {
    let session = state.session()?;
    let created = session.create.submit().await.map_err(err)?;
    // The new transfer shows up on the next list load.
    Ok(json!({ "created": created, "draft": draft_view(&session.create) }))
}

// ---------------------------------------------------------------------------
// List page
// ---------------------------------------------------------------------------

pub(crate) async fn list<A: TransferApi + 'static>(
    state: &mut AppState<A>,
    payload: &Value,
) -> Result<Value, String> {
    let filter = parse_list_filter(payload)?;
    let session = state.session()?;
    session.list.set_filter(filter);
    session.list.load().await.map_err(err)?;
    Ok(list_page_view(&session.list))
}

pub(crate) fn list_view<A: TransferApi + 'static>(
    state: &mut AppState<A>,
    payload: &Value,
) -> Result<Value, String> {
    let session = state.session()?;
    let list = &mut session.list;

    if let Some(search) = payload.get("search").and_then(Value::as_str) {
        list.set_search(search);
    }
    if let Some(column) = value_str(payload, &["sort", "sort_by", "sortBy"]) {
        match value_str(payload, &["direction", "dir"]).as_deref() {
            Some("asc") => list.set_sort(&column, SortDirection::Asc),
            Some("desc") => list.set_sort(&column, SortDirection::Desc),
            Some(other) => return Err(format!("Invalid sort direction: {other}")),
            None => list.sort_by(&column),
        }
    }
    if let Some(per_page) = value_i64(payload, &["per_page", "perPage"]) {
        list.set_per_page(usize::try_from(per_page).unwrap_or(1));
    }
    if let Some(page) = value_i64(payload, &["page"]) {
        list.set_page(usize::try_from(page).unwrap_or(1));
    }
    Ok(list_page_view(list))
}

/// Row or detail action. Receive picked from the list opens the receive form
/// on the detail page.
pub(crate) async fn action<A: TransferApi + 'static>(
    state: &mut AppState<A>,
    payload: &Value,
) -> Result<Value, String> {
    let id = payload_id(payload, TRANSFER_ID_KEYS).ok_or("Missing transfer id")?;
    let action: TransferAction = value_str(payload, &["action"])
        .ok_or("Missing action")?
        .parse()?;
    let from_detail = value_str(payload, &["source", "from"]).as_deref() == Some("detail");
    let session = state.session()?;

    if from_detail {
        if session.detail.detail().map(|d| d.id()) != Some(id) {
            return Err(err(TransferError::NotLoaded(id)));
        }
        if action == TransferAction::Receive {
            session.detail.open_receive_form().map_err(err)?;
            return Ok(json!({
                "navigation": Navigation::ReceiveForm,
                "detail": detail_view(&session.detail),
            }));
        }
        let navigation = session.detail.perform(action).await.map_err(err)?;
        return Ok(json!({
            "navigation": navigation,
            "detail": detail_view(&session.detail),
        }));
    }

    match session.list.perform(id, action).await {
        Ok(outcome) => Ok(json!({
            "navigation": Navigation::Stay,
            "outcome": outcome,
            "list": list_page_view(&session.list),
        })),
        Err(TransferError::ReceiveNeedsForm { id }) => {
            session.detail.load(id).await.map_err(err)?;
            session.detail.open_receive_form().map_err(err)?;
            Ok(json!({
                "navigation": Navigation::ReceiveForm,
                "detail": detail_view(&session.detail),
            }))
        }
        Err(e) => Err(err(e)),
    }
}

// ---------------------------------------------------------------------------
// Detail page
// ---------------------------------------------------------------------------

pub(crate) async fn detail<A: TransferApi + 'static>(
    state: &mut AppState<A>,
    payload: &Value,
) -> Result<Value, String> {
    let id = payload_id(payload, TRANSFER_ID_KEYS).ok_or("Missing transfer id")?;
    let session = state.session()?;
    session.detail.load(id).await.map_err(err)?;
    Ok(detail_view(&session.detail))
}

pub(crate) fn receive_open<A: TransferApi + 'static>(
    state: &mut AppState<A>,
) -> Result<Value, String> {
    let session = state.session()?;
    session.detail.open_receive_form().map_err(err)?;
    Ok(detail_view(&session.detail))
}

pub(crate) fn receive_set<A: TransferApi + 'static>(
    state: &mut AppState<A>,
    payload: &Value,
) -> Result<Value, String> {
    let line_id = payload_id(payload, LINE_ID_KEYS).ok_or("Missing line id")?;
    let qty = value_i64(payload, &["received_qty", "receivedQty", "qty"])
        .ok_or("Missing received quantity")?;
    let session = state.session()?;
    session.detail.set_received(line_id, qty).map_err(err)?;
    Ok(detail_view(&session.detail))
}

pub(crate) async fn receive_submit<A: TransferApi + 'static>(
    state: &mut AppState<A>,
) -> Result<Value, String> {
    let session = state.session()?;
    session.detail.submit_receive().await.map_err(err)?;
    Ok(detail_view(&session.detail))
}

pub(crate) fn leave<A: TransferApi + 'static>(
    state: &mut AppState<A>,
    payload: &Value,
) -> Result<Value, String> {
    let page = payload_string(payload, &["page"]).ok_or("Missing page")?;
    state.leave_page(&page)?;
    Ok(json!({ "success": true, "page": page }))
}
