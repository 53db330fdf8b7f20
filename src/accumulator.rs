//! Transfer lines collected on the creation page before submission.
//!
//! Lines are addressed by a locally generated `LineId`, never by position.
//! The available stock of each line is the figure captured when the item was
//! added; it is not refreshed afterwards.

use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::models::StockSearchResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct LineId(Uuid);

impl LineId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftLine {
    pub id: LineId,
    pub item_id: i64,
    pub code: String,
    pub name: String,
    /// Stock at the origin branch when the line was added.
    pub available_qty: i64,
    pub requested_qty: i64,
    pub note: String,
}

impl DraftLine {
    /// Input bounds for the quantity control.
    pub fn quantity_bounds(&self) -> (i64, i64) {
        (1, self.available_qty.max(1))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct LineItems {
    lines: Vec<DraftLine>,
}

impl LineItems {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line for `candidate` with quantity 1. Returns `None` and
    /// leaves the list untouched when the item is already present.
    pub fn add(&mut self, candidate: &StockSearchResult) -> Option<LineId> {
        if self.contains_item(candidate.id) {
            return None;
        }
        let id = LineId::new();
        self.lines.push(DraftLine {
            id,
            item_id: candidate.id,
            code: candidate.code.clone(),
            name: candidate.name.clone(),
            available_qty: candidate.available_qty,
            requested_qty: 1,
            note: String::new(),
        });
        Some(id)
    }

    pub fn contains_item(&self, item_id: i64) -> bool {
        self.lines.iter().any(|l| l.item_id == item_id)
    }

    /// Replace the requested quantity. No clamping here; submission checks it.
    pub fn update_quantity(&mut self, id: LineId, qty: i64) -> bool {
        match self.get_mut(id) {
            Some(line) => {
                line.requested_qty = qty;
                true
            }
            None => false,
        }
    }

    pub fn update_note(&mut self, id: LineId, note: &str) -> bool {
        match self.get_mut(id) {
            Some(line) => {
                line.note = note.to_string();
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: LineId) -> Option<DraftLine> {
        let pos = self.lines.iter().position(|l| l.id == id)?;
        Some(self.lines.remove(pos))
    }

    pub fn get(&self, id: LineId) -> Option<&DraftLine> {
        self.lines.iter().find(|l| l.id == id)
    }

    fn get_mut(&mut self, id: LineId) -> Option<&mut DraftLine> {
        self.lines.iter_mut().find(|l| l.id == id)
    }

    pub fn lines(&self) -> &[DraftLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of requested quantities. Quantities are stored as typed, so the
    /// sum saturates instead of overflowing.
    pub fn total_quantity(&self) -> i64 {
        self.lines
            .iter()
            .fold(0i64, |total, l| total.saturating_add(l.requested_qty))
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::item;

    #[test]
    fn test_add_defaults_quantity_and_note() {
        let mut lines = LineItems::new();
        let id = lines.add(&item(1, "BRG-001", "Baterai", 10)).unwrap();
        let line = lines.get(id).unwrap();
        assert_eq!(line.requested_qty, 1);
        assert_eq!(line.note, "");
        assert_eq!(line.available_qty, 10);
        assert_eq!(line.quantity_bounds(), (1, 10));
    }

    #[test]
    fn test_duplicate_add_is_noop() {
        let mut lines = LineItems::new();
        let first = lines.add(&item(1, "BRG-001", "Baterai", 10)).unwrap();
        lines.update_quantity(first, 4);

        assert!(lines.add(&item(1, "BRG-001", "Baterai", 99)).is_none());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines.get(first).unwrap().requested_qty, 4);
        assert_eq!(lines.get(first).unwrap().available_qty, 10);
    }

    #[test]
    fn test_update_quantity_does_not_clamp() {
        let mut lines = LineItems::new();
        let id = lines.add(&item(1, "BRG-001", "Baterai", 10)).unwrap();
        assert!(lines.update_quantity(id, 12));
        assert_eq!(lines.get(id).unwrap().requested_qty, 12);
    }

    #[test]
    fn test_total_quantity_saturates_on_huge_values() {
        let mut lines = LineItems::new();
        let a = lines.add(&item(1, "BRG-001", "Baterai", 10)).unwrap();
        let b = lines.add(&item(2, "BRG-002", "Baterai", 10)).unwrap();
        lines.update_quantity(a, i64::MAX);
        lines.update_quantity(b, 5);
        assert_eq!(lines.total_quantity(), i64::MAX);

        lines.update_quantity(a, i64::MIN);
        lines.update_quantity(b, -1);
        assert_eq!(lines.total_quantity(), i64::MIN);
    }

    #[test]
    fn test_ids_survive_removal_of_earlier_lines() {
        let mut lines = LineItems::new();
        let a = lines.add(&item(1, "A", "A", 5)).unwrap();
        let b = lines.add(&item(2, "B", "B", 5)).unwrap();
        let c = lines.add(&item(3, "C", "C", 5)).unwrap();

        assert_eq!(lines.remove(a).unwrap().code, "A");
        assert!(lines.update_note(c, "fragile"));
        assert!(lines.update_quantity(b, 3));

        assert_eq!(lines.get(b).unwrap().requested_qty, 3);
        assert_eq!(lines.get(c).unwrap().note, "fragile");
        assert_eq!(lines.total_quantity(), 4);
    }

    #[test]
    fn test_unknown_line_is_reported() {
        let mut lines = LineItems::new();
        let id = lines.add(&item(1, "A", "A", 5)).unwrap();
        lines.remove(id);
        assert!(!lines.update_quantity(id, 2));
        assert!(!lines.update_note(id, "x"));
        assert!(lines.remove(id).is_none());
    }

    #[test]
    fn test_line_id_parse_round_trip() {
        let mut lines = LineItems::new();
        let id = lines.add(&item(1, "A", "A", 5)).unwrap();
        assert_eq!(LineId::parse(&id.to_string()), Some(id));
        assert_eq!(LineId::parse("not-a-uuid"), None);
    }
}
