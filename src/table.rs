//! Client-side table state: text filter, column sort and pagination.
//!
//! Operates on rows already fetched for the page; it never triggers a
//! request.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const DEFAULT_PER_PAGE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortValue {
    Int(i64),
    Text(String),
    Date(NaiveDate),
}

impl SortValue {
    pub fn text(s: &str) -> Self {
        SortValue::Text(s.to_lowercase())
    }

    fn compare(&self, other: &SortValue) -> Ordering {
        match (self, other) {
            (SortValue::Int(a), SortValue::Int(b)) => a.cmp(b),
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            (SortValue::Date(a), SortValue::Date(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

pub trait TableRow {
    /// `needle` is already lowercased and non-empty.
    fn matches(&self, needle: &str) -> bool;

    /// `None` for columns the row does not know; such sorts are ignored.
    fn sort_value(&self, column: &str) -> Option<SortValue>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableState {
    pub filter: String,
    pub sort: Option<(String, SortDirection)>,
    /// 1-based.
    pub page: usize,
    pub per_page: usize,
}

impl Default for TableState {
    fn default() -> Self {
        Self {
            filter: String::new(),
            sort: None,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TablePage<'a, T> {
    pub rows: Vec<&'a T>,
    pub total: usize,
    pub filtered: usize,
    pub page: usize,
    pub page_count: usize,
}

impl TableState {
    pub fn set_filter(&mut self, filter: &str) {
        self.filter = filter.to_string();
        self.page = 1;
    }

    /// Clicking the same column again flips the direction.
    pub fn sort_by(&mut self, column: &str) {
        self.sort = match self.sort.take() {
            Some((current, SortDirection::Asc)) if current == column => {
                Some((current, SortDirection::Desc))
            }
            _ => Some((column.to_string(), SortDirection::Asc)),
        };
        self.page = 1;
    }

    pub fn set_sort(&mut self, column: &str, direction: SortDirection) {
        self.sort = Some((column.to_string(), direction));
        self.page = 1;
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page.max(1);
    }

    pub fn set_per_page(&mut self, per_page: usize) {
        self.per_page = per_page.max(1);
        self.page = 1;
    }

    pub fn apply<'a, T: TableRow>(&self, rows: &'a [T]) -> TablePage<'a, T> {
        let total = rows.len();
        let needle = self.filter.trim().to_lowercase();
        let mut visible: Vec<&T> = rows
            .iter()
            .filter(|r| needle.is_empty() || r.matches(&needle))
            .collect();

        if let Some((column, direction)) = &self.sort {
            visible.sort_by(|a, b| {
                let ord = match (a.sort_value(column), b.sort_value(column)) {
                    (Some(x), Some(y)) => x.compare(&y),
                    _ => Ordering::Equal,
                };
                match direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            });
        }

        let filtered = visible.len();
        let per_page = self.per_page.max(1);
        let page_count = filtered.div_ceil(per_page).max(1);
        let page = self.page.clamp(1, page_count);
        let page_rows = visible
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .collect();

        TablePage {
            rows: page_rows,
            total,
            filtered,
            page,
            page_count,
        }
    }
}
