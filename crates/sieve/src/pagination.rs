//! Pagination state and result pages.

use serde::{Deserialize, Serialize};

use crate::query::Cursor;

/// How a collection pages through its rows. Fixed for a controller's life.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaginationMode {
    #[default]
    Offset,
    Keyset,
}

/// Current position within the collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum PaginationState {
    Offset {
        /// 1-based.
        current_page: u32,
        page_size: u32,
    },
    /// At most one of `after` / `before` is set.
    Keyset {
        after: Option<Cursor>,
        before: Option<Cursor>,
        page_size: u32,
    },
}

impl PaginationState {
    /// First page in the given mode.
    pub fn start(mode: PaginationMode, page_size: u32) -> Self {
        let page_size = page_size.max(1);
        match mode {
            PaginationMode::Offset => PaginationState::Offset {
                current_page: 1,
                page_size,
            },
            PaginationMode::Keyset => PaginationState::Keyset {
                after: None,
                before: None,
                page_size,
            },
        }
    }

    pub fn mode(&self) -> PaginationMode {
        match self {
            PaginationState::Offset { .. } => PaginationMode::Offset,
            PaginationState::Keyset { .. } => PaginationMode::Keyset,
        }
    }

    pub fn page_size(&self) -> u32 {
        match self {
            PaginationState::Offset { page_size, .. } | PaginationState::Keyset { page_size, .. } => {
                *page_size
            }
        }
    }

    /// Current page number; `None` in keyset mode.
    pub fn current_page(&self) -> Option<u32> {
        match self {
            PaginationState::Offset { current_page, .. } => Some(*current_page),
            PaginationState::Keyset { .. } => None,
        }
    }

    /// Back to page 1 / no cursors, keeping the page size.
    #[must_use]
    pub fn reset(&self) -> Self {
        Self::start(self.mode(), self.page_size())
    }

    /// A new page size always restarts from the beginning.
    #[must_use]
    pub fn with_page_size(&self, page_size: u32) -> Self {
        Self::start(self.mode(), page_size)
    }

    pub fn is_at_start(&self) -> bool {
        match self {
            PaginationState::Offset { current_page, .. } => *current_page <= 1,
            PaginationState::Keyset { after, before, .. } => after.is_none() && before.is_none(),
        }
    }
}

/// One displayed row: the record as JSON plus its keyset cursor, if the
/// executor provides one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Row {
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

impl Row {
    pub fn new(data: serde_json::Value) -> Self {
        Self { data, cursor: None }
    }

    #[must_use]
    pub fn with_cursor(mut self, cursor: Cursor) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// The row's identifier as a string. Numbers are stringified.
    pub fn id(&self, id_field: &str) -> Option<String> {
        match self.data.get(id_field)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Shallow-merge the keys of a JSON object into the row.
    ///
    /// Non-object patches and rows are left untouched.
    pub fn merge(&mut self, patch: &serde_json::Value) -> bool {
        let (Some(target), Some(patch)) = (self.data.as_object_mut(), patch.as_object()) else {
            return false;
        };
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
        true
    }
}

/// A page of results as returned by an executor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Page {
    pub rows: Vec<Row>,
    /// Total matching rows, when the executor was asked to count.
    pub total_count: Option<u64>,
    pub has_next: bool,
    pub has_prev: bool,
    /// 1-based index of the first row; 0 when the page is empty.
    pub start_index: u64,
    /// 1-based index of the last row; 0 when the page is empty.
    pub end_index: u64,
}

impl Page {
    /// Offset page with the paging calculations done from the total count.
    pub fn offset(rows: Vec<Row>, total: u64, offset: u64) -> Self {
        let len = rows.len() as u64;
        let (start_index, end_index) = if len == 0 {
            (0, 0)
        } else {
            (offset + 1, offset + len)
        };
        Self {
            rows,
            total_count: Some(total),
            has_next: offset + len < total,
            has_prev: offset > 0,
            start_index,
            end_index,
        }
    }

    pub fn keyset(rows: Vec<Row>, has_next: bool, has_prev: bool) -> Self {
        let len = rows.len() as u64;
        Self {
            rows,
            total_count: None,
            has_next,
            has_prev,
            start_index: u64::from(len > 0),
            end_index: len,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn first_cursor(&self) -> Option<Cursor> {
        self.rows.first().and_then(|r| r.cursor.clone())
    }

    pub fn last_cursor(&self) -> Option<Cursor> {
        self.rows.last().and_then(|r| r.cursor.clone())
    }

    pub fn ids(&self, id_field: &str) -> Vec<String> {
        self.rows.iter().filter_map(|r| r.id(id_field)).collect()
    }
}

/// Pagination summary for display.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PageInfo {
    pub page_size: u32,
    /// Offset mode only.
    pub current_page: Option<u32>,
    pub total_count: Option<u64>,
    pub total_pages: Option<u32>,
    pub has_next: bool,
    pub has_prev: bool,
    pub start_index: u64,
    pub end_index: u64,
}

impl PageInfo {
    pub fn new(state: &PaginationState, page: &Page) -> Self {
        let page_size = state.page_size();
        let total_pages = page
            .total_count
            .map(|total| total.div_ceil(u64::from(page_size.max(1))))
            .map(|pages| u32::try_from(pages).unwrap_or(u32::MAX));
        Self {
            page_size,
            current_page: state.current_page(),
            total_count: page.total_count,
            total_pages,
            has_next: page.has_next,
            has_prev: page.has_prev,
            start_index: page.start_index,
            end_index: page.end_index,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(n: usize) -> Vec<Row> {
        (0..n).map(|i| Row::new(json!({ "id": i }))).collect()
    }

    #[test]
    fn offset_page_middle() {
        let page = Page::offset(rows(10), 25, 10);
        assert!(page.has_next);
        assert!(page.has_prev);
        assert_eq!((page.start_index, page.end_index), (11, 20));

        let state = PaginationState::Offset {
            current_page: 2,
            page_size: 10,
        };
        let info = PageInfo::new(&state, &page);
        assert_eq!(info.total_pages, Some(3));
        assert_eq!(info.current_page, Some(2));
    }

    #[test]
    fn offset_page_last_and_empty() {
        let page = Page::offset(rows(5), 25, 20);
        assert!(!page.has_next);
        assert_eq!(page.end_index, 25);

        let page = Page::offset(vec![], 0, 0);
        assert!(!page.has_next && !page.has_prev);
        assert_eq!((page.start_index, page.end_index), (0, 0));
    }

    #[test]
    fn page_size_change_resets_position() {
        let state = PaginationState::Keyset {
            after: Some(Cursor::new("c9")),
            before: None,
            page_size: 25,
        };
        let resized = state.with_page_size(50);
        assert!(resized.is_at_start());
        assert_eq!(resized.page_size(), 50);
        assert_eq!(resized.mode(), PaginationMode::Keyset);
    }

    #[test]
    fn zero_page_size_is_clamped() {
        assert_eq!(PaginationState::start(PaginationMode::Offset, 0).page_size(), 1);
    }

    #[test]
    fn row_ids_and_cursors() {
        let page = Page::keyset(
            vec![
                Row::new(json!({"id": "a"})).with_cursor(Cursor::new("ca")),
                Row::new(json!({"id": 7})).with_cursor(Cursor::new("c7")),
            ],
            true,
            false,
        );
        assert_eq!(page.ids("id"), vec!["a", "7"]);
        assert_eq!(page.first_cursor(), Some(Cursor::new("ca")));
        assert_eq!(page.last_cursor(), Some(Cursor::new("c7")));
        assert_eq!(page.total_count, None);
    }

    #[test]
    fn row_merge_is_shallow() {
        let mut row = Row::new(json!({"id": 1, "title": "old", "meta": {"a": 1}}));
        assert!(row.merge(&json!({"title": "new", "meta": {"b": 2}})));
        assert_eq!(row.data, json!({"id": 1, "title": "new", "meta": {"b": 2}}));
        assert!(!row.merge(&json!("nope")));
    }
}
