//! View state owned by the controller, and the snapshots it publishes.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::filter::FilterMap;
use crate::pagination::{Page, PageInfo, PaginationState};
use crate::sort::SortSpec;

/// Selected row identifiers.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SelectionState {
    id_field: String,
    ids: BTreeSet<String>,
}

impl SelectionState {
    pub fn new(id_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
            ids: BTreeSet::new(),
        }
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// Flip one row. Returns whether it is now selected.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.ids.remove(id) {
            false
        } else {
            self.ids.insert(id.to_string());
            true
        }
    }

    /// Select every id on the page, or deselect them all if they already are.
    pub fn toggle_all(&mut self, page_ids: &[String]) {
        if !page_ids.is_empty() && page_ids.iter().all(|id| self.ids.contains(id)) {
            for id in page_ids {
                self.ids.remove(id);
            }
        } else {
            self.ids.extend(page_ids.iter().cloned());
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }
}

/// Everything the user has chosen about the view.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ViewState {
    pub filters: FilterMap,
    pub sort: SortSpec,
    pub pagination: PaginationState,
    pub search: String,
    pub selection: SelectionState,
}

impl ViewState {
    pub fn new(pagination: PaginationState, id_field: impl Into<String>) -> Self {
        Self {
            filters: FilterMap::new(),
            sort: SortSpec::new(),
            pagination,
            search: String::new(),
            selection: SelectionState::new(id_field),
        }
    }

    /// The parts of the state that determine which rows are fetched.
    /// Selection is not one of them.
    pub fn same_query_as(&self, other: &ViewState) -> bool {
        self.filters == other.filters
            && self.sort == other.sort
            && self.pagination == other.pagination
            && self.search == other.search
    }
}

/// Load status of the displayed page.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum Status {
    Idle { has_data: bool },
    Loading,
    Error { message: String },
}

impl Status {
    pub fn is_loading(&self) -> bool {
        matches!(self, Status::Loading)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Status::Error { message } => Some(message),
            _ => None,
        }
    }
}

/// Read-only copy of the controller's state for hosts to render.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Snapshot {
    pub view: ViewState,
    pub page: Page,
    pub page_info: PageInfo,
    pub status: Status,
    pub bulk_running: bool,
}
