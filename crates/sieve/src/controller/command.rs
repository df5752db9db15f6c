//! Messages into and out of a running controller.

use std::fmt;
use std::sync::Arc;

use crate::bulk::BulkAction;
use crate::filter::FormPayload;
use crate::pagination::Row;
use crate::query::{ActorContext, Query};
use crate::url::UrlParams;

/// Predicate selecting displayed rows for an in-place patch.
#[derive(Clone)]
pub struct RowMatcher(Arc<dyn Fn(&Row) -> bool + Send + Sync>);

impl RowMatcher {
    pub fn new(f: impl Fn(&Row) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn matches(&self, row: &Row) -> bool {
        (self.0)(row)
    }
}

impl fmt::Debug for RowMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RowMatcher(..)")
    }
}

/// Commands a host sends to its controller.
#[derive(Debug, Clone)]
pub enum Command {
    /// A filter form was submitted. A `search` key, if present, updates the
    /// search term too.
    FilterChanged(FormPayload),
    SearchChanged(String),
    ClearFilter(String),
    ClearAllFilters,
    /// Header click. With `additive` the other sort keys are kept.
    ToggleSort {
        field: String,
        additive: bool,
    },
    /// Offset mode only.
    GotoPage(u32),
    /// Keyset mode only.
    NextPage,
    /// Keyset mode only.
    PrevPage,
    SetPageSize(u32),
    ToggleRow(String),
    ToggleSelectAllOnPage,
    ClearSelection,
    RunBulkAction(BulkAction),
    Refresh,
    /// Merge `patch` into the displayed row with this id; no reload.
    ItemUpdated {
        id: String,
        patch: serde_json::Value,
    },
    ItemsUpdated {
        ids: Vec<String>,
        patch: serde_json::Value,
    },
    ItemsUpdatedWhere {
        matcher: RowMatcher,
        patch: serde_json::Value,
    },
    /// Replace the base query.
    SetQueryable(Query),
    SetActor(ActorContext),
    /// The host's URL parameters changed.
    UrlChanged(UrlParams),
    Unmount,
}

/// Notifications from the controller to its host.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    SelectionChanged { count: usize },
    /// New URL parameters for the host to push into its location.
    UrlChanged(UrlParams),
    Loaded { rows: usize },
    LoadFailed { message: String },
    BulkActionSucceeded {
        action: String,
        result: serde_json::Value,
    },
    BulkActionFailed { action: String, message: String },
}
