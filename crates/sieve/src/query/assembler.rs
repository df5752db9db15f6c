//! Query assembly: fold filters, sort and pagination onto a base query.
//!
//! Configuration problems found here (unknown filter types, sort keys naming
//! undeclared fields) are logged and skipped so the view keeps working.

use std::sync::Arc;

use super::types::{Ordering, PageRequest, Query};
use crate::fields::FieldSet;
use crate::filter::{FilterMap, FilterRegistry, FilterValue};
use crate::pagination::PaginationState;
use crate::sort::{SortKey, SortSpec};

/// Upper bound on rows per page unless configured otherwise.
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 500;

/// Builds executable queries for one collection.
#[derive(Debug, Clone)]
pub struct QueryAssembler {
    registry: Arc<FilterRegistry>,
    fields: Arc<FieldSet>,
    max_page_size: u32,
}

impl QueryAssembler {
    pub fn new(registry: Arc<FilterRegistry>, fields: Arc<FieldSet>) -> Self {
        Self {
            registry,
            fields,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }

    #[must_use]
    pub fn with_max_page_size(mut self, max: u32) -> Self {
        self.max_page_size = max.max(1);
        self
    }

    pub fn registry(&self) -> &Arc<FilterRegistry> {
        &self.registry
    }

    pub fn fields(&self) -> &Arc<FieldSet> {
        &self.fields
    }

    /// Build the query for the given state. Nothing is executed.
    pub fn assemble(
        &self,
        base: Query,
        filters: &FilterMap,
        sort: &SortSpec,
        pagination: &PaginationState,
    ) -> Query {
        let query = self.apply_filters(base, filters);
        let query = self.apply_sort(query, sort);
        self.apply_pagination(query, pagination)
    }

    /// Fold filters in field order. An empty map returns `base` untouched.
    pub fn apply_filters(&self, base: Query, filters: &FilterMap) -> Query {
        if filters.is_empty() {
            return base;
        }
        filters
            .iter()
            .fold(base, |query, (field, value)| self.apply_filter(query, field, value))
    }

    fn apply_filter(&self, query: Query, field: &str, value: &FilterValue) -> Query {
        let Some(config) = self.fields.get(field).filter(|f| f.filterable) else {
            tracing::warn!(field, "filter on undeclared or non-filterable field; ignoring");
            return query;
        };

        if let Some(custom) = &config.custom_predicate {
            return custom.apply(query, field, value);
        }

        let Some(meta) = self.fields.meta(field) else {
            return query;
        };
        let Some(handler) = self.registry.resolve(&meta.filter_type) else {
            tracing::warn!(
                field,
                filter_type = %meta.filter_type,
                "unknown filter type; field is not filtered"
            );
            return query;
        };

        if !handler.validate(value) {
            tracing::debug!(field, value = ?value, "filter value failed validation; ignoring");
            return query;
        }
        handler.build_predicate(query, field, value)
    }

    /// Replace the query's ordering with `sort`. An empty spec, or one whose
    /// keys are all rejected, keeps the existing ordering.
    pub fn apply_sort(&self, query: Query, sort: &SortSpec) -> Query {
        let keys: Vec<&SortKey> = sort.iter().filter(|key| self.is_sortable(key)).collect();
        if keys.is_empty() {
            return query;
        }

        keys.into_iter()
            .fold(query.clear_ordering(), |query, key| {
                match self
                    .fields
                    .get(&key.field)
                    .and_then(|f| f.custom_sort.as_ref())
                {
                    Some(custom) => custom.apply(query, &key.field, key.direction),
                    None => query.order_by(Ordering::field(&key.field, key.direction)),
                }
            })
    }

    fn is_sortable(&self, key: &SortKey) -> bool {
        match self.fields.get(&key.field) {
            Some(config) if config.sortable => true,
            Some(_) => {
                tracing::warn!(field = %key.field, "sort key references non-sortable field; ignoring");
                false
            }
            None => {
                tracing::warn!(field = %key.field, "sort key references unknown field; ignoring");
                false
            }
        }
    }

    /// Attach the page request. Oversized pages are capped.
    pub fn apply_pagination(&self, query: Query, pagination: &PaginationState) -> Query {
        let limit = self.cap_page_size(pagination.page_size());
        let page = match pagination {
            PaginationState::Offset { current_page, .. } => PageRequest::Offset {
                offset: u64::from(current_page.saturating_sub(1)) * u64::from(limit),
                limit,
                count: true,
            },
            PaginationState::Keyset { after, before, .. } => PageRequest::Keyset {
                after: after.clone(),
                before: before.clone(),
                limit,
            },
        };
        query.paginate(page)
    }

    fn cap_page_size(&self, requested: u32) -> u32 {
        if requested > self.max_page_size {
            tracing::warn!(
                requested,
                max = self.max_page_size,
                "page size exceeds maximum, capping"
            );
            return self.max_page_size;
        }
        requested.max(1)
    }
}
