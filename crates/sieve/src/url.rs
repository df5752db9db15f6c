//! URL state codec.
//!
//! Maps view state to a flat string map and back. Only non-default values
//! are written. The codec owns a fixed set of keys (`page`, `sort`,
//! `page_size`, `search`, `after`, `before`) plus one key per filterable
//! field; every other key belongs to the host and is passed through.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::controller::state::ViewState;
use crate::fields::{FieldSet, RESERVED_KEYS};
use crate::filter::{FilterMap, FilterRegistry};
use crate::pagination::{PaginationMode, PaginationState};
use crate::query::Cursor;
use crate::sort::SortSpec;

pub const PAGE: &str = "page";
pub const SORT: &str = "sort";
pub const PAGE_SIZE: &str = "page_size";
pub const SEARCH: &str = "search";
pub const AFTER: &str = "after";
pub const BEFORE: &str = "before";

/// Flat URL parameter map.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct UrlParams(BTreeMap<String, String>);

impl UrlParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Parse `a=1&b=x%20y`. A leading `?` is ignored; for repeated keys the
    /// last value wins.
    pub fn from_query_string(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        ::url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect()
    }

    /// Serialize in key order.
    pub fn to_query_string(&self) -> String {
        ::url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.0.iter())
            .finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for UrlParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// View state recovered from URL parameters. Absent parameters come back as
/// defaults (`None` / page 1 / empty).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedState {
    pub filters: FilterMap,
    /// Empty when the URL carries no usable sort.
    pub sort: SortSpec,
    pub page: u32,
    pub page_size: Option<u32>,
    pub search: String,
    pub after: Option<Cursor>,
    pub before: Option<Cursor>,
}

impl DecodedState {
    /// Pagination in `mode`, falling back to `default_page_size`.
    pub fn pagination(&self, mode: PaginationMode, default_page_size: u32) -> PaginationState {
        let page_size = self.page_size.unwrap_or(default_page_size);
        match mode {
            PaginationMode::Offset => PaginationState::Offset {
                current_page: self.page.max(1),
                page_size,
            },
            PaginationMode::Keyset => PaginationState::Keyset {
                after: self.after.clone(),
                before: if self.after.is_some() {
                    None
                } else {
                    self.before.clone()
                },
                page_size,
            },
        }
    }
}

/// Bidirectional view state ↔ URL mapping for one collection.
#[derive(Debug, Clone)]
pub struct UrlCodec {
    registry: Arc<FilterRegistry>,
    fields: Arc<FieldSet>,
    default_page_size: u32,
}

impl UrlCodec {
    pub fn new(registry: Arc<FilterRegistry>, fields: Arc<FieldSet>, default_page_size: u32) -> Self {
        Self {
            registry,
            fields,
            default_page_size,
        }
    }

    /// Keys this codec owns.
    pub fn managed_keys(&self) -> Vec<String> {
        RESERVED_KEYS
            .iter()
            .map(|k| (*k).to_string())
            .chain(self.fields.filterable().map(|f| f.field.clone()))
            .collect()
    }

    pub fn is_managed(&self, key: &str) -> bool {
        RESERVED_KEYS.contains(&key) || self.fields.is_filterable(key)
    }

    /// Non-default parts of the view as URL parameters.
    pub fn encode(&self, view: &ViewState) -> UrlParams {
        let mut params = UrlParams::new();

        for (field, value) in view.filters.iter() {
            let Some(meta) = self.fields.meta(field) else {
                continue;
            };
            if let Some(text) = self.registry.encode_value(&meta, value) {
                params.insert(field.clone(), text);
            }
        }

        if !view.sort.is_empty() {
            params.insert(SORT, view.sort.encode());
        }
        let search = view.search.trim();
        if !search.is_empty() {
            params.insert(SEARCH, search);
        }

        let page_size = view.pagination.page_size();
        if page_size != self.default_page_size {
            params.insert(PAGE_SIZE, page_size.to_string());
        }
        match &view.pagination {
            PaginationState::Offset { current_page, .. } => {
                if *current_page > 1 {
                    params.insert(PAGE, current_page.to_string());
                }
            }
            PaginationState::Keyset { after, before, .. } => {
                if let Some(after) = after {
                    params.insert(AFTER, after.as_str());
                } else if let Some(before) = before {
                    params.insert(BEFORE, before.as_str());
                }
            }
        }

        params
    }

    /// Replace the managed keys of `existing` with the encoded view, leaving
    /// every other key as it was.
    pub fn merge(&self, existing: &UrlParams, view: &ViewState) -> UrlParams {
        let mut merged: UrlParams = existing
            .iter()
            .filter(|(k, _)| !self.is_managed(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (k, v) in self.encode(view).iter() {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }

    /// Recover view state. Never fails: malformed values fall back to
    /// defaults and unknown keys are ignored.
    pub fn decode(&self, params: &UrlParams) -> DecodedState {
        let mut decoded = DecodedState {
            page: 1,
            ..DecodedState::default()
        };

        for meta in self.fields.filter_metas() {
            let Some(text) = params.get(&meta.field) else {
                continue;
            };
            if let Some(value) = self.registry.parse_url_value(&meta, text) {
                self.registry.insert(&mut decoded.filters, &meta, value);
            }
        }

        if let Some(text) = params.get(SORT) {
            let mut sort = SortSpec::parse(text);
            sort.retain(|field| {
                let ok = self.fields.is_sortable(field);
                if !ok {
                    tracing::debug!(field, "dropping URL sort key for unknown or unsortable field");
                }
                ok
            });
            decoded.sort = sort;
        }

        if let Some(text) = params.get(PAGE) {
            decoded.page = parse_positive(text).unwrap_or_else(|| {
                tracing::debug!(page = text, "invalid page parameter; using 1");
                1
            });
        }
        decoded.page_size = params.get(PAGE_SIZE).and_then(|text| {
            let size = parse_positive(text);
            if size.is_none() {
                tracing::debug!(page_size = text, "invalid page_size parameter; ignoring");
            }
            size
        });

        if let Some(text) = params.get(SEARCH) {
            decoded.search = text.trim().to_string();
        }
        decoded.after = non_blank(params.get(AFTER)).map(Cursor::new);
        decoded.before = non_blank(params.get(BEFORE)).map(Cursor::new);
        if decoded.after.is_some() && decoded.before.is_some() {
            tracing::debug!("both after and before cursors in URL; using after");
            decoded.before = None;
        }

        decoded
    }
}

fn parse_positive(text: &str) -> Option<u32> {
    text.trim().parse::<u32>().ok().filter(|n| *n > 0)
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::fields::{FieldConfig, FilterOptions};
    use crate::filter::FilterValue;

    fn codec() -> UrlCodec {
        let fields = FieldSet::new(vec![
            FieldConfig::new("name").filter("text"),
            FieldConfig::new("age").filter("number_range"),
            FieldConfig::new("tags").filter("multi_select"),
            FieldConfig::new("status")
                .filter("select")
                .filter_options(FilterOptions::with_choices(["open", "closed"])),
            FieldConfig::new("created").filter("date_range"),
            FieldConfig::new("active").filter("boolean"),
            FieldConfig::new("secret").sortable(false),
        ])
        .unwrap();
        UrlCodec::new(Arc::new(FilterRegistry::new()), Arc::new(fields), 25)
    }

    fn offset_view(page: u32, size: u32) -> ViewState {
        ViewState::new(
            PaginationState::Offset {
                current_page: page,
                page_size: size,
            },
            "id",
        )
    }

    #[test]
    fn defaults_encode_to_nothing() {
        assert!(codec().encode(&offset_view(1, 25)).is_empty());
    }

    #[test]
    fn encodes_filters_sort_and_page() {
        let codec = codec();
        let mut view = offset_view(3, 50);
        let decoded = codec.decode(
            &UrlParams::new()
                .with("name", "ann")
                .with("age", "18,")
                .with("tags", "a,b"),
        );
        view.filters = decoded.filters;
        view.sort = SortSpec::parse("-age,name");

        let params = codec.encode(&view);
        assert_eq!(params.get("name"), Some("ann"));
        assert_eq!(params.get("age"), Some("18,"));
        assert_eq!(params.get("tags"), Some("a,b"));
        assert_eq!(params.get("sort"), Some("-age,name"));
        assert_eq!(params.get("page"), Some("3"));
        assert_eq!(params.get("page_size"), Some("50"));
    }

    #[test]
    fn decode_never_fails() {
        let decoded = codec().decode(
            &UrlParams::new()
                .with("page", "abc")
                .with("page_size", "-4")
                .with("age", "old,older")
                .with("status", "pending")
                .with("utm_source", "mail")
                .with("sort", "secret,-bogus,name"),
        );
        assert_eq!(decoded.page, 1);
        assert_eq!(decoded.page_size, None);
        assert!(decoded.filters.is_empty());
        assert_eq!(decoded.sort.encode(), "name");
    }

    #[test]
    fn page_zero_defaults_to_one() {
        assert_eq!(codec().decode(&UrlParams::new().with("page", "0")).page, 1);
    }

    #[test]
    fn round_trip_offset() {
        let codec = codec();
        let mut view = offset_view(4, 10);
        view.filters = codec
            .decode(
                &UrlParams::new()
                    .with("name", "ann")
                    .with("created", "2024-01-01,2024-02-01")
                    .with("status", "open")
                    .with("active", "false"),
            )
            .filters;
        assert_eq!(view.filters.len(), 4);
        view.sort = SortSpec::parse("--created,++name");
        view.search = "engineer".to_string();

        let decoded = codec.decode(&codec.encode(&view));
        let mut restored = offset_view(1, 25);
        restored.filters = decoded.filters.clone();
        restored.sort = decoded.sort.clone();
        restored.search = decoded.search.clone();
        restored.pagination = decoded.pagination(PaginationMode::Offset, 25);
        assert_eq!(restored, view);
    }

    #[test]
    fn search_is_trimmed_on_encode() {
        let codec = codec();
        let mut view = offset_view(1, 25);
        view.search = "  smith ".into();
        let params = codec.encode(&view);
        assert_eq!(params.get("search"), Some("smith"));
        assert_eq!(codec.decode(&params).search, "smith");

        view.search = "   ".into();
        assert!(!codec.encode(&view).contains("search"));
    }

    #[test]
    fn round_trip_keyset_cursor() {
        let codec = codec();
        let mut view = offset_view(1, 25);
        view.pagination = PaginationState::Keyset {
            after: None,
            before: Some(Cursor::new("WyJBbm4iLDdd")),
            page_size: 25,
        };
        let params = codec.encode(&view);
        assert_eq!(params.get("before"), Some("WyJBbm4iLDdd"));
        assert!(!params.contains("page"));

        let decoded = codec.decode(&params);
        assert_eq!(decoded.pagination(PaginationMode::Keyset, 25), view.pagination);
    }

    #[test]
    fn merge_preserves_foreign_keys() {
        let codec = codec();
        let existing = UrlParams::new()
            .with("tab", "archive")
            .with("name", "stale")
            .with("page", "7");
        let mut view = offset_view(1, 25);
        view.sort = SortSpec::parse("name");

        let merged = codec.merge(&existing, &view);
        assert_eq!(merged.get("tab"), Some("archive"));
        assert_eq!(merged.get("sort"), Some("name"));
        assert!(!merged.contains("name"));
        assert!(!merged.contains("page"));
    }

    #[test]
    fn managed_keys_include_filterable_fields() {
        let keys = codec().managed_keys();
        assert!(keys.contains(&"page".to_string()));
        assert!(keys.contains(&"tags".to_string()));
        assert!(!keys.contains(&"secret".to_string()));
    }

    #[test]
    fn query_string_helpers() {
        let params = UrlParams::from_query_string("?name=ann%20lee&age=18%2C&tab=x");
        assert_eq!(params.get("name"), Some("ann lee"));
        assert_eq!(params.get("age"), Some("18,"));
        assert_eq!(params.to_query_string(), "age=18%2C&name=ann+lee&tab=x");
    }

    #[test]
    fn decoded_filter_values_are_typed() {
        let decoded = codec().decode(&UrlParams::new().with("active", "true"));
        assert_eq!(
            decoded.filters.get("active"),
            Some(&FilterValue::Boolean(Some(true)))
        );
    }
}
