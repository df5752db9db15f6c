//! Filter type registry.
//!
//! Maps a filter type tag (the `filter_type` of a field) to a
//! [`FilterHandler`]. Built-in handlers are registered by name; callers add
//! their own handlers with [`FilterRegistry::register_handler`] or declare
//! additional tags that reuse an existing handler with their own options via
//! [`FilterRegistry::apply_declarations`].
//!
//! Two-level lookup: type tag → (handler name, options) → handler.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::codec;
use super::handlers;
use super::value::{FilterMap, FilterValue, FormPayload, RawInput};
use crate::fields::{FieldMeta, FilterOptions};
use crate::query::Query;

/// Behaviour of one filter type.
///
/// Everything except [`build_predicate`](Self::build_predicate) is pure, and
/// nothing here may fail on malformed input: bad input yields `None`.
pub trait FilterHandler: Send + Sync {
    /// Pick this field's raw input out of a submitted form.
    fn form_input(&self, field: &str, form: &FormPayload) -> RawInput {
        codec::text_from_form(field, form)
    }

    /// Split this type's URL text into raw input.
    fn url_input(&self, text: &str) -> RawInput {
        codec::text_from_url(text)
    }

    /// Parse raw input; `None` means "no filter".
    fn process(&self, raw: &RawInput, meta: &FieldMeta) -> Option<FilterValue>;

    fn is_empty(&self, value: &FilterValue) -> bool {
        codec::is_empty(value)
    }

    /// Sanity check before the value is used in a query.
    fn validate(&self, value: &FilterValue) -> bool {
        !self.is_empty(value) && codec::validate(value)
    }

    /// URL text for a value; `None` when the value is empty.
    fn encode(&self, value: &FilterValue) -> Option<String> {
        if self.is_empty(value) {
            return None;
        }
        codec::encode(value)
    }

    /// Append this filter's constraint to `query`.
    fn build_predicate(&self, query: Query, field: &str, value: &FilterValue) -> Query;

    fn default_options(&self) -> FilterOptions;
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

/// A named filter type backed by an existing handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterTypeDeclaration {
    /// Tag fields use in `filter_type`.
    pub name: String,
    /// Handler name, e.g. `"select"`.
    pub handler: String,
    /// Options layered over the handler's defaults.
    #[serde(default)]
    pub options: FilterOptions,
}

struct Registration {
    handler_name: String,
    options: FilterOptions,
}

/// Type tags: non-empty, alphanumeric/underscore/hyphen, starting with a
/// letter or underscore, at most 64 chars.
fn is_valid_type_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Registry of filter handlers, built once and shared by reference.
pub struct FilterRegistry {
    handlers: HashMap<String, Arc<dyn FilterHandler>>,
    declarations: HashMap<String, Registration>,
    fallback: Arc<dyn FilterHandler>,
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("handlers", &self.handler_names())
            .field("declarations", &self.declared_names())
            .finish_non_exhaustive()
    }
}

impl FilterRegistry {
    /// Create a registry with the built-in handlers.
    pub fn new() -> Self {
        let text: Arc<dyn FilterHandler> = Arc::new(handlers::TextFilterHandler);
        let mut registry = Self {
            handlers: HashMap::new(),
            declarations: HashMap::new(),
            fallback: Arc::clone(&text),
        };

        registry.register_handler(handlers::TEXT, text);
        registry.register_handler(handlers::SELECT, Arc::new(handlers::SelectFilterHandler));
        registry.register_handler(
            handlers::MULTI_SELECT,
            Arc::new(handlers::MultiSelectFilterHandler),
        );
        registry.register_handler(handlers::BOOLEAN, Arc::new(handlers::BooleanFilterHandler));
        registry.register_handler(
            handlers::DATE_RANGE,
            Arc::new(handlers::DateRangeFilterHandler),
        );
        registry.register_handler(
            handlers::NUMBER_RANGE,
            Arc::new(handlers::NumberRangeFilterHandler),
        );
        registry.register_handler(handlers::CHECKBOX, Arc::new(handlers::CheckboxFilterHandler));

        registry
    }

    /// Register a handler under `name`. The name is usable as a type tag.
    pub fn register_handler(&mut self, name: &str, handler: Arc<dyn FilterHandler>) {
        if self.handlers.insert(name.to_string(), handler).is_some() {
            tracing::debug!(handler = name, "filter handler replaced");
        }
    }

    /// Apply custom type declarations, returning warnings for rejected or
    /// suspicious entries.
    ///
    /// A declaration whose handler is not registered is still accepted; it
    /// resolves to the text handler until such a handler appears.
    pub fn apply_declarations(&mut self, declarations: Vec<FilterTypeDeclaration>) -> Vec<String> {
        let mut warnings = Vec::new();

        for decl in declarations {
            if !is_valid_type_name(&decl.name) {
                warnings.push(format!(
                    "filter type name '{}' is invalid (must be alphanumeric/underscore/hyphen, start with letter or underscore)",
                    decl.name
                ));
                continue;
            }
            if self.handlers.contains_key(&decl.name) {
                warnings.push(format!(
                    "filter type '{}' shadows a registered handler",
                    decl.name
                ));
            }
            if !self.handlers.contains_key(&decl.handler) {
                warnings.push(format!(
                    "filter type '{}' references unknown handler '{}'; text handler will be used",
                    decl.name, decl.handler
                ));
            }
            if self.declarations.contains_key(&decl.name) {
                warnings.push(format!(
                    "filter type '{}' overwrites existing declaration",
                    decl.name
                ));
            }
            self.declarations.insert(
                decl.name,
                Registration {
                    handler_name: decl.handler,
                    options: decl.options,
                },
            );
        }

        for warning in &warnings {
            tracing::warn!("{warning}");
        }
        warnings
    }

    /// Resolve a type tag.
    ///
    /// Declared tags win over handler names. A declared tag whose handler is
    /// missing resolves to the text handler. Unknown tags resolve to `None`.
    pub fn resolve(&self, tag: &str) -> Option<Arc<dyn FilterHandler>> {
        if let Some(reg) = self.declarations.get(tag) {
            return Some(match self.handlers.get(&reg.handler_name) {
                Some(handler) => Arc::clone(handler),
                None => {
                    tracing::warn!(
                        filter_type = tag,
                        handler = %reg.handler_name,
                        "filter handler not registered; falling back to text"
                    );
                    Arc::clone(&self.fallback)
                }
            });
        }
        self.handlers.get(tag).cloned()
    }

    pub fn is_known(&self, tag: &str) -> bool {
        self.declarations.contains_key(tag) || self.handlers.contains_key(tag)
    }

    /// Options for a field: its own, then the declaration's, then the
    /// handler's defaults.
    pub fn effective_options(&self, meta: &FieldMeta) -> FilterOptions {
        let mut options = meta.options.clone();
        if let Some(reg) = self.declarations.get(&meta.filter_type) {
            options = options.or_defaults(reg.options.clone());
        }
        match self.resolve(&meta.filter_type) {
            Some(handler) => options.or_defaults(handler.default_options()),
            None => options,
        }
    }

    pub fn handler_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn declared_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.declarations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn handler_for(&self, meta: &FieldMeta) -> Option<Arc<dyn FilterHandler>> {
        let handler = self.resolve(&meta.filter_type);
        if handler.is_none() {
            tracing::warn!(
                field = %meta.field,
                filter_type = %meta.filter_type,
                "unknown filter type; field is not filtered"
            );
        }
        handler
    }

    /// Metadata with options merged, so handlers see declared choices.
    fn resolved_meta(&self, meta: &FieldMeta) -> FieldMeta {
        FieldMeta {
            options: self.effective_options(meta),
            ..meta.clone()
        }
    }

    /// Parse a submitted form into a filter map. Fields without input, with
    /// invalid input, or with an unknown type are left out.
    pub fn parse_form(&self, metas: &[FieldMeta], form: &FormPayload) -> FilterMap {
        let mut filters = FilterMap::new();
        for meta in metas {
            let Some(handler) = self.handler_for(meta) else {
                continue;
            };
            let raw = handler.form_input(&meta.field, form);
            if raw == RawInput::Missing {
                continue;
            }
            if let Some(value) = self.accept(handler.as_ref(), &raw, meta) {
                filters.insert(meta.field.clone(), value);
            }
        }
        filters
    }

    /// Parse one field's URL text.
    pub fn parse_url_value(&self, meta: &FieldMeta, text: &str) -> Option<FilterValue> {
        let handler = self.handler_for(meta)?;
        self.accept(handler.as_ref(), &handler.url_input(text), meta)
    }

    fn accept(
        &self,
        handler: &dyn FilterHandler,
        raw: &RawInput,
        meta: &FieldMeta,
    ) -> Option<FilterValue> {
        let value = handler.process(raw, &self.resolved_meta(meta));
        match value {
            Some(v) if !handler.is_empty(&v) => Some(v),
            _ => {
                tracing::debug!(field = %meta.field, raw = ?raw, "filter input ignored");
                None
            }
        }
    }

    /// Insert a value into `filters` if it is non-empty for the field's type.
    /// Returns whether it was inserted.
    pub fn insert(&self, filters: &mut FilterMap, meta: &FieldMeta, value: FilterValue) -> bool {
        match self.resolve(&meta.filter_type) {
            Some(handler) if !handler.is_empty(&value) => {
                filters.insert(meta.field.clone(), value);
                true
            }
            _ => false,
        }
    }

    /// URL text for one field's value.
    pub fn encode_value(&self, meta: &FieldMeta, value: &FilterValue) -> Option<String> {
        self.resolve(&meta.filter_type)?.encode(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::query::Predicate;

    fn decl(name: &str, handler: &str) -> FilterTypeDeclaration {
        FilterTypeDeclaration {
            name: name.to_string(),
            handler: handler.to_string(),
            options: FilterOptions::default(),
        }
    }

    #[test]
    fn builtin_handlers_are_registered() {
        let registry = FilterRegistry::new();
        assert_eq!(
            registry.handler_names(),
            vec![
                "boolean",
                "checkbox",
                "date_range",
                "multi_select",
                "number_range",
                "select",
                "text"
            ]
        );
    }

    #[test]
    fn unknown_tag_resolves_to_none() {
        let registry = FilterRegistry::new();
        assert!(registry.resolve("geo_radius").is_none());
        assert!(!registry.is_known("geo_radius"));
    }

    #[test]
    fn declaration_reuses_handler_with_options() {
        let mut registry = FilterRegistry::new();
        let warnings = registry.apply_declarations(vec![FilterTypeDeclaration {
            name: "priority".to_string(),
            handler: "select".to_string(),
            options: FilterOptions::with_choices(["low", "high"]),
        }]);
        assert!(warnings.is_empty());

        let meta = FieldMeta::new("priority", "priority");
        assert_eq!(
            registry.parse_url_value(&meta, "high"),
            Some(FilterValue::SingleSelect("high".into()))
        );
        assert_eq!(registry.parse_url_value(&meta, "urgent"), None);
        assert_eq!(
            registry.effective_options(&meta).prompt.as_deref(),
            Some("Any")
        );
    }

    #[test]
    fn missing_handler_falls_back_to_text_instance() {
        let mut registry = FilterRegistry::new();
        let warnings = registry.apply_declarations(vec![decl("fancy", "does_not_exist")]);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("unknown handler"));

        let fallback = registry.resolve("fancy").unwrap();
        let text = registry.resolve("text").unwrap();
        assert!(Arc::ptr_eq(&fallback, &text));

        let query = fallback.build_predicate(
            Query::new("t"),
            "notes",
            &FilterValue::Text("urgent".into()),
        );
        assert_eq!(query.predicates(), &[Predicate::contains("notes", "urgent")]);
    }

    #[test]
    fn invalid_names_and_overwrites_warn() {
        let mut registry = FilterRegistry::new();
        let warnings = registry.apply_declarations(vec![
            decl("", "text"),
            decl("has spaces", "text"),
            decl("9lives", "text"),
            decl("tags", "multi_select"),
            decl("tags", "select"),
        ]);
        assert_eq!(warnings.len(), 4);
        assert!(warnings[3].contains("overwrites"));
        assert_eq!(registry.declared_names(), vec!["tags"]);
    }

    #[test]
    fn late_registered_handler_is_picked_up() {
        struct Upper;
        impl FilterHandler for Upper {
            fn process(&self, raw: &RawInput, _meta: &FieldMeta) -> Option<FilterValue> {
                codec::process_text(raw).map(|v| match v {
                    FilterValue::Text(s) => FilterValue::Text(s.to_uppercase()),
                    other => other,
                })
            }
            fn build_predicate(&self, query: Query, field: &str, value: &FilterValue) -> Query {
                match value {
                    FilterValue::Text(s) => query.filter(Predicate::equals(field, s)),
                    _ => query,
                }
            }
            fn default_options(&self) -> FilterOptions {
                FilterOptions::default()
            }
        }

        let mut registry = FilterRegistry::new();
        registry.apply_declarations(vec![decl("code", "upper")]);
        registry.register_handler("upper", Arc::new(Upper));

        let meta = FieldMeta::new("sku", "code");
        assert_eq!(
            registry.parse_url_value(&meta, "ab-1"),
            Some(FilterValue::Text("AB-1".into()))
        );
    }

    #[test]
    fn parse_form_drops_empty_and_unknown() {
        let registry = FilterRegistry::new();
        let metas = vec![
            FieldMeta::new("name", "text"),
            FieldMeta::new("age", "number_range"),
            FieldMeta::new("city", "text"),
            FieldMeta::new("geo", "geo_radius"),
        ];
        let form = FormPayload::new()
            .with("name", "ann")
            .with("age_min", "")
            .with("age_max", "")
            .with("city", "   ")
            .with("geo", "52.1,4.3");

        let filters = registry.parse_form(&metas, &form);
        assert_eq!(filters.len(), 1);
        assert_eq!(filters.get("name"), Some(&FilterValue::Text("ann".into())));
    }

    #[test]
    fn insert_refuses_empty_values() {
        let registry = FilterRegistry::new();
        let meta = FieldMeta::new("age", "number_range");
        let mut filters = FilterMap::new();
        assert!(!registry.insert(&mut filters, &meta, FilterValue::number_range("", " ")));
        assert!(registry.insert(&mut filters, &meta, FilterValue::number_range("", "40")));
        assert_eq!(filters.len(), 1);
    }

    #[test]
    fn insert_refuses_empty_value_of_every_builtin() {
        let registry = FilterRegistry::new();
        let cases = [
            (handlers::TEXT, FilterValue::Text("  ".into())),
            (handlers::SELECT, FilterValue::SingleSelect(String::new())),
            (handlers::MULTI_SELECT, FilterValue::MultiSelect(vec![])),
            (handlers::MULTI_SELECT, FilterValue::MultiSelect(vec![" ".into()])),
            (handlers::BOOLEAN, FilterValue::Boolean(None)),
            (handlers::DATE_RANGE, FilterValue::date_range("", " ")),
            (handlers::NUMBER_RANGE, FilterValue::number_range(" ", "")),
            (handlers::CHECKBOX, FilterValue::Boolean(None)),
            (handlers::CHECKBOX, FilterValue::Boolean(Some(false))),
        ];

        for (filter_type, value) in cases {
            let meta = FieldMeta::new("field", filter_type);
            let mut filters = FilterMap::new();
            assert!(
                !registry.insert(&mut filters, &meta, value.clone()),
                "{filter_type} accepted {value:?}"
            );
            assert!(filters.is_empty());
        }
    }

    #[test]
    fn declaration_serde_defaults_options() {
        let decl: FilterTypeDeclaration =
            serde_json::from_str(r#"{"name": "region", "handler": "multi_select"}"#).unwrap();
        assert_eq!(decl.options, FilterOptions::default());
    }
}
