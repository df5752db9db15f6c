//! Built-in filter handlers.
//!
//! One unit struct per filter type. The conversions themselves live in
//! [`codec`](super::codec); handlers pick the right ones and turn values into
//! predicates.

use super::codec;
use super::registry::FilterHandler;
use super::value::{FilterValue, FormPayload, RawInput};
use crate::fields::{FieldMeta, FilterOptions, SelectOption};
use crate::query::{Predicate, Query};

/// Handler names registered by [`FilterRegistry::new`](super::FilterRegistry::new).
pub const TEXT: &str = "text";
pub const SELECT: &str = "select";
pub const MULTI_SELECT: &str = "multi_select";
pub const BOOLEAN: &str = "boolean";
pub const DATE_RANGE: &str = "date_range";
pub const NUMBER_RANGE: &str = "number_range";
pub const CHECKBOX: &str = "checkbox";

fn mismatch(field: &str, handler: &str, value: &FilterValue) {
    tracing::debug!(
        field,
        handler,
        value = ?value,
        "filter value does not match handler type; leaving query unconstrained"
    );
}

fn range_operands(a: &str, b: &str) -> (Option<String>, Option<String>) {
    let bound = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    };
    (bound(a), bound(b))
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

/// Case-insensitive substring match.
pub struct TextFilterHandler;

impl FilterHandler for TextFilterHandler {
    fn process(&self, raw: &RawInput, _meta: &FieldMeta) -> Option<FilterValue> {
        codec::process_text(raw)
    }

    fn build_predicate(&self, query: Query, field: &str, value: &FilterValue) -> Query {
        match value {
            FilterValue::Text(text) => query.filter(Predicate::contains(field, text.trim())),
            other => {
                mismatch(field, TEXT, other);
                query
            }
        }
    }

    fn default_options(&self) -> FilterOptions {
        FilterOptions {
            placeholder: Some("Search…".to_string()),
            ..FilterOptions::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Select / multi-select
// ---------------------------------------------------------------------------

/// Exact match against one declared choice.
pub struct SelectFilterHandler;

impl FilterHandler for SelectFilterHandler {
    fn process(&self, raw: &RawInput, meta: &FieldMeta) -> Option<FilterValue> {
        codec::process_select(raw, &meta.options.allowed_values())
    }

    fn build_predicate(&self, query: Query, field: &str, value: &FilterValue) -> Query {
        match value {
            FilterValue::SingleSelect(choice) => query.filter(Predicate::equals(field, choice)),
            other => {
                mismatch(field, SELECT, other);
                query
            }
        }
    }

    fn default_options(&self) -> FilterOptions {
        FilterOptions {
            prompt: Some("Any".to_string()),
            ..FilterOptions::default()
        }
    }
}

/// Membership in a set of declared choices.
pub struct MultiSelectFilterHandler;

impl FilterHandler for MultiSelectFilterHandler {
    fn form_input(&self, field: &str, form: &FormPayload) -> RawInput {
        codec::list_from_form(field, form)
    }

    fn url_input(&self, text: &str) -> RawInput {
        codec::list_from_url(text)
    }

    fn process(&self, raw: &RawInput, meta: &FieldMeta) -> Option<FilterValue> {
        codec::process_multi_select(raw, &meta.options.allowed_values())
    }

    fn build_predicate(&self, query: Query, field: &str, value: &FilterValue) -> Query {
        match value {
            FilterValue::MultiSelect(choices) => {
                query.filter(Predicate::is_in(field, choices.clone()))
            }
            other => {
                mismatch(field, MULTI_SELECT, other);
                query
            }
        }
    }

    fn default_options(&self) -> FilterOptions {
        FilterOptions::default()
    }
}

// ---------------------------------------------------------------------------
// Boolean / checkbox
// ---------------------------------------------------------------------------

/// Tri-state yes / no / any.
pub struct BooleanFilterHandler;

impl FilterHandler for BooleanFilterHandler {
    fn process(&self, raw: &RawInput, _meta: &FieldMeta) -> Option<FilterValue> {
        codec::process_boolean(raw)
    }

    fn build_predicate(&self, query: Query, field: &str, value: &FilterValue) -> Query {
        match value {
            FilterValue::Boolean(Some(b)) => query.filter(Predicate::is(field, *b)),
            other => {
                mismatch(field, BOOLEAN, other);
                query
            }
        }
    }

    fn default_options(&self) -> FilterOptions {
        FilterOptions {
            prompt: Some("Any".to_string()),
            choices: vec![
                SelectOption {
                    value: "true".to_string(),
                    label: Some("Yes".to_string()),
                },
                SelectOption {
                    value: "false".to_string(),
                    label: Some("No".to_string()),
                },
            ],
            ..FilterOptions::default()
        }
    }
}

/// Checked means "must be true"; unchecked means no filter.
pub struct CheckboxFilterHandler;

impl FilterHandler for CheckboxFilterHandler {
    fn process(&self, raw: &RawInput, _meta: &FieldMeta) -> Option<FilterValue> {
        codec::process_checkbox(raw)
    }

    fn is_empty(&self, value: &FilterValue) -> bool {
        !matches!(value, FilterValue::Boolean(Some(true)))
    }

    fn build_predicate(&self, query: Query, field: &str, value: &FilterValue) -> Query {
        match value {
            FilterValue::Boolean(Some(true)) => query.filter(Predicate::is(field, true)),
            other => {
                mismatch(field, CHECKBOX, other);
                query
            }
        }
    }

    fn default_options(&self) -> FilterOptions {
        FilterOptions::default()
    }
}

// ---------------------------------------------------------------------------
// Ranges
// ---------------------------------------------------------------------------

/// Inclusive date range, `{field}_from` / `{field}_to` in forms.
pub struct DateRangeFilterHandler;

impl FilterHandler for DateRangeFilterHandler {
    fn form_input(&self, field: &str, form: &FormPayload) -> RawInput {
        codec::range_from_form(field, form, "from", "to")
    }

    fn url_input(&self, text: &str) -> RawInput {
        codec::range_from_url(text)
    }

    fn process(&self, raw: &RawInput, _meta: &FieldMeta) -> Option<FilterValue> {
        codec::process_date_range(raw)
    }

    fn build_predicate(&self, query: Query, field: &str, value: &FilterValue) -> Query {
        match value {
            FilterValue::DateRange { from, to } => {
                let (lower, upper) = range_operands(from, to);
                query.filter(Predicate::between(field, lower, upper))
            }
            other => {
                mismatch(field, DATE_RANGE, other);
                query
            }
        }
    }

    fn default_options(&self) -> FilterOptions {
        FilterOptions {
            placeholder: Some("YYYY-MM-DD".to_string()),
            ..FilterOptions::default()
        }
    }
}

/// Inclusive numeric range, `{field}_min` / `{field}_max` in forms.
pub struct NumberRangeFilterHandler;

impl FilterHandler for NumberRangeFilterHandler {
    fn form_input(&self, field: &str, form: &FormPayload) -> RawInput {
        codec::range_from_form(field, form, "min", "max")
    }

    fn url_input(&self, text: &str) -> RawInput {
        codec::range_from_url(text)
    }

    fn process(&self, raw: &RawInput, _meta: &FieldMeta) -> Option<FilterValue> {
        codec::process_number_range(raw)
    }

    fn build_predicate(&self, query: Query, field: &str, value: &FilterValue) -> Query {
        match value {
            FilterValue::NumberRange { min, max } => {
                let (lower, upper) = range_operands(min, max);
                query.filter(Predicate::between(field, lower, upper))
            }
            other => {
                mismatch(field, NUMBER_RANGE, other);
                query
            }
        }
    }

    fn default_options(&self) -> FilterOptions {
        FilterOptions::default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::query::{FilterOperator, Operand};

    fn meta(field: &str, filter_type: &str) -> FieldMeta {
        FieldMeta::new(field, filter_type)
    }

    #[test]
    fn text_builds_contains_predicate() {
        let query = TextFilterHandler.build_predicate(
            Query::new("people"),
            "name",
            &FilterValue::Text("ann".into()),
        );
        assert_eq!(query.predicates(), &[Predicate::contains("name", "ann")]);
    }

    #[test]
    fn mismatched_value_leaves_query_alone() {
        let query = TextFilterHandler.build_predicate(
            Query::new("people"),
            "name",
            &FilterValue::Boolean(Some(true)),
        );
        assert!(query.predicates().is_empty());
    }

    #[test]
    fn number_range_form_to_predicate() {
        let form = FormPayload::new().with("age_min", "18").with("age_max", "");
        let handler = NumberRangeFilterHandler;
        let raw = handler.form_input("age", &form);
        let value = handler.process(&raw, &meta("age", NUMBER_RANGE)).unwrap();
        assert_eq!(value, FilterValue::number_range("18", ""));

        let query = handler.build_predicate(Query::new("people"), "age", &value);
        let predicate = &query.predicates()[0];
        assert_eq!(predicate.operator, FilterOperator::Between);
        assert_eq!(
            predicate.operand,
            Operand::Range {
                lower: Some("18".to_string()),
                upper: None,
            }
        );
    }

    #[test]
    fn date_range_uses_from_to_suffixes() {
        let form = FormPayload::new()
            .with("created_from", "2024-01-01")
            .with("created_to", "2024-06-30");
        let handler = DateRangeFilterHandler;
        let value = handler
            .process(&handler.form_input("created", &form), &meta("created", DATE_RANGE))
            .unwrap();
        assert_eq!(value, FilterValue::date_range("2024-01-01", "2024-06-30"));
        assert_eq!(handler.encode(&value).unwrap(), "2024-01-01,2024-06-30");
    }

    #[test]
    fn select_checks_declared_choices() {
        let mut status = meta("status", SELECT);
        status.options = FilterOptions::with_choices(["open", "closed"]);

        let handler = SelectFilterHandler;
        assert!(
            handler
                .process(&RawInput::Text("archived".into()), &status)
                .is_none()
        );
        let value = handler
            .process(&RawInput::Text("open".into()), &status)
            .unwrap();
        let query = handler.build_predicate(Query::new("tickets"), "status", &value);
        assert_eq!(query.predicates(), &[Predicate::equals("status", "open")]);
    }

    #[test]
    fn multi_select_url_text_is_comma_split() {
        let handler = MultiSelectFilterHandler;
        let value = handler
            .process(&handler.url_input("rust,go"), &meta("tags", MULTI_SELECT))
            .unwrap();
        assert_eq!(
            value,
            FilterValue::MultiSelect(vec!["rust".into(), "go".into()])
        );
        let query = handler.build_predicate(Query::new("posts"), "tags", &value);
        assert_eq!(query.predicates()[0].operator, FilterOperator::In);
    }

    #[test]
    fn checkbox_unchecked_is_empty() {
        let handler = CheckboxFilterHandler;
        assert!(handler.is_empty(&FilterValue::Boolean(Some(false))));
        assert!(!handler.is_empty(&FilterValue::Boolean(Some(true))));
        let query = handler.build_predicate(
            Query::new("t"),
            "active",
            &FilterValue::Boolean(Some(true)),
        );
        assert_eq!(query.predicates(), &[Predicate::is("active", true)]);
    }

    #[test]
    fn boolean_any_produces_no_value() {
        let handler = BooleanFilterHandler;
        assert!(
            handler
                .process(&RawInput::Text(String::new()), &meta("active", BOOLEAN))
                .is_none()
        );
        assert_eq!(handler.default_options().choices.len(), 2);
    }
}
