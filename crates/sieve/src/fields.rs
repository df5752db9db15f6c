//! Field declarations.
//!
//! A collection declares its fields once: whether each is sortable or
//! filterable, which filter type it uses, and optional escape hatches for
//! bespoke predicate or sort logic. Filter types not given explicitly can be
//! supplied by a [`TypeInference`] collaborator; explicit configuration always
//! wins over inferred values.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::filter::FilterValue;
use crate::query::Query;
use crate::sort::{SortCycle, SortDirection};

/// Filter type used for fields that declare none and have nothing inferred.
pub const DEFAULT_FILTER_TYPE: &str = "text";

/// URL keys owned by pagination, sort and search. Fields may not use them.
pub const RESERVED_KEYS: &[&str] = &["page", "sort", "page_size", "search", "after", "before"];

/// One selectable choice of a select or multi-select filter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectOption {
    pub value: String,
    #[serde(default)]
    pub label: Option<String>,
}

impl SelectOption {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: None,
        }
    }
}

/// Type-specific filter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    /// Label for the "no choice" entry of a select.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<SelectOption>,
}

impl FilterOptions {
    pub fn with_choices<I, S>(choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            choices: choices.into_iter().map(SelectOption::new).collect(),
            ..Self::default()
        }
    }

    /// Values a select accepts. Empty means unrestricted.
    pub fn allowed_values(&self) -> Vec<String> {
        self.choices.iter().map(|c| c.value.clone()).collect()
    }

    /// Fill unset entries from `defaults`.
    #[must_use]
    pub fn or_defaults(self, defaults: FilterOptions) -> Self {
        Self {
            placeholder: self.placeholder.or(defaults.placeholder),
            prompt: self.prompt.or(defaults.prompt),
            choices: if self.choices.is_empty() {
                defaults.choices
            } else {
                self.choices
            },
        }
    }
}

type PredicateFn = dyn Fn(Query, &str, &FilterValue) -> Query + Send + Sync;
type SortFn = dyn Fn(Query, &str, SortDirection) -> Query + Send + Sync;

/// Per-field replacement for the registry's predicate builder.
#[derive(Clone)]
pub struct CustomPredicate(Arc<PredicateFn>);

impl CustomPredicate {
    pub fn new(f: impl Fn(Query, &str, &FilterValue) -> Query + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn apply(&self, query: Query, field: &str, value: &FilterValue) -> Query {
        (self.0)(query, field, value)
    }
}

impl fmt::Debug for CustomPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomPredicate(..)")
    }
}

/// Per-field replacement for the default ordering expression.
#[derive(Clone)]
pub struct CustomSort(Arc<SortFn>);

impl CustomSort {
    pub fn new(f: impl Fn(Query, &str, SortDirection) -> Query + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn apply(&self, query: Query, field: &str, direction: SortDirection) -> Query {
        (self.0)(query, field, direction)
    }
}

impl fmt::Debug for CustomSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomSort(..)")
    }
}

fn default_true() -> bool {
    true
}

/// Declaration of one field of a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Field identifier; `.` separates relationship hops.
    pub field: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_true")]
    pub sortable: bool,
    #[serde(default)]
    pub filterable: bool,
    /// Filter type tag, e.g. `"text"` or `"number_range"`.
    #[serde(default)]
    pub filter_type: Option<String>,
    #[serde(default)]
    pub filter_options: Option<FilterOptions>,
    /// Header toggle cycle; the default cycle when absent.
    #[serde(default)]
    pub sort_cycle: Option<SortCycle>,
    #[serde(skip)]
    pub custom_predicate: Option<CustomPredicate>,
    #[serde(skip)]
    pub custom_sort: Option<CustomSort>,
}

impl FieldConfig {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            label: None,
            sortable: true,
            filterable: false,
            filter_type: None,
            filter_options: None,
            sort_cycle: None,
            custom_predicate: None,
            custom_sort: None,
        }
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn sortable(mut self, sortable: bool) -> Self {
        self.sortable = sortable;
        self
    }

    /// Make the field filterable with the given filter type.
    #[must_use]
    pub fn filter(mut self, filter_type: impl Into<String>) -> Self {
        self.filterable = true;
        self.filter_type = Some(filter_type.into());
        self
    }

    #[must_use]
    pub fn filter_options(mut self, options: FilterOptions) -> Self {
        self.filter_options = Some(options);
        self
    }

    #[must_use]
    pub fn sort_cycle(mut self, cycle: SortCycle) -> Self {
        self.sort_cycle = Some(cycle);
        self
    }

    #[must_use]
    pub fn custom_predicate(
        mut self,
        f: impl Fn(Query, &str, &FilterValue) -> Query + Send + Sync + 'static,
    ) -> Self {
        self.custom_predicate = Some(CustomPredicate::new(f));
        self
    }

    #[must_use]
    pub fn custom_sort(
        mut self,
        f: impl Fn(Query, &str, SortDirection) -> Query + Send + Sync + 'static,
    ) -> Self {
        self.custom_sort = Some(CustomSort::new(f));
        self
    }

    pub fn display_label(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => humanize(&self.field),
        }
    }
}

/// `"author.display_name"` → `"Author display name"`.
fn humanize(field: &str) -> String {
    let text = field.replace(['_', '.'], " ");
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// What filter handlers and the URL codec need to know about a filterable
/// field.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldMeta {
    pub field: String,
    pub label: String,
    pub filter_type: String,
    pub options: FilterOptions,
}

impl FieldMeta {
    pub fn new(field: impl Into<String>, filter_type: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            label: humanize(&field),
            field,
            filter_type: filter_type.into(),
            options: FilterOptions::default(),
        }
    }
}

/// Defaults suggested by a schema for one field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferredFilter {
    pub filter_type: String,
    pub filter_options: Option<FilterOptions>,
}

/// Schema-driven defaults for field filter types.
pub trait TypeInference: Send + Sync {
    /// Suggest a filter type for `field`, or `None` if the schema has nothing
    /// to say about it.
    fn infer(&self, field: &str) -> Option<InferredFilter>;
}

/// The validated field declarations of one collection.
#[derive(Debug, Clone, Default)]
pub struct FieldSet {
    fields: Vec<FieldConfig>,
}

impl FieldSet {
    /// Validate declarations: names are unique and non-empty, filterable
    /// fields do not collide with reserved URL keys, sort cycles are non-empty.
    pub fn new(fields: Vec<FieldConfig>) -> Result<Self, ConfigError> {
        for (i, config) in fields.iter().enumerate() {
            if config.field.trim().is_empty() {
                return Err(ConfigError::EmptyFieldName);
            }
            if fields[..i].iter().any(|f| f.field == config.field) {
                return Err(ConfigError::DuplicateField(config.field.clone()));
            }
            if config.filterable && RESERVED_KEYS.contains(&config.field.as_str()) {
                return Err(ConfigError::ReservedField(config.field.clone()));
            }
            if config.sort_cycle.as_ref().is_some_and(SortCycle::is_empty) {
                return Err(ConfigError::EmptySortCycle(config.field.clone()));
            }
        }
        Ok(Self { fields })
    }

    /// Fill filter types and options that were not configured explicitly.
    #[must_use]
    pub fn with_inference(mut self, inference: &dyn TypeInference) -> Self {
        for config in &mut self.fields {
            if config.filter_type.is_some() && config.filter_options.is_some() {
                continue;
            }
            let Some(inferred) = inference.infer(&config.field) else {
                continue;
            };
            if config.filter_type.is_none() {
                tracing::debug!(
                    field = %config.field,
                    filter_type = %inferred.filter_type,
                    "using inferred filter type"
                );
                config.filter_type = Some(inferred.filter_type);
            }
            if config.filter_options.is_none() {
                config.filter_options = inferred.filter_options;
            }
        }
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldConfig> {
        self.fields.iter().find(|f| f.field == field)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldConfig> {
        self.fields.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn filterable(&self) -> impl Iterator<Item = &FieldConfig> {
        self.fields.iter().filter(|f| f.filterable)
    }

    pub fn is_filterable(&self, field: &str) -> bool {
        self.get(field).is_some_and(|f| f.filterable)
    }

    pub fn is_sortable(&self, field: &str) -> bool {
        self.get(field).is_some_and(|f| f.sortable)
    }

    /// The field's toggle cycle, or the default cycle.
    pub fn sort_cycle(&self, field: &str) -> SortCycle {
        self.get(field)
            .and_then(|f| f.sort_cycle.clone())
            .unwrap_or_default()
    }

    /// Filter metadata for a filterable field.
    pub fn meta(&self, field: &str) -> Option<FieldMeta> {
        self.get(field).filter(|f| f.filterable).map(to_meta)
    }

    /// Filter metadata for every filterable field, in declaration order.
    pub fn filter_metas(&self) -> Vec<FieldMeta> {
        self.filterable().map(to_meta).collect()
    }
}

fn to_meta(config: &FieldConfig) -> FieldMeta {
    FieldMeta {
        field: config.field.clone(),
        label: config.display_label(),
        filter_type: config
            .filter_type
            .clone()
            .unwrap_or_else(|| DEFAULT_FILTER_TYPE.to_string()),
        options: config.filter_options.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    struct Schema;

    impl TypeInference for Schema {
        fn infer(&self, field: &str) -> Option<InferredFilter> {
            match field {
                "age" => Some(InferredFilter {
                    filter_type: "number_range".to_string(),
                    filter_options: None,
                }),
                "status" => Some(InferredFilter {
                    filter_type: "select".to_string(),
                    filter_options: Some(FilterOptions::with_choices(["open", "closed"])),
                }),
                _ => None,
            }
        }
    }

    #[test]
    fn duplicate_fields_are_rejected() {
        let err = FieldSet::new(vec![FieldConfig::new("name"), FieldConfig::new("name")])
            .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateField("name".to_string()));
    }

    #[test]
    fn reserved_keys_cannot_be_filterable() {
        let err = FieldSet::new(vec![FieldConfig::new("page").filter("text")]).unwrap_err();
        assert_eq!(err, ConfigError::ReservedField("page".to_string()));

        // Sort-only use of the name is harmless.
        assert!(FieldSet::new(vec![FieldConfig::new("page")]).is_ok());
    }

    #[test]
    fn empty_sort_cycle_is_rejected() {
        let err = FieldSet::new(vec![
            FieldConfig::new("name").sort_cycle(SortCycle::new(vec![])),
        ])
        .unwrap_err();
        assert_eq!(err, ConfigError::EmptySortCycle("name".to_string()));
    }

    #[test]
    fn explicit_configuration_beats_inference() {
        let fields = FieldSet::new(vec![
            FieldConfig::new("age").filter("text"),
            FieldConfig {
                filterable: true,
                ..FieldConfig::new("status")
            },
            FieldConfig {
                filterable: true,
                ..FieldConfig::new("notes")
            },
        ])
        .unwrap()
        .with_inference(&Schema);

        assert_eq!(fields.meta("age").unwrap().filter_type, "text");
        let status = fields.meta("status").unwrap();
        assert_eq!(status.filter_type, "select");
        assert_eq!(status.options.allowed_values(), vec!["open", "closed"]);
        assert_eq!(fields.meta("notes").unwrap().filter_type, DEFAULT_FILTER_TYPE);
    }

    #[test]
    fn meta_only_for_filterable_fields() {
        let fields = FieldSet::new(vec![
            FieldConfig::new("name").filter("text"),
            FieldConfig::new("created_at"),
        ])
        .unwrap();

        assert!(fields.meta("created_at").is_none());
        assert_eq!(fields.filter_metas().len(), 1);
        assert!(fields.is_sortable("created_at"));
        assert!(!fields.is_sortable("missing"));
    }

    #[test]
    fn labels_default_to_humanized_field() {
        assert_eq!(
            FieldConfig::new("author.display_name").display_label(),
            "Author display name"
        );
        assert_eq!(FieldConfig::new("x").label("Ex").display_label(), "Ex");
    }

    #[test]
    fn field_config_from_toml() {
        let config: FieldConfig = toml::from_str(
            r#"
            field = "status"
            filterable = true
            filter_type = "select"
            sort_cycle = ["desc", "asc"]

            [filter_options]
            prompt = "Any status"
            choices = [{ value = "open" }, { value = "closed", label = "Closed" }]
            "#,
        )
        .unwrap();

        assert!(config.sortable);
        assert_eq!(
            config.sort_cycle.unwrap().states(),
            &[Some(SortDirection::Desc), Some(SortDirection::Asc)]
        );
        let options = config.filter_options.unwrap();
        assert_eq!(options.prompt.as_deref(), Some("Any status"));
        assert_eq!(options.choices[1].label.as_deref(), Some("Closed"));
    }

    #[test]
    fn custom_hooks_are_callable() {
        let config = FieldConfig::new("score").custom_sort(|q, _field, dir| {
            q.order_by_field("weighted_score", dir)
        });
        let query = config
            .custom_sort
            .as_ref()
            .unwrap()
            .apply(Query::new("t"), "score", SortDirection::Desc);
        assert_eq!(query.default_sort().encode(), "-weighted_score");
        assert!(format!("{config:?}").contains("CustomSort(..)"));
    }
}
