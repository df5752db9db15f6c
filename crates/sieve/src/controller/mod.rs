//! The collection controller.
//!
//! - [`state`]: view state, selection, load status, snapshots
//! - [`command`]: host commands and host events
//! - [`machine`]: the synchronous state machine
//! - [`runtime`]: the tokio task that drives it
//!
//! [`Collection`] bundles the validated pieces built from a
//! [`CollectionConfig`] and mounts controllers over them.

pub mod command;
pub mod machine;
pub mod runtime;
pub mod state;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::bulk::BulkExecutor;
use crate::config::CollectionConfig;
use crate::error::ConfigError;
use crate::executor::Executor;
use crate::fields::{FieldSet, TypeInference};
use crate::filter::{FilterMap, FilterRegistry};
use crate::query::{Query, QueryAssembler};
use crate::sort::SortSpec;
use crate::url::{UrlCodec, UrlParams};

pub use command::{Command, HostEvent, RowMatcher};
pub use machine::{Controller, ControllerSettings, Effect};
pub use runtime::CollectionHandle;
pub use state::{SelectionState, Snapshot, Status, ViewState};

/// A validated collection definition.
#[derive(Debug, Clone)]
pub struct Collection {
    resource: String,
    registry: Arc<FilterRegistry>,
    fields: Arc<FieldSet>,
    settings: ControllerSettings,
    warnings: Vec<String>,
}

impl Collection {
    /// Build with the built-in filter types only.
    pub fn from_config(config: CollectionConfig) -> Result<Self, ConfigError> {
        Self::build(config, FilterRegistry::new(), None)
    }

    /// Build over a registry that may carry extra handlers, optionally
    /// filling unconfigured filter types from `inference`.
    ///
    /// Unusable declarations and default values are dropped and reported in
    /// [`Collection::warnings`] rather than failing the build.
    pub fn build(
        config: CollectionConfig,
        mut registry: FilterRegistry,
        inference: Option<&dyn TypeInference>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut warnings = registry.apply_declarations(config.filter_types);

        let mut fields = FieldSet::new(config.fields)?;
        if let Some(inference) = inference {
            fields = fields.with_inference(inference);
        }

        for meta in fields.filter_metas() {
            if !registry.is_known(&meta.filter_type) {
                let warning = format!(
                    "field '{}' uses unknown filter type '{}'; its filter will be ignored",
                    meta.field, meta.filter_type
                );
                tracing::warn!(field = %meta.field, filter_type = %meta.filter_type, "unknown filter type");
                warnings.push(warning);
            }
        }

        let mut default_filters = FilterMap::new();
        for (field, text) in &config.default_filters {
            let Some(meta) = fields.meta(field) else {
                tracing::warn!(field = %field, "default filter for undeclared or non-filterable field");
                warnings.push(format!("default filter for '{field}' ignored: not a filterable field"));
                continue;
            };
            match registry.parse_url_value(&meta, text) {
                Some(value) => {
                    registry.insert(&mut default_filters, &meta, value);
                }
                None => {
                    tracing::warn!(field = %field, value = %text, "default filter value is empty or invalid");
                    warnings.push(format!("default filter for '{field}' ignored: empty or invalid"));
                }
            }
        }

        let mut default_sort = SortSpec::parse(&config.default_sort);
        default_sort.retain(|field| {
            let ok = fields.is_sortable(field);
            if !ok {
                tracing::warn!(field, "default sort key references unknown or unsortable field");
                warnings.push(format!("default sort key '{field}' ignored"));
            }
            ok
        });

        let mut page_size_options = config.page_size_options;
        page_size_options.retain(|size| *size <= config.max_page_size);
        page_size_options.sort_unstable();
        page_size_options.dedup();

        Ok(Self {
            resource: config.resource,
            registry: Arc::new(registry),
            fields: Arc::new(fields),
            settings: ControllerSettings {
                mode: config.pagination,
                default_page_size: config.default_page_size,
                max_page_size: config.max_page_size,
                page_size_options,
                id_field: config.id_field,
                default_filters,
                default_sort,
            },
            warnings,
        })
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn registry(&self) -> &Arc<FilterRegistry> {
        &self.registry
    }

    pub fn fields(&self) -> &Arc<FieldSet> {
        &self.fields
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Problems found while building that did not prevent it.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Unfiltered query over the collection's resource.
    pub fn base_query(&self) -> Query {
        Query::new(self.resource.clone())
    }

    pub fn assembler(&self) -> QueryAssembler {
        QueryAssembler::new(Arc::clone(&self.registry), Arc::clone(&self.fields))
            .with_max_page_size(self.settings.max_page_size)
    }

    pub fn url_codec(&self) -> UrlCodec {
        UrlCodec::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.fields),
            self.settings.default_page_size,
        )
    }

    /// A controller over `base`, initialised from defaults and `params`.
    pub fn controller(&self, base: Query, params: UrlParams) -> Controller {
        Controller::new(
            self.settings.clone(),
            self.assembler(),
            self.url_codec(),
            base,
            params,
        )
    }

    /// Mount a controller on a tokio task.
    pub fn mount(
        &self,
        base: Query,
        params: UrlParams,
        executor: Arc<dyn Executor>,
        bulk: Option<Arc<dyn BulkExecutor>>,
    ) -> (CollectionHandle, mpsc::UnboundedReceiver<HostEvent>) {
        runtime::spawn(self.controller(base, params), executor, bulk)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::fields::FieldConfig;
    use crate::filter::{FilterTypeDeclaration, FilterValue};

    fn config() -> CollectionConfig {
        CollectionConfig::new("people")
            .field(FieldConfig::new("name").filter("text"))
            .field(FieldConfig::new("age").filter("number_range"))
            .field(FieldConfig::new("body").sortable(false))
    }

    #[test]
    fn defaults_are_parsed_through_the_registry() {
        let collection = Collection::from_config(
            config()
                .default_filter("age", "18,")
                .default_filter("name", "  ")
                .default_filter("body", "x")
                .default_sort("-age,body,zzz"),
        )
        .unwrap();

        let settings = collection.settings();
        assert_eq!(settings.default_filters.len(), 1);
        assert_eq!(
            settings.default_filters.get("age"),
            Some(&FilterValue::number_range("18", ""))
        );
        assert_eq!(settings.default_sort.encode(), "-age");
        assert_eq!(collection.warnings().len(), 4);
    }

    #[test]
    fn declarations_and_unknown_types_warn() {
        let collection = Collection::from_config(
            config()
                .field(FieldConfig::new("geo").filter("geo_radius"))
                .filter_type(FilterTypeDeclaration {
                    name: "text".to_string(),
                    handler: "select".to_string(),
                    options: Default::default(),
                }),
        )
        .unwrap();
        assert!(collection.warnings().iter().any(|w| w.contains("geo_radius")));
        assert!(collection.warnings().len() >= 2);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = Collection::from_config(
            config().field(FieldConfig::new("page").filter("text")),
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::ReservedField("page".to_string()));

        let err = Collection::from_config(config().page_size(0, 10)).unwrap_err();
        assert_eq!(err, ConfigError::ZeroPageSize);
    }

    #[test]
    fn oversized_options_are_dropped() {
        let mut config = config().page_size(10, 50);
        config.page_size_options = vec![100, 10, 50, 10];
        let collection = Collection::from_config(config).unwrap();
        assert_eq!(collection.settings().page_size_options, vec![10, 50]);
    }
}
