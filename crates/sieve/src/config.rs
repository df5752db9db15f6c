//! Collection configuration and process settings.
//!
//! A [`CollectionConfig`] describes one collection view: its fields, filter
//! types, paging defaults and initial state. It is plain data, loadable from
//! TOML or JSON. [`Settings`] holds the process-level knobs the `sieve`
//! binary reads from the environment.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::fields::FieldConfig;
use crate::filter::FilterTypeDeclaration;
use crate::pagination::PaginationMode;
use crate::query::assembler::DEFAULT_MAX_PAGE_SIZE;

fn default_id_field() -> String {
    "id".to_string()
}

fn default_page_size() -> u32 {
    25
}

fn default_max_page_size() -> u32 {
    DEFAULT_MAX_PAGE_SIZE
}

fn default_page_size_options() -> Vec<u32> {
    vec![10, 25, 50, 100]
}

/// Declarative description of one collection view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Resource the base query reads from.
    pub resource: String,

    /// Field that uniquely identifies a row (default: `id`).
    #[serde(default = "default_id_field")]
    pub id_field: String,

    #[serde(default)]
    pub pagination: PaginationMode,

    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    /// Larger page sizes are capped to this (default: 500).
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,

    #[serde(default = "default_page_size_options")]
    pub page_size_options: Vec<u32>,

    /// Initial filters as URL text, keyed by field.
    #[serde(default)]
    pub default_filters: BTreeMap<String, String>,

    /// Initial sort in URL form, e.g. `-created,name`. Empty uses the base
    /// query's ordering.
    #[serde(default)]
    pub default_sort: String,

    #[serde(default)]
    pub fields: Vec<FieldConfig>,

    /// Custom filter types backed by registered handlers.
    #[serde(default)]
    pub filter_types: Vec<FilterTypeDeclaration>,
}

impl CollectionConfig {
    /// Minimal configuration for `resource` with default paging.
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            id_field: default_id_field(),
            pagination: PaginationMode::default(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            page_size_options: default_page_size_options(),
            default_filters: BTreeMap::new(),
            default_sort: String::new(),
            fields: Vec::new(),
            filter_types: Vec::new(),
        }
    }

    #[must_use]
    pub fn field(mut self, field: FieldConfig) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn pagination(mut self, mode: PaginationMode) -> Self {
        self.pagination = mode;
        self
    }

    #[must_use]
    pub fn page_size(mut self, default: u32, max: u32) -> Self {
        self.default_page_size = default;
        self.max_page_size = max;
        self
    }

    #[must_use]
    pub fn default_filter(mut self, field: impl Into<String>, text: impl Into<String>) -> Self {
        self.default_filters.insert(field.into(), text.into());
        self
    }

    #[must_use]
    pub fn default_sort(mut self, sort: impl Into<String>) -> Self {
        self.default_sort = sort.into();
        self
    }

    #[must_use]
    pub fn filter_type(mut self, declaration: FilterTypeDeclaration) -> Self {
        self.filter_types.push(declaration);
        self
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid collection config (TOML)")
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid collection config (JSON)")
    }

    /// Load from a `.json` or `.toml` file, chosen by extension.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_toml_str(&text),
        };
        config.with_context(|| format!("failed to load {}", path.display()))
    }

    /// Check the paging and identity settings. Field declarations are
    /// checked by [`FieldSet::new`](crate::fields::FieldSet::new).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id_field.trim().is_empty() {
            return Err(ConfigError::EmptyIdField);
        }
        if self.default_page_size == 0 || self.max_page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        if self.default_page_size > self.max_page_size {
            return Err(ConfigError::PageSizeAboveMax {
                default: self.default_page_size,
                max: self.max_page_size,
            });
        }
        if self.page_size_options.contains(&0) {
            return Err(ConfigError::ZeroPageSize);
        }
        Ok(())
    }
}

/// Process settings for the `sieve` binary.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Collection config file (`SIEVE_CONFIG`), if not given on the command line.
    pub config_path: Option<PathBuf>,

    /// Primary key column used for keyset tiebreaks (default: id).
    pub id_column: String,

    /// Column holding the tenant, when queries are tenant-scoped.
    pub tenant_column: Option<String>,

    /// Tracing filter used when `RUST_LOG` is unset (default: sieve=info).
    pub log_filter: String,
}

impl Settings {
    /// Load settings from `SIEVE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let config_path = env::var("SIEVE_CONFIG").ok().map(PathBuf::from);

        let id_column = env::var("SIEVE_ID_COLUMN").unwrap_or_else(|_| "id".to_string());
        if id_column.trim().is_empty() {
            anyhow::bail!("SIEVE_ID_COLUMN must not be empty");
        }

        let tenant_column = env::var("SIEVE_TENANT_COLUMN")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let log_filter = env::var("SIEVE_LOG").unwrap_or_else(|_| "sieve=info".to_string());

        Ok(Self {
            config_path,
            id_column,
            tenant_column,
            log_filter,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const PEOPLE: &str = r#"
resource = "people"
pagination = "keyset"
default_page_size = 20
default_sort = "-created"

[default_filters]
status = "active"

[[fields]]
field = "name"
filterable = true
filter_type = "text"

[[fields]]
field = "status"
filterable = true
filter_type = "status_select"

[[fields]]
field = "created"

[[filter_types]]
name = "status_select"
handler = "select"

[filter_types.options]
choices = [
    { value = "active", label = "Active" },
    { value = "archived", label = "Archived" },
]
"#;

    #[test]
    fn toml_config_with_defaults() {
        let config = CollectionConfig::from_toml_str(PEOPLE).unwrap();
        assert_eq!(config.resource, "people");
        assert_eq!(config.id_field, "id");
        assert_eq!(config.pagination, PaginationMode::Keyset);
        assert_eq!(config.default_page_size, 20);
        assert_eq!(config.max_page_size, 500);
        assert_eq!(config.fields.len(), 3);
        assert_eq!(config.filter_types[0].options.choices.len(), 2);
        assert_eq!(config.default_filters.get("status").map(String::as_str), Some("active"));
        config.validate().unwrap();
    }

    #[test]
    fn json_config() {
        let config = CollectionConfig::from_json_str(
            r#"{"resource": "tickets", "fields": [{"field": "title"}]}"#,
        )
        .unwrap();
        assert_eq!(config.pagination, PaginationMode::Offset);
        assert_eq!(config.default_page_size, 25);
        assert!(config.fields[0].sortable);
    }

    #[test]
    fn malformed_config_has_context() {
        let err = CollectionConfig::from_toml_str("resource = ").unwrap_err();
        assert!(err.to_string().contains("invalid collection config"));
    }

    #[test]
    fn paging_validation() {
        let config = CollectionConfig::new("p").page_size(0, 10);
        assert_eq!(config.validate(), Err(ConfigError::ZeroPageSize));

        let config = CollectionConfig::new("p").page_size(50, 10);
        assert_eq!(
            config.validate(),
            Err(ConfigError::PageSizeAboveMax {
                default: 50,
                max: 10
            })
        );

        let mut config = CollectionConfig::new("p");
        config.id_field = " ".to_string();
        assert_eq!(config.validate(), Err(ConfigError::EmptyIdField));
    }
}
