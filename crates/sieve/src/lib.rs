//! Sieve: stateful filter, sort, pagination and selection for data-backed
//! collection views.
//!
//! A collection is configured once ([`CollectionConfig`] → [`Collection`]) and
//! mounted per view. The mounted [`Controller`] turns user intent into an
//! immutable [`Query`] for a caller-supplied [`Executor`], keeps its state
//! mirrored in URL parameters, and discards results of superseded queries.
//!
//! The `sieve` binary exposes the offline parts (URL decoding, query
//! assembly, SQL rendering) for inspecting a configuration.

pub mod bulk;
pub mod config;
pub mod controller;
pub mod error;
pub mod executor;
pub mod fields;
pub mod filter;
pub mod pagination;
pub mod query;
pub mod sort;
pub mod url;

pub use bulk::{ActionKind, ActionOptions, BulkAction, BulkExecutor, BulkOptions};
pub use config::{CollectionConfig, Settings};
pub use controller::{
    Collection, CollectionHandle, Command, Controller, ControllerSettings, HostEvent, Snapshot,
    Status, ViewState,
};
pub use error::{BulkError, ConfigError, ControllerStopped, ExecuteError, ExecuteResult};
pub use executor::Executor;
pub use fields::{FieldConfig, FieldMeta, FieldSet, FilterOptions, SelectOption, TypeInference};
pub use filter::{FilterHandler, FilterMap, FilterRegistry, FilterValue, FormPayload};
pub use pagination::{Page, PageInfo, PaginationMode, PaginationState, Row};
pub use query::{Cursor, Query, QueryAssembler, SqlRenderer};
pub use sort::{SortCycle, SortDirection, SortKey, SortSpec};
pub use crate::url::{UrlCodec, UrlParams};
