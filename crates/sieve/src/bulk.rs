//! Bulk actions over the selected rows.
//!
//! A bulk action runs against the base query narrowed to exactly the
//! selected ids. Named actions are looked up in the [`BulkExecutor`]'s action
//! metadata and routed to its bulk update or destroy primitive; callback
//! actions receive the scoped query directly.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BulkError;
use crate::query::{ActorContext, Predicate, Query};

/// Class of a named mutation, as declared by the resource.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Update,
    Destroy,
}

/// Options specific to the bulk operation, kept apart from the base options
/// so action functions can tell them apart.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BulkOptions {
    /// Input for update actions.
    #[serde(default)]
    pub input: serde_json::Value,
    /// Ids the query was scoped to.
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default)]
    pub return_records: bool,
}

/// Options handed to a bulk action.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActionOptions {
    pub actor: ActorContext,
    pub bulk_options: BulkOptions,
}

pub type ActionFuture = Pin<Box<dyn Future<Output = Result<serde_json::Value, String>> + Send>>;
type ActionFn = dyn Fn(Query, ActionOptions) -> ActionFuture + Send + Sync;

/// A caller-declared bulk action.
#[derive(Clone)]
pub enum BulkAction {
    /// A mutation declared on the resource.
    Named {
        name: String,
        input: serde_json::Value,
    },
    /// Arbitrary function of the scoped query.
    Callback { name: String, run: Arc<ActionFn> },
}

impl BulkAction {
    pub fn named(name: impl Into<String>) -> Self {
        BulkAction::Named {
            name: name.into(),
            input: serde_json::Value::Null,
        }
    }

    pub fn update(name: impl Into<String>, input: serde_json::Value) -> Self {
        BulkAction::Named {
            name: name.into(),
            input,
        }
    }

    pub fn callback<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Query, ActionOptions) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, String>> + Send + 'static,
    {
        BulkAction::Callback {
            name: name.into(),
            run: Arc::new(move |query, options| Box::pin(f(query, options))),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            BulkAction::Named { name, .. } | BulkAction::Callback { name, .. } => name,
        }
    }

    fn input(&self) -> serde_json::Value {
        match self {
            BulkAction::Named { input, .. } => input.clone(),
            BulkAction::Callback { .. } => serde_json::Value::Null,
        }
    }
}

impl fmt::Debug for BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkAction::Named { name, input } => f
                .debug_struct("Named")
                .field("name", name)
                .field("input", input)
                .finish(),
            BulkAction::Callback { name, .. } => f
                .debug_struct("Callback")
                .field("name", name)
                .finish_non_exhaustive(),
        }
    }
}

/// Performs named bulk mutations.
///
/// Each call must apply at most once; retries are the implementor's concern.
#[async_trait]
pub trait BulkExecutor: Send + Sync {
    /// Whether `action` on `resource` is an update or a destroy, if it exists.
    fn action_kind(&self, resource: &str, action: &str) -> Option<ActionKind>;

    async fn bulk_update(
        &self,
        query: Query,
        action: &str,
        options: ActionOptions,
    ) -> Result<serde_json::Value, String>;

    async fn bulk_destroy(
        &self,
        query: Query,
        action: &str,
        options: ActionOptions,
    ) -> Result<serde_json::Value, String>;
}

/// `base` narrowed to exactly `ids`, without pagination.
pub fn scope_to_ids(base: &Query, id_field: &str, ids: Vec<String>) -> Query {
    base.clone()
        .filter(Predicate::is_in(id_field, ids))
        .unpaginated()
}

/// Run `action` against the selected ids.
pub async fn run(
    action: &BulkAction,
    executor: Option<&dyn BulkExecutor>,
    base: &Query,
    id_field: &str,
    ids: Vec<String>,
) -> Result<serde_json::Value, BulkError> {
    if ids.is_empty() {
        return Err(BulkError::EmptySelection);
    }

    let options = ActionOptions {
        actor: base.actor().clone(),
        bulk_options: BulkOptions {
            input: action.input(),
            ids: ids.clone(),
            return_records: false,
        },
    };
    let scoped = scope_to_ids(base, id_field, ids);

    match action {
        BulkAction::Callback { run, .. } => run(scoped, options).await.map_err(BulkError::Failed),
        BulkAction::Named { name, .. } => {
            let Some(executor) = executor else {
                return Err(BulkError::UnknownAction(name.clone()));
            };
            match executor.action_kind(base.resource(), name) {
                Some(ActionKind::Update) => executor.bulk_update(scoped, name, options).await,
                Some(ActionKind::Destroy) => executor.bulk_destroy(scoped, name, options).await,
                None => return Err(BulkError::UnknownAction(name.clone())),
            }
            .map_err(BulkError::Failed)
        }
    }
}
