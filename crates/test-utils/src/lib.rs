//! Sieve test utilities.
//!
//! Row and field fixtures plus executors whose behaviour the test controls.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value as JsonValue, json};
use tokio::sync::{Notify, oneshot};

use sieve::bulk::{ActionKind, ActionOptions, BulkExecutor};
use sieve::error::{ExecuteError, ExecuteResult};
use sieve::executor::Executor;
use sieve::fields::{FieldConfig, FilterOptions};
use sieve::pagination::{Page, Row};
use sieve::query::{Cursor, Query};
use sieve::{Collection, CollectionConfig};

/// Create a test row with the given id.
pub fn test_row(id: &str) -> TestRow {
    TestRow {
        data: json!({ "id": id }),
        cursor: None,
    }
}

/// Rows for `ids`, each carrying a cursor `c-<id>`.
pub fn keyset_rows(ids: &[&str]) -> Vec<Row> {
    ids.iter()
        .map(|id| test_row(id).with_cursor(&format!("c-{id}")).build())
        .collect()
}

/// Rows for `ids` without cursors.
pub fn rows(ids: &[&str]) -> Vec<Row> {
    ids.iter().map(|id| test_row(id).build()).collect()
}

/// A row builder for test pages.
#[derive(Debug, Clone)]
pub struct TestRow {
    pub data: JsonValue,
    pub cursor: Option<Cursor>,
}

impl TestRow {
    /// Add a single field.
    pub fn with_field(mut self, name: &str, value: JsonValue) -> Self {
        if let Some(obj) = self.data.as_object_mut() {
            obj.insert(name.to_string(), value);
        }
        self
    }

    pub fn with_cursor(mut self, cursor: &str) -> Self {
        self.cursor = Some(Cursor::new(cursor));
        self
    }

    pub fn build(self) -> Row {
        let row = Row::new(self.data);
        match self.cursor {
            Some(cursor) => row.with_cursor(cursor),
            None => row,
        }
    }
}

/// Field declarations of a small "people" collection.
///
/// `name` (text), `age` (number range), `status` (select over
/// active/archived), `created` (sortable only), `bio` (neither).
pub fn people_fields() -> Vec<FieldConfig> {
    vec![
        FieldConfig::new("id"),
        FieldConfig::new("name").filter("text"),
        FieldConfig::new("age").filter("number_range"),
        FieldConfig::new("status")
            .filter("select")
            .filter_options(FilterOptions::with_choices(["active", "archived"])),
        FieldConfig::new("created"),
        FieldConfig::new("bio").sortable(false),
    ]
}

pub fn people_config() -> CollectionConfig {
    let mut config = CollectionConfig::new("people");
    config.fields = people_fields();
    config
}

/// The "people" collection, offset-paginated.
pub fn people_collection() -> Collection {
    match Collection::from_config(people_config()) {
        Ok(collection) => collection,
        Err(e) => panic!("people fixture is invalid: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Executors
// ---------------------------------------------------------------------------

struct Call {
    query: Query,
    reply: Option<oneshot::Sender<ExecuteResult<Page>>>,
}

/// Executor whose calls stay pending until the test resolves them, in any
/// order.
#[derive(Default)]
pub struct ScriptedExecutor {
    calls: Mutex<Vec<Call>>,
    arrived: Notify,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Every query received, in arrival order.
    pub fn queries(&self) -> Vec<Query> {
        self.calls.lock().iter().map(|c| c.query.clone()).collect()
    }

    pub fn query(&self, index: usize) -> Option<Query> {
        self.calls.lock().get(index).map(|c| c.query.clone())
    }

    /// Wait until at least `n` calls have arrived.
    pub async fn wait_for_calls(&self, n: usize) {
        loop {
            let arrived = self.arrived.notified();
            if self.call_count() >= n {
                return;
            }
            arrived.await;
        }
    }

    /// Complete the `index`-th call. Returns false if it was already resolved
    /// or its caller went away.
    pub fn resolve(&self, index: usize, result: ExecuteResult<Page>) -> bool {
        let reply = self
            .calls
            .lock()
            .get_mut(index)
            .and_then(|c| c.reply.take());
        match reply {
            Some(reply) => reply.send(result).is_ok(),
            None => false,
        }
    }

    pub fn resolve_ok(&self, index: usize, page: Page) -> bool {
        self.resolve(index, Ok(page))
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(&self, query: Query) -> ExecuteResult<Page> {
        let (tx, rx) = oneshot::channel();
        self.calls.lock().push(Call {
            query,
            reply: Some(tx),
        });
        self.arrived.notify_waiters();
        rx.await.unwrap_or(Err(ExecuteError::Aborted))
    }
}

/// Executor serving the same page to every query, or failing every query.
pub struct StaticExecutor {
    result: Result<Page, String>,
    queries: Mutex<Vec<Query>>,
}

impl StaticExecutor {
    pub fn new(page: Page) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(page),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Err(message.to_string()),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn queries(&self) -> Vec<Query> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl Executor for StaticExecutor {
    async fn execute(&self, query: Query) -> ExecuteResult<Page> {
        self.queries.lock().push(query);
        match &self.result {
            Ok(page) => Ok(page.clone()),
            Err(message) => Err(ExecuteError::Query(message.clone())),
        }
    }
}

/// One call made to a [`RecordingBulkExecutor`].
#[derive(Debug, Clone)]
pub struct BulkCall {
    pub kind: ActionKind,
    pub action: String,
    pub query: Query,
    pub options: ActionOptions,
}

/// Bulk executor that records calls and answers from a fixed action table.
#[derive(Default)]
pub struct RecordingBulkExecutor {
    actions: HashMap<String, ActionKind>,
    failure: Option<String>,
    calls: Mutex<Vec<BulkCall>>,
}

impl RecordingBulkExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_action(mut self, name: &str, kind: ActionKind) -> Self {
        self.actions.insert(name.to_string(), kind);
        self
    }

    /// Every call fails with `message`.
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<BulkCall> {
        self.calls.lock().clone()
    }

    fn record(
        &self,
        kind: ActionKind,
        query: Query,
        action: &str,
        options: ActionOptions,
    ) -> Result<JsonValue, String> {
        let count = options.bulk_options.ids.len();
        self.calls.lock().push(BulkCall {
            kind,
            action: action.to_string(),
            query,
            options,
        });
        match &self.failure {
            Some(message) => Err(message.clone()),
            None => Ok(json!({ "count": count })),
        }
    }
}

#[async_trait]
impl BulkExecutor for RecordingBulkExecutor {
    fn action_kind(&self, _resource: &str, action: &str) -> Option<ActionKind> {
        self.actions.get(action).copied()
    }

    async fn bulk_update(
        &self,
        query: Query,
        action: &str,
        options: ActionOptions,
    ) -> Result<JsonValue, String> {
        self.record(ActionKind::Update, query, action, options)
    }

    async fn bulk_destroy(
        &self,
        query: Query,
        action: &str,
        options: ActionOptions,
    ) -> Result<JsonValue, String> {
        self.record(ActionKind::Destroy, query, action, options)
    }
}
