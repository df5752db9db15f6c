//! The executor seam: something that turns a [`Query`] into a [`Page`].

use async_trait::async_trait;

use crate::error::ExecuteResult;
use crate::pagination::Page;
use crate::query::Query;

/// Runs assembled queries.
///
/// Offset queries that ask for a count should report `total_count`; keyset
/// queries should set a cursor on every returned row.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, query: Query) -> ExecuteResult<Page>;
}
