//! The queryable and everything that folds state onto it.
//!
//! - [`types`]: the immutable [`Query`] builder and its parts
//! - [`assembler`]: filters + sort + pagination → [`Query`]
//! - [`sql`]: reference PostgreSQL rendering via SeaQuery
//! - [`cursor`]: opaque keyset cursors

pub mod assembler;
pub mod cursor;
pub mod sql;
pub mod types;

pub use assembler::QueryAssembler;
pub use cursor::Cursor;
pub use sql::{RenderedQuery, SqlRenderer};
pub use types::{
    ActorContext, FilterOperator, Operand, OrderExpr, Ordering, PageRequest, Predicate, Query,
};
