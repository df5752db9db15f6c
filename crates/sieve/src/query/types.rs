//! Declarative query types.
//!
//! [`Query`] is the immutable, builder-style queryable that filters, sort and
//! pagination are folded onto. It only describes the request; executing it
//! (and evaluating its predicates) is the executor's job.

use serde::{Deserialize, Serialize};

use super::cursor::Cursor;
use crate::sort::{SortDirection, SortKey, SortSpec};

/// Who is asking. Part of the query so executors can authorize and scope
/// by tenant; a change of actor invalidates the displayed page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActorContext {
    pub actor: Option<String>,
    pub tenant: Option<String>,
}

impl ActorContext {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: Some(actor.into()),
            tenant: None,
        }
    }

    #[must_use]
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }
}

/// Comparison operators for predicates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Exact match.
    Equals,
    /// Not equal.
    NotEquals,
    /// Case-insensitive substring match.
    Contains,
    /// Prefix match.
    StartsWith,
    /// Suffix match.
    EndsWith,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    /// Value in list.
    In,
    /// Value not in list.
    NotIn,
    /// Inclusive range; either bound may be open.
    Between,
    IsNull,
    IsNotNull,
    /// Operator understood only by a specific executor.
    Custom(String),
}

/// Right-hand side of a predicate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    None,
    Text(String),
    Bool(bool),
    List(Vec<String>),
    Range {
        lower: Option<String>,
        upper: Option<String>,
    },
}

/// One constraint attached to a query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Predicate {
    pub field: String,
    pub operator: FilterOperator,
    pub operand: Operand,
}

impl Predicate {
    pub fn new(field: impl Into<String>, operator: FilterOperator, operand: Operand) -> Self {
        Self {
            field: field.into(),
            operator,
            operand,
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::Equals, Operand::Text(value.into()))
    }

    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::Contains, Operand::Text(value.into()))
    }

    pub fn is(field: impl Into<String>, value: bool) -> Self {
        Self::new(field, FilterOperator::Equals, Operand::Bool(value))
    }

    pub fn is_in(field: impl Into<String>, values: Vec<String>) -> Self {
        Self::new(field, FilterOperator::In, Operand::List(values))
    }

    pub fn between(
        field: impl Into<String>,
        lower: Option<String>,
        upper: Option<String>,
    ) -> Self {
        Self::new(field, FilterOperator::Between, Operand::Range { lower, upper })
    }
}

/// What an ordering sorts by.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderExpr {
    /// Plain field on the base resource.
    Field(String),
    /// Field reached through relationships, e.g. `["author", "name"]`.
    Path(Vec<String>),
    /// Executor-specific expression supplied by a custom sort function.
    Custom(String),
}

impl OrderExpr {
    /// Translate a field reference; a `.` separates relationship hops.
    pub fn for_field(field: &str) -> Self {
        if field.contains('.') {
            OrderExpr::Path(field.split('.').map(str::to_string).collect())
        } else {
            OrderExpr::Field(field.to_string())
        }
    }

    /// Field name in URL form, if this ordering refers to a field at all.
    pub fn field_name(&self) -> Option<String> {
        match self {
            OrderExpr::Field(f) => Some(f.clone()),
            OrderExpr::Path(parts) => Some(parts.join(".")),
            OrderExpr::Custom(_) => None,
        }
    }
}

/// One ORDER BY entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ordering {
    pub expr: OrderExpr,
    pub direction: SortDirection,
}

impl Ordering {
    pub fn field(field: &str, direction: SortDirection) -> Self {
        Self {
            expr: OrderExpr::for_field(field),
            direction,
        }
    }
}

/// Pagination attached to a query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum PageRequest {
    Offset {
        offset: u64,
        limit: u32,
        /// Whether the executor should also report the total row count.
        count: bool,
    },
    Keyset {
        after: Option<Cursor>,
        before: Option<Cursor>,
        limit: u32,
    },
}

impl PageRequest {
    pub fn limit(&self) -> u32 {
        match self {
            PageRequest::Offset { limit, .. } | PageRequest::Keyset { limit, .. } => *limit,
        }
    }
}

/// Immutable request for data.
///
/// Every builder method consumes the query and returns a new one, so a base
/// query can be cloned and specialised without affecting the original.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Query {
    resource: String,
    action: Option<String>,
    #[serde(default)]
    actor: ActorContext,
    #[serde(default)]
    predicates: Vec<Predicate>,
    search: Option<String>,
    #[serde(default)]
    ordering: Vec<Ordering>,
    page: Option<PageRequest>,
}

impl Query {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: None,
            actor: ActorContext::default(),
            predicates: Vec::new(),
            search: None,
            ordering: Vec::new(),
            page: None,
        }
    }

    /// Scope the query to a named read action.
    #[must_use]
    pub fn for_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    #[must_use]
    pub fn for_actor(mut self, actor: ActorContext) -> Self {
        self.actor = actor;
        self
    }

    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    #[must_use]
    pub fn search(mut self, term: impl Into<String>) -> Self {
        let term = term.into();
        self.search = if term.trim().is_empty() {
            None
        } else {
            Some(term)
        };
        self
    }

    #[must_use]
    pub fn order_by(mut self, ordering: Ordering) -> Self {
        self.ordering.push(ordering);
        self
    }

    #[must_use]
    pub fn order_by_field(self, field: &str, direction: SortDirection) -> Self {
        self.order_by(Ordering::field(field, direction))
    }

    /// Drop any ordering attached so far, including a built-in default.
    #[must_use]
    pub fn clear_ordering(mut self) -> Self {
        self.ordering.clear();
        self
    }

    #[must_use]
    pub fn paginate(mut self, page: PageRequest) -> Self {
        self.page = Some(page);
        self
    }

    #[must_use]
    pub fn unpaginated(mut self) -> Self {
        self.page = None;
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn actor(&self) -> &ActorContext {
        &self.actor
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn ordering(&self) -> &[Ordering] {
        &self.ordering
    }

    pub fn page(&self) -> Option<&PageRequest> {
        self.page.as_ref()
    }

    /// The query's own ordering expressed as a sort spec. Custom expressions
    /// have no field name and are left out.
    pub fn default_sort(&self) -> SortSpec {
        self.ordering
            .iter()
            .filter_map(|o| {
                o.expr
                    .field_name()
                    .map(|field| SortKey::new(field, o.direction))
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn builder_does_not_mutate_original() {
        let base = Query::new("people").order_by_field("created", SortDirection::Desc);
        let filtered = base.clone().filter(Predicate::contains("name", "ann"));

        assert!(base.predicates().is_empty());
        assert_eq!(filtered.predicates().len(), 1);
        assert_eq!(filtered.ordering(), base.ordering());
    }

    #[test]
    fn relationship_fields_become_paths() {
        assert_eq!(
            OrderExpr::for_field("author.name"),
            OrderExpr::Path(vec!["author".to_string(), "name".to_string()])
        );
        assert_eq!(
            OrderExpr::for_field("title"),
            OrderExpr::Field("title".to_string())
        );
    }

    #[test]
    fn default_sort_reflects_ordering() {
        let query = Query::new("posts")
            .order_by_field("author.name", SortDirection::Asc)
            .order_by(Ordering {
                expr: OrderExpr::Custom("random()".to_string()),
                direction: SortDirection::Asc,
            })
            .order_by_field("created", SortDirection::Desc);

        assert_eq!(query.default_sort().encode(), "author.name,-created");
    }

    #[test]
    fn blank_search_is_dropped() {
        assert_eq!(Query::new("p").search("   ").search_term(), None);
        assert_eq!(Query::new("p").search("rust").search_term(), Some("rust"));
    }

    #[test]
    fn operator_serialization() {
        let json = serde_json::to_string(&FilterOperator::GreaterOrEqual).unwrap();
        assert_eq!(json, "\"greater_or_equal\"");

        let json = serde_json::to_string(&FilterOperator::Custom("near".to_string())).unwrap();
        assert_eq!(json, r#"{"custom":"near"}"#);
    }

    #[test]
    fn page_request_serialization_is_tagged() {
        let page = PageRequest::Offset {
            offset: 20,
            limit: 10,
            count: true,
        };
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["mode"], "offset");
        assert_eq!(page.limit(), 10);
    }
}
