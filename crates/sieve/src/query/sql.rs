//! PostgreSQL rendering of assembled queries using SeaQuery.
//!
//! A reference renderer for executors backed by a SQL table. Supports:
//! - JSONB field extraction for `fields.`-prefixed fields
//! - relationship paths (`author.name`) as columns of a joined alias
//! - full-text search over a `search_vector` column
//! - offset pagination with a companion COUNT query
//! - keyset pagination with a seek condition decoded from the cursor

use sea_query::{
    Alias, Asterisk, Cond, Expr, ExprTrait, Func, NullOrdering, Order, PostgresQueryBuilder,
    Query as SqlQuery, SelectStatement, SimpleExpr,
};
use serde_json::Value as Json;

use super::cursor::Cursor;
use super::types::{FilterOperator, Operand, OrderExpr, Ordering, PageRequest, Predicate, Query};
use crate::sort::{NullsOrder, SortDirection};

/// SQL for one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedQuery {
    pub select: String,
    /// Present when the query asked for a total count.
    pub count: Option<String>,
    /// Keyset "before" pages are fetched in reverse order; the executor must
    /// reverse the returned rows.
    pub reversed: bool,
    /// Keyset pages fetch one row beyond the limit to detect a further page.
    pub fetch_limit: Option<u64>,
}

/// Renders [`Query`] values against one table.
#[derive(Debug, Clone)]
pub struct SqlRenderer {
    id_column: String,
    tenant_column: Option<String>,
}

impl Default for SqlRenderer {
    fn default() -> Self {
        Self::new("id")
    }
}

/// Validate a SQL identifier: `[a-zA-Z_][a-zA-Z0-9_]*`, at most 63 chars.
pub(crate) fn is_safe_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
}

/// Escape SQL LIKE wildcard characters (`%`, `_`, `\`) in a value.
fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Numbers compare as numbers; everything else (dates included) as text.
fn scalar(text: &str) -> sea_query::Value {
    if let Ok(i) = text.parse::<i64>() {
        return i.into();
    }
    match text.parse::<f64>() {
        Ok(f) if f.is_finite() => f.into(),
        _ => text.to_string().into(),
    }
}

fn json_scalar(value: &Json) -> Option<sea_query::Value> {
    match value {
        Json::String(s) => Some(s.clone().into()),
        Json::Bool(b) => Some((*b).into()),
        Json::Number(n) => n
            .as_i64()
            .map(sea_query::Value::from)
            .or_else(|| n.as_f64().map(sea_query::Value::from)),
        Json::Null | Json::Array(_) | Json::Object(_) => None,
    }
}

fn restrict() -> SimpleExpr {
    Expr::cust("FALSE")
}

impl SqlRenderer {
    pub fn new(id_column: impl Into<String>) -> Self {
        Self {
            id_column: id_column.into(),
            tenant_column: None,
        }
    }

    /// Scope every query to the actor's tenant via this column.
    #[must_use]
    pub fn with_tenant_column(mut self, column: impl Into<String>) -> Self {
        self.tenant_column = Some(column.into());
        self
    }

    /// Render the SELECT (and COUNT, if requested).
    pub fn render(&self, query: &Query) -> RenderedQuery {
        let table = query.resource();
        let mut select = SqlQuery::select();
        select.column((Alias::new(table), Asterisk));
        select.from(Alias::new(table));
        self.add_conditions(&mut select, query);

        let mut reversed = false;
        let mut fetch_limit = None;
        match query.page() {
            Some(PageRequest::Offset { offset, limit, .. }) => {
                self.add_ordering(&mut select, table, query.ordering(), false);
                select.limit(u64::from(*limit));
                select.offset(*offset);
            }
            Some(PageRequest::Keyset {
                after,
                before,
                limit,
            }) => {
                let keys = self.keyset_ordering(query);
                reversed = before.is_some() && after.is_none();
                let seek = after.as_ref().or(before.as_ref());
                if let Some(cursor) = seek {
                    select.and_where(self.seek_condition(table, &keys, cursor, reversed));
                }
                self.add_ordering(&mut select, table, &keys, reversed);
                let fetch = u64::from(*limit) + 1;
                select.limit(fetch);
                fetch_limit = Some(fetch);
            }
            None => self.add_ordering(&mut select, table, query.ordering(), false),
        }

        let wants_count = matches!(query.page(), Some(PageRequest::Offset { count: true, .. }));
        let count = wants_count.then(|| {
            let mut count = SqlQuery::select();
            count.expr(Expr::col(Asterisk).count());
            count.from(Alias::new(table));
            self.add_conditions(&mut count, query);
            count.to_string(PostgresQueryBuilder)
        });

        RenderedQuery {
            select: select.to_string(PostgresQueryBuilder),
            count,
            reversed,
            fetch_limit,
        }
    }

    /// Cursor for a returned row under the query's keyset ordering.
    pub fn cursor_for(&self, query: &Query, row: &Json) -> Cursor {
        let values: Vec<Json> = self
            .keyset_ordering(query)
            .iter()
            .map(|o| match &o.expr {
                OrderExpr::Field(f) => lookup(row, f),
                OrderExpr::Path(parts) => lookup(row, &parts.join(".")),
                OrderExpr::Custom(_) => Json::Null,
            })
            .collect();
        Cursor::from_values(&values)
    }

    fn add_conditions(&self, select: &mut SelectStatement, query: &Query) {
        let table = query.resource();
        for predicate in query.predicates() {
            if let Some(condition) = self.predicate_condition(table, predicate) {
                select.and_where(condition);
            }
        }
        if let Some(term) = query.search_term()
            && let Some(condition) = search_condition(table, term)
        {
            select.and_where(condition);
        }
        if let Some(column) = &self.tenant_column {
            match &query.actor().tenant {
                Some(tenant) => {
                    select.and_where(Expr::col((Alias::new(table), Alias::new(column))).eq(tenant));
                }
                None => {
                    tracing::warn!(table, "tenant-scoped table queried without tenant; restricting results");
                    select.and_where(restrict());
                }
            }
        }
    }

    fn predicate_condition(&self, table: &str, predicate: &Predicate) -> Option<SimpleExpr> {
        let Some(field) = field_expr(table, &predicate.field) else {
            tracing::error!(field = %predicate.field, "unsafe field reference; restricting results");
            return Some(restrict());
        };

        match (&predicate.operator, &predicate.operand) {
            (FilterOperator::Equals, Operand::Text(v)) => Some(field.eq(v.as_str())),
            (FilterOperator::Equals, Operand::Bool(b)) => Some(bool_expr(table, &predicate.field, *b)),
            (FilterOperator::NotEquals, Operand::Text(v)) => Some(field.ne(v.as_str())),
            (FilterOperator::NotEquals, Operand::Bool(b)) => {
                Some(bool_expr(table, &predicate.field, !*b))
            }
            (FilterOperator::Contains, Operand::Text(v)) => Some(lower_like(
                field,
                format!("%{}%", escape_like_wildcards(&v.to_lowercase())),
            )),
            (FilterOperator::StartsWith, Operand::Text(v)) => Some(lower_like(
                field,
                format!("{}%", escape_like_wildcards(&v.to_lowercase())),
            )),
            (FilterOperator::EndsWith, Operand::Text(v)) => Some(lower_like(
                field,
                format!("%{}", escape_like_wildcards(&v.to_lowercase())),
            )),
            (FilterOperator::GreaterThan, Operand::Text(v)) => Some(comparable(table, &predicate.field, v).gt(scalar(v))),
            (FilterOperator::LessThan, Operand::Text(v)) => Some(comparable(table, &predicate.field, v).lt(scalar(v))),
            (FilterOperator::GreaterOrEqual, Operand::Text(v)) => {
                Some(comparable(table, &predicate.field, v).gte(scalar(v)))
            }
            (FilterOperator::LessOrEqual, Operand::Text(v)) => {
                Some(comparable(table, &predicate.field, v).lte(scalar(v)))
            }
            (FilterOperator::In, Operand::List(values)) => {
                if values.is_empty() {
                    return None;
                }
                Some(field.is_in(values.clone()))
            }
            (FilterOperator::NotIn, Operand::List(values)) => {
                if values.is_empty() {
                    return None;
                }
                Some(field.is_not_in(values.clone()))
            }
            (FilterOperator::Between, Operand::Range { lower, upper }) => {
                let sample = lower.as_deref().or(upper.as_deref()).unwrap_or_default();
                let mut cond = Cond::all();
                if let Some(lower) = lower {
                    cond = cond.add(comparable(table, &predicate.field, sample).gte(scalar(lower)));
                }
                if let Some(upper) = upper {
                    cond = cond.add(comparable(table, &predicate.field, sample).lte(scalar(upper)));
                }
                if lower.is_none() && upper.is_none() {
                    return None;
                }
                Some(cond.into())
            }
            (FilterOperator::IsNull, _) => Some(field.is_null()),
            (FilterOperator::IsNotNull, _) => Some(field.is_not_null()),
            (FilterOperator::Custom(name), _) => {
                tracing::error!(
                    operator = %name,
                    "custom operator cannot be rendered to SQL; restricting results"
                );
                Some(restrict())
            }
            (operator, operand) => {
                tracing::error!(
                    field = %predicate.field,
                    operator = ?operator,
                    operand = ?operand,
                    "operator/operand mismatch; restricting results"
                );
                Some(restrict())
            }
        }
    }

    /// The query's field orderings plus the id column as a tiebreaker.
    fn keyset_ordering(&self, query: &Query) -> Vec<Ordering> {
        let mut keys: Vec<Ordering> = query
            .ordering()
            .iter()
            .filter(|o| {
                let keep = !matches!(o.expr, OrderExpr::Custom(_));
                if !keep {
                    tracing::warn!("custom ordering cannot seek by cursor; ignoring it");
                }
                keep
            })
            .cloned()
            .collect();
        let has_id = keys
            .iter()
            .any(|o| o.expr.field_name().as_deref() == Some(self.id_column.as_str()));
        if !has_id {
            keys.push(Ordering::field(&self.id_column, SortDirection::Asc));
        }
        keys
    }

    fn add_ordering(
        &self,
        select: &mut SelectStatement,
        table: &str,
        ordering: &[Ordering],
        reversed: bool,
    ) {
        for o in ordering {
            let expr = match &o.expr {
                OrderExpr::Custom(sql) => Expr::cust(sql.as_str()),
                OrderExpr::Field(f) => match field_expr(table, f) {
                    Some(e) => e,
                    None => continue,
                },
                OrderExpr::Path(parts) => match field_expr(table, &parts.join(".")) {
                    Some(e) => e,
                    None => continue,
                },
            };
            let direction = if reversed {
                o.direction.opposite()
            } else {
                o.direction
            };
            let order = if direction.is_descending() {
                Order::Desc
            } else {
                Order::Asc
            };
            let nulls = match direction.nulls() {
                NullsOrder::First => NullOrdering::First,
                NullsOrder::Last => NullOrdering::Last,
            };
            select.order_by_expr_with_nulls(expr, order, nulls);
        }
    }

    /// `(k1 > v1) OR (k1 = v1 AND k2 > v2) OR ...`, with `<` for descending
    /// keys and everything flipped when seeking backwards.
    fn seek_condition(
        &self,
        table: &str,
        keys: &[Ordering],
        cursor: &Cursor,
        backwards: bool,
    ) -> SimpleExpr {
        let Some(values) = cursor.values() else {
            tracing::warn!(cursor = %cursor, "undecodable cursor; restricting results");
            return restrict();
        };
        if values.len() != keys.len() {
            tracing::warn!(
                expected = keys.len(),
                got = values.len(),
                "cursor does not match ordering; restricting results"
            );
            return restrict();
        }

        let mut any = Cond::any();
        for i in 0..keys.len() {
            let mut all = Cond::all();
            for (j, (key, value)) in keys[..=i].iter().zip(&values).enumerate() {
                let (Some(expr), Some(value)) = (order_expr(table, &key.expr), json_scalar(value))
                else {
                    tracing::warn!("cursor holds a NULL or unsupported key value; restricting results");
                    return restrict();
                };
                if j == i {
                    let forward = key.direction.is_descending() == backwards;
                    all = all.add(if forward { expr.gt(value) } else { expr.lt(value) });
                } else {
                    all = all.add(expr.eq(value));
                }
            }
            any = any.add(all);
        }
        any.into()
    }
}

fn order_expr(table: &str, expr: &OrderExpr) -> Option<SimpleExpr> {
    match expr {
        OrderExpr::Field(f) => field_expr(table, f),
        OrderExpr::Path(parts) => field_expr(table, &parts.join(".")),
        OrderExpr::Custom(_) => None,
    }
}

/// Column reference for a field, or `None` if the name is unsafe.
fn field_expr(table: &str, field: &str) -> Option<SimpleExpr> {
    if let Some(path) = field.strip_prefix("fields.") {
        return jsonb_path_sql(table, path).map(Expr::cust);
    }
    match field.split_once('.') {
        Some((relation, column)) if is_safe_identifier(relation) && is_safe_identifier(column) => {
            Some(Expr::col((Alias::new(relation), Alias::new(column))).into())
        }
        Some(_) => None,
        None => Some(Expr::col((Alias::new(table), Alias::new(field))).into()),
    }
}

/// `table.fields->>'a'` or `((table.fields->'a')->>'b')`.
fn jsonb_path_sql(table: &str, path: &str) -> Option<String> {
    if !is_safe_identifier(table) || path.is_empty() || !path.split('.').all(is_safe_identifier) {
        return None;
    }
    let parts: Vec<&str> = path.split('.').collect();
    if parts.len() == 1 {
        return Some(format!("{table}.fields->>'{path}'"));
    }
    let mut expr = format!("{table}.fields");
    for (i, part) in parts.iter().enumerate() {
        if i == parts.len() - 1 {
            expr = format!("({expr}->>'{part}')");
        } else {
            expr = format!("({expr}->'{part}')");
        }
    }
    Some(expr)
}

/// JSONB text needs a cast before comparing with numbers or booleans.
fn comparable(table: &str, field: &str, sample: &str) -> SimpleExpr {
    let cast = match scalar(sample) {
        sea_query::Value::BigInt(_) | sea_query::Value::Double(_) => "numeric",
        _ => "",
    };
    match field.strip_prefix("fields.") {
        Some(path) if !cast.is_empty() => match jsonb_path_sql(table, path) {
            Some(sql) => Expr::cust(format!("({sql})::{cast}")),
            None => restrict(),
        },
        _ => field_expr(table, field).unwrap_or_else(restrict),
    }
}

fn bool_expr(table: &str, field: &str, value: bool) -> SimpleExpr {
    match field.strip_prefix("fields.") {
        Some(path) => match jsonb_path_sql(table, path) {
            Some(sql) => Expr::cust(format!("({sql})::boolean")).eq(value),
            None => restrict(),
        },
        None => field_expr(table, field).map_or_else(restrict, |e| e.eq(value)),
    }
}

fn lower_like(field: SimpleExpr, pattern: String) -> SimpleExpr {
    SimpleExpr::from(Func::lower(field)).like(pattern)
}

/// Full-text search using PostgreSQL tsvector.
fn search_condition(table: &str, term: &str) -> Option<SimpleExpr> {
    let sanitized: String = term
        .chars()
        .map(|c| if c.is_alphanumeric() || c == ' ' { c } else { ' ' })
        .collect();
    let terms: Vec<&str> = sanitized.split_whitespace().collect();
    if terms.is_empty() || !is_safe_identifier(table) {
        return None;
    }
    let tsquery = terms.join(" & ");
    Some(Expr::cust_with_values(
        format!("{table}.search_vector @@ to_tsquery('english', $1)"),
        [tsquery],
    ))
}

/// Flat key first, then nested navigation by `.`.
fn lookup(row: &Json, field: &str) -> Json {
    if let Some(v) = row.get(field) {
        return v.clone();
    }
    field
        .split('.')
        .try_fold(row, |node, part| node.get(part))
        .cloned()
        .unwrap_or(Json::Null)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::query::ActorContext;
    use serde_json::json;

    fn offset(page: u64, limit: u32) -> PageRequest {
        PageRequest::Offset {
            offset: page * u64::from(limit),
            limit,
            count: true,
        }
    }

    #[test]
    fn offset_query_with_count() {
        let query = Query::new("people")
            .filter(Predicate::equals("status", "active"))
            .order_by_field("created", SortDirection::Desc)
            .paginate(offset(2, 10));
        let sql = SqlRenderer::default().render(&query);

        assert!(sql.select.contains(r#"FROM "people""#));
        assert!(sql.select.contains(r#""people"."status" = 'active'"#));
        assert!(sql.select.contains("ORDER BY"));
        assert!(sql.select.contains("DESC NULLS FIRST"));
        assert!(sql.select.contains("LIMIT 10"));
        assert!(sql.select.contains("OFFSET 20"));

        let count = sql.count.unwrap();
        assert!(count.contains("COUNT(*)"));
        assert!(!count.contains("LIMIT"));
        assert!(!sql.reversed);
    }

    #[test]
    fn contains_is_case_insensitive_and_escaped() {
        let query = Query::new("people").filter(Predicate::contains("name", "50%_Ann"));
        let sql = SqlRenderer::default().render(&query).select;
        assert!(sql.contains("LOWER"));
        assert!(sql.contains("LIKE"));
        assert!(sql.contains("ann%"));
        assert!(!sql.contains("Ann"));
    }

    #[test]
    fn between_with_open_bound() {
        let query = Query::new("people").filter(Predicate::between(
            "age",
            Some("18".to_string()),
            None,
        ));
        let sql = SqlRenderer::default().render(&query).select;
        assert!(sql.contains(r#""people"."age" >= 18"#));
        assert!(!sql.contains("<="));
    }

    #[test]
    fn jsonb_fields_and_relationships() {
        let query = Query::new("item")
            .filter(Predicate::between("fields.price", None, Some("10".into())))
            .order_by_field("author.name", SortDirection::Asc);
        let sql = SqlRenderer::default().render(&query).select;
        assert!(sql.contains("(item.fields->>'price')::numeric <= 10"));
        assert!(sql.contains(r#""author"."name" ASC NULLS LAST"#));
    }

    #[test]
    fn unsafe_jsonb_path_restricts() {
        let query = Query::new("item").filter(Predicate::equals("fields.a'b", "x"));
        let sql = SqlRenderer::default().render(&query).select;
        assert!(sql.contains("FALSE"));
    }

    #[test]
    fn search_uses_tsquery() {
        let query = Query::new("item").search("rust & async!");
        let sql = SqlRenderer::default().render(&query).select;
        assert!(sql.contains("search_vector @@ to_tsquery"));
        assert!(sql.contains("rust & async"));
    }

    #[test]
    fn keyset_after_cursor_seeks_forward() {
        let renderer = SqlRenderer::default();
        let base = Query::new("people").order_by_field("name", SortDirection::Asc);
        let cursor = renderer.cursor_for(&base, &json!({"id": 7, "name": "Ann"}));
        assert_eq!(cursor.values().unwrap(), vec![json!("Ann"), json!(7)]);

        let query = base.paginate(PageRequest::Keyset {
            after: Some(cursor),
            before: None,
            limit: 10,
        });
        let sql = renderer.render(&query);
        assert!(sql.select.contains(r#""people"."name" > 'Ann'"#));
        assert!(sql.select.contains(r#""people"."id" > 7"#));
        assert!(sql.select.contains("LIMIT 11"));
        assert_eq!(sql.fetch_limit, Some(11));
        assert!(sql.count.is_none());
    }

    #[test]
    fn keyset_before_cursor_reverses() {
        let renderer = SqlRenderer::default();
        let base = Query::new("people").order_by_field("age", SortDirection::Desc);
        let cursor = renderer.cursor_for(&base, &json!({"id": 3, "age": 40}));
        let query = base.paginate(PageRequest::Keyset {
            after: None,
            before: Some(cursor),
            limit: 5,
        });
        let sql = renderer.render(&query);
        assert!(sql.reversed);
        assert!(sql.select.contains(r#""people"."age" > 40"#));
        assert!(sql.select.contains("ASC NULLS LAST"));
    }

    #[test]
    fn foreign_cursor_restricts() {
        let query = Query::new("people").paginate(PageRequest::Keyset {
            after: Some(Cursor::new("not-ours")),
            before: None,
            limit: 5,
        });
        let sql = SqlRenderer::default().render(&query).select;
        assert!(sql.contains("FALSE"));
    }

    #[test]
    fn tenant_scoping() {
        let renderer = SqlRenderer::default().with_tenant_column("tenant_id");
        let scoped = Query::new("people").for_actor(ActorContext::new("u1").with_tenant("acme"));
        assert!(
            renderer
                .render(&scoped)
                .select
                .contains(r#""people"."tenant_id" = 'acme'"#)
        );
        assert!(renderer.render(&Query::new("people")).select.contains("FALSE"));
    }

    #[test]
    fn escape_like_wildcards_function() {
        assert_eq!(escape_like_wildcards("a%b_c\\"), "a\\%b\\_c\\\\");
    }
}
