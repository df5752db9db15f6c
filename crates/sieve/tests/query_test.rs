#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Query assembly through a configured collection.

use sieve::controller::Effect;
use sieve::filter::{FilterValue, FormPayload};
use sieve::query::{FilterOperator, Operand, OrderExpr, PageRequest, Predicate};
use sieve::{
    Collection, CollectionConfig, Command, FieldConfig, Query, SortDirection, SqlRenderer,
    UrlParams,
};
use sieve_test_utils::{people_collection, people_config};

fn executed(effects: Vec<Effect>) -> Query {
    effects
        .into_iter()
        .find_map(|e| match e {
            Effect::Execute { query, .. } => Some(query),
            _ => None,
        })
        .expect("no query dispatched")
}

fn toggle(field: &str) -> Command {
    Command::ToggleSort {
        field: field.to_string(),
        additive: false,
    }
}

#[test]
fn test_filters_become_predicates() {
    let collection = people_collection();
    let mut controller = collection.controller(collection.base_query(), UrlParams::new());
    controller.mount();

    let query = executed(controller.handle(Command::FilterChanged(
        FormPayload::new()
            .with("name", "ann")
            .with("age_min", "18")
            .with("age_max", "")
            .with("status", "active"),
    )));

    // Filters fold in field-name order.
    let predicates = query.predicates();
    assert_eq!(predicates.len(), 3);
    assert_eq!(predicates[0].field, "age");
    assert_eq!(predicates[0].operator, FilterOperator::Between);
    assert_eq!(predicates[1], Predicate::contains("name", "ann"));
    assert_eq!(
        predicates[0].operand,
        Operand::Range {
            lower: Some("18".into()),
            upper: None,
        }
    );
    assert_eq!(predicates[2], Predicate::equals("status", "active"));
    assert_eq!(
        query.page(),
        Some(&PageRequest::Offset {
            offset: 0,
            limit: 25,
            count: true,
        })
    );
}

#[test]
fn test_page_offset_follows_current_page() {
    let collection = people_collection();
    let mut controller = collection.controller(collection.base_query(), UrlParams::new());
    controller.mount();
    controller.handle(Command::SetPageSize(10));
    let query = executed(controller.handle(Command::GotoPage(4)));
    assert_eq!(
        query.page(),
        Some(&PageRequest::Offset {
            offset: 30,
            limit: 10,
            count: true,
        })
    );
}

#[test]
fn test_three_toggles_cycle_back_to_unsorted() {
    let collection = people_collection();
    let mut controller = collection.controller(collection.base_query(), UrlParams::new());

    let query = executed(controller.handle(toggle("name")));
    assert_eq!(query.default_sort().encode(), "name");
    let query = executed(controller.handle(toggle("name")));
    assert_eq!(query.default_sort().encode(), "-name");
    let query = executed(controller.handle(toggle("name")));
    assert!(query.ordering().is_empty());
}

#[test]
fn test_default_ordering_is_kept_until_toggled() {
    let collection = people_collection();
    let base = collection
        .base_query()
        .order_by_field("created", SortDirection::Desc);
    let mut controller = collection.controller(base, UrlParams::new());

    let query = executed(controller.mount());
    assert_eq!(query.default_sort().encode(), "-created");
    // The default sort is not written into the URL.
    assert!(!controller.url_params().contains("sort"));

    let query = executed(controller.handle(toggle("created")));
    assert_eq!(query.default_sort().encode(), "created");
    assert_eq!(controller.url_params().get("sort"), Some("created"));
}

#[test]
fn test_custom_predicate_and_sort() {
    let config = CollectionConfig::new("posts")
        .field(
            FieldConfig::new("author")
                .filter("text")
                .custom_predicate(|query, _field, value| match value {
                    FilterValue::Text(name) => query.filter(Predicate::equals("author.name", name.clone())),
                    _ => query,
                })
                .custom_sort(|query, _field, direction| {
                    query.order_by_field("author.name", direction)
                }),
        );
    let collection = Collection::from_config(config).unwrap();
    let mut controller = collection.controller(collection.base_query(), UrlParams::new());

    controller.handle(Command::FilterChanged(FormPayload::new().with("author", "Kim")));
    let query = executed(controller.handle(toggle("author")));

    assert_eq!(query.predicates(), &[Predicate::equals("author.name", "Kim")]);
    assert_eq!(
        query.ordering()[0].expr,
        OrderExpr::for_field("author.name")
    );
}

#[test]
fn test_default_filters_apply_on_mount() {
    let collection =
        Collection::from_config(people_config().default_filter("status", "archived")).unwrap();
    let mut controller = collection.controller(collection.base_query(), UrlParams::new());
    let query = executed(controller.mount());
    assert_eq!(query.predicates(), &[Predicate::equals("status", "archived")]);

    let query = executed(controller.handle(Command::ClearAllFilters));
    assert!(query.predicates().is_empty());
}

#[test]
fn test_assembled_query_renders_to_sql() {
    let collection = people_collection();
    let mut controller = collection.controller(
        collection.base_query(),
        UrlParams::new()
            .with("name", "ann")
            .with("age", "18,")
            .with("sort", "-created"),
    );
    let query = executed(controller.mount());
    let sql = SqlRenderer::default().render(&query);

    assert!(sql.select.contains(r#"FROM "people""#));
    assert!(sql.select.contains("LIKE"));
    assert!(sql.select.contains(r#""people"."age" >= 18"#));
    assert!(sql.select.contains("ORDER BY"));
    assert!(sql.select.contains("LIMIT 25"));
    assert!(sql.count.is_some());
}
