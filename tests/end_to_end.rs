//! Both backends over the same schema and specs.

use pretty_assertions::assert_eq;
use qspec::interpreter::snapshots_from_json;
use qspec::prelude::*;
use serde_json::json;

const SHOP: &str = r#"
    table public.customers (
        id int pk,
        name text
    )
    table public.orders (
        id int pk,
        customer_id int -> public.customers.id,
        total numeric
    )
"#;

fn shop() -> Schema {
    Schema::from_text(SHOP).unwrap()
}

fn revenue_by_customer() -> QuerySpec {
    QuerySpec::new()
        .relation("public.customers")
        .relation("public.orders")
        .select("customers.name")
        .select("orders.total")
        .aggregate("orders.total", AggregateFunc::Sum)
        .group_by("customers.name")
        .limit(10)
}

#[test]
fn test_revenue_compiles() {
    let sql = qspec::compile(&shop(), &revenue_by_customer()).unwrap();
    assert_eq!(
        sql,
        "SELECT customers.name,\n  SUM(orders.total) AS sum_total\n\
         FROM public.customers\n\
         LEFT JOIN public.orders ON customers.id = orders.customer_id\n\
         GROUP BY customers.name\n\
         LIMIT 10"
    );
}

#[test]
fn test_revenue_runs_over_snapshots() {
    let snapshots = snapshots_from_json(
        r#"{
            "customers": [{"id": 1, "name": "A"}],
            "orders": [
                {"id": 1, "customer_id": 1, "total": 10},
                {"id": 2, "customer_id": 1, "total": 20}
            ]
        }"#,
    )
    .unwrap();

    let rows = qspec::run(&shop(), &snapshots, &revenue_by_customer()).unwrap();
    assert_eq!(
        serde_json::Value::Array(rows.into_iter().map(serde_json::Value::Object).collect()),
        json!([{"name": "A", "sum_total": 30}])
    );
}

#[test]
fn test_unrelated_relations_pair_positionally() {
    let schema = Schema::new()
        .with(Relation::new("public", "colors").column("color", "text"))
        .with(Relation::new("public", "sizes").column("size", "text"));
    let snapshots = snapshots_from_json(
        r#"{
            "public.colors": [{"color": "red"}, {"color": "green"}, {"color": "blue"}],
            "public.sizes": [{"size": "S"}, {"size": "M"}]
        }"#,
    )
    .unwrap();
    let spec = QuerySpec::new()
        .relation("public.colors")
        .relation("public.sizes")
        .select("colors.color")
        .select("sizes.size");

    let joins = resolve(&schema, &spec.relations, &spec.joins);
    assert_eq!(joins.len(), 1);
    assert_eq!(joins[0].origin, JoinOrigin::CartesianFallback);

    let rows = qspec::run(&schema, &snapshots, &spec).unwrap();
    let pairs: Vec<(String, String)> = rows
        .iter()
        .map(|r| (r["color"].to_string(), r["size"].to_string()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("\"red\"".to_string(), "\"S\"".to_string()),
            ("\"green\"".to_string(), "\"M\"".to_string()),
            ("\"blue\"".to_string(), "\"S\"".to_string()),
        ]
    );

    let sql = qspec::compile(&schema, &spec).unwrap();
    assert!(sql.contains("FROM public.colors, public.sizes"));
}

#[test]
fn test_explicit_join_outranks_foreign_key() {
    let spec = QuerySpec::new()
        .relation("public.orders")
        .relation("public.customers")
        .join(ExplicitJoin::new(
            "public.customers",
            "name",
            "public.orders",
            "total",
            JoinKind::Inner,
        ));
    let sql = qspec::compile(&shop(), &spec).unwrap();
    assert_eq!(
        sql,
        "SELECT *\nFROM public.orders\nINNER JOIN public.customers ON orders.total = customers.name\nLIMIT 100"
    );
}

#[test]
fn test_compile_is_idempotent() {
    let schema = shop();
    let spec = revenue_by_customer()
        .filter("orders.total", Operator::Gt, "5")
        .order_by("customers.name", SortOrder::Desc);
    assert_eq!(
        qspec::compile(&schema, &spec).unwrap(),
        qspec::compile(&schema, &spec).unwrap()
    );
}

#[test]
fn test_spec_from_json() {
    let spec: QuerySpec = serde_json::from_value(json!({
        "relations": ["public.customers", "public.orders"],
        "columns": ["customers.name"],
        "filters": [{"column": "orders.total", "op": ">=", "value": "15"}],
        "order_by": [{"column": "customers.name", "direction": "DESC"}]
    }))
    .unwrap();
    assert_eq!(spec.limit, 100);

    let snapshots = snapshots_from_json(
        r#"{
            "public.customers": [{"id": 1, "name": "A"}, {"id": 2, "name": "B"}],
            "public.orders": [
                {"id": 1, "customer_id": 1, "total": 10},
                {"id": 2, "customer_id": 2, "total": 20}
            ]
        }"#,
    )
    .unwrap();
    let rows = qspec::run(&shop(), &snapshots, &spec).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], json!("B"));
}

#[test]
fn test_missing_anchor_snapshot_is_empty() {
    let rows = qspec::run(&shop(), &Snapshots::new(), &revenue_by_customer()).unwrap();
    assert!(rows.is_empty());
}

#[test]
fn test_empty_spec_rejected_by_both_backends() {
    let spec = QuerySpec::new();
    assert!(matches!(
        qspec::compile(&shop(), &spec),
        Err(QspecError::EmptyQuerySpec)
    ));
    assert!(matches!(
        qspec::run(&shop(), &Snapshots::new(), &spec),
        Err(QspecError::EmptyQuerySpec)
    ));
}
