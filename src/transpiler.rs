//! SQL compiler for query specs.
//!
//! Renders a [`QuerySpec`] plus its resolved joins as formatted SQL text,
//! one clause per line. Unused clauses are omitted.

use crate::ast::*;
use crate::error::{QspecError, QspecResult};
use crate::resolver::ResolvedJoin;

/// Trait for converting spec nodes to SQL.
pub trait ToSql {
    /// Convert this node to a SQL string.
    fn to_sql(&self) -> String;
}

/// Compile `spec` into SQL using already-resolved joins.
///
/// Pure and deterministic: identical inputs give byte-identical output.
pub fn compile(spec: &QuerySpec, joins: &[ResolvedJoin]) -> QspecResult<String> {
    let anchor = spec.anchor().ok_or(QspecError::EmptyQuerySpec)?;
    let mut lines: Vec<String> = Vec::new();

    // SELECT
    let mut projection: Vec<String> = if spec.columns.is_empty() {
        vec!["*".to_string()]
    } else {
        spec.columns
            .iter()
            .map(|col| match spec.aggregate_for(col) {
                AggregateFunc::None => col.qualified(),
                func => format!("{}({}) AS {}", func, col, func.alias(col.bare())),
            })
            .collect()
    };
    projection.extend(spec.calculated.iter().map(ToSql::to_sql));
    lines.push(format!("SELECT {}", projection.join(",\n  ")));

    // FROM, with cartesian fallbacks as implicit cross joins. A comma binds
    // looser than JOIN, so on PostgreSQL a later ON clause may only reference
    // the last FROM entry; specs that hit this need an explicit join.
    let mut from = vec![anchor.to_string()];
    from.extend(
        joins
            .iter()
            .filter(|j| j.is_cartesian())
            .map(ToSql::to_sql),
    );
    lines.push(format!("FROM {}", from.join(", ")));

    // JOIN
    lines.extend(
        joins
            .iter()
            .filter(|j| !j.is_cartesian())
            .map(ToSql::to_sql),
    );

    // WHERE
    if !spec.filters.is_empty() {
        let conditions: Vec<String> = spec.filters.iter().map(ToSql::to_sql).collect();
        lines.push(format!("WHERE {}", conditions.join("\n  AND ")));
    }

    // GROUP BY
    if !spec.group_by.is_empty() {
        let cols: Vec<String> = spec.group_by.iter().map(ColumnId::qualified).collect();
        lines.push(format!("GROUP BY {}", cols.join(", ")));
    }

    // ORDER BY, every entry
    if !spec.order_by.is_empty() {
        let terms: Vec<String> = spec.order_by.iter().map(ToSql::to_sql).collect();
        lines.push(format!("ORDER BY {}", terms.join(", ")));
    }

    lines.push(format!("LIMIT {}", spec.limit));

    Ok(lines.join("\n"))
}

fn is_numeric(value: &str) -> bool {
    value
        .trim()
        .parse::<f64>()
        .map(f64::is_finite)
        .unwrap_or(false)
}

/// Numbers stay bare; everything else is single-quoted as-is (no escaping).
fn literal(value: &str) -> String {
    if is_numeric(value) {
        value.trim().to_string()
    } else {
        format!("'{}'", value)
    }
}

fn in_list(value: &str) -> String {
    let raw = value.trim();
    let inner = raw
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(raw);
    let items: Vec<String> = inner
        .split(',')
        .map(|item| item.trim().trim_matches('\''))
        .filter(|item| !item.is_empty())
        .map(literal)
        .collect();
    format!("({})", items.join(", "))
}

impl ToSql for Filter {
    fn to_sql(&self) -> String {
        match self.op {
            Operator::IsNull | Operator::IsNotNull => format!("{} {}", self.column, self.op),
            Operator::In => format!("{} IN {}", self.column, in_list(&self.value)),
            op => format!("{} {} {}", self.column, op, literal(&self.value)),
        }
    }
}

impl ToSql for OrderBy {
    fn to_sql(&self) -> String {
        format!("{} {}", self.column, self.direction)
    }
}

impl ToSql for CalculatedColumn {
    fn to_sql(&self) -> String {
        format!("{} AS {}", self.expression, self.alias)
    }
}

/// A paired join renders as a JOIN line; a cartesian fallback renders as
/// its bare FROM entry.
impl ToSql for ResolvedJoin {
    fn to_sql(&self) -> String {
        match &self.on {
            Some(on) => format!(
                "{} JOIN {} ON {}.{} = {}.{}",
                self.kind,
                self.target,
                on.source.table,
                on.source_column,
                self.target.table,
                on.target_column
            ),
            None => self.target.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::resolve;
    use crate::schema::{ColumnRef, Relation, Schema};
    use pretty_assertions::assert_eq;

    fn shop() -> Schema {
        Schema::new()
            .with(
                Relation::new("public", "customers")
                    .pk("id", "int")
                    .column("name", "text"),
            )
            .with(
                Relation::new("public", "orders")
                    .pk("id", "int")
                    .fk("customer_id", "int", ColumnRef::new("public", "customers", "id"))
                    .column("total", "numeric"),
            )
    }

    fn sql(schema: &Schema, spec: &QuerySpec) -> String {
        let joins = resolve(schema, &spec.relations, &spec.joins);
        compile(spec, &joins).unwrap()
    }

    #[test]
    fn test_empty_spec_is_rejected() {
        assert!(matches!(
            compile(&QuerySpec::new(), &[]),
            Err(QspecError::EmptyQuerySpec)
        ));
    }

    #[test]
    fn test_simple_select() {
        let spec = QuerySpec::new().relation("public.customers");
        assert_eq!(sql(&shop(), &spec), "SELECT *\nFROM public.customers\nLIMIT 100");
    }

    #[test]
    fn test_select_columns() {
        let spec = QuerySpec::new()
            .relation("public.customers")
            .select("customers.id")
            .select("customers.name")
            .limit(5);
        assert_eq!(
            sql(&shop(), &spec),
            "SELECT customers.id,\n  customers.name\nFROM public.customers\nLIMIT 5"
        );
    }

    #[test]
    fn test_join_group_and_aggregate() {
        let spec = QuerySpec::new()
            .relation("public.customers")
            .relation("public.orders")
            .select("customers.name")
            .select("orders.total")
            .aggregate("orders.total", AggregateFunc::Sum)
            .group_by("customers.name")
            .limit(10);
        assert_eq!(
            sql(&shop(), &spec),
            "SELECT customers.name,\n  SUM(orders.total) AS sum_total\n\
             FROM public.customers\n\
             LEFT JOIN public.orders ON customers.id = orders.customer_id\n\
             GROUP BY customers.name\n\
             LIMIT 10"
        );
    }

    #[test]
    fn test_where_quoting() {
        let spec = QuerySpec::new()
            .relation("public.customers")
            .filter("customers.id", Operator::Gte, "10")
            .filter("customers.name", Operator::ILike, "%o'b%")
            .filter("customers.name", Operator::IsNotNull, "")
            .filter("customers.id", Operator::In, "(1, 'x', 2.5)")
            .filter("customers.name", Operator::Ne, "inf");
        assert_eq!(
            sql(&shop(), &spec),
            "SELECT *\nFROM public.customers\n\
             WHERE customers.id >= 10\n  \
             AND customers.name ILIKE '%o'b%'\n  \
             AND customers.name IS NOT NULL\n  \
             AND customers.id IN (1, 'x', 2.5)\n  \
             AND customers.name != 'inf'\n\
             LIMIT 100"
        );
    }

    #[test]
    fn test_every_order_by_entry_is_emitted() {
        let spec = QuerySpec::new()
            .relation("public.orders")
            .order_by("orders.total", SortOrder::Desc)
            .order_by("orders.id", SortOrder::Asc);
        assert_eq!(
            sql(&shop(), &spec),
            "SELECT *\nFROM public.orders\nORDER BY orders.total DESC, orders.id ASC\nLIMIT 100"
        );
    }

    #[test]
    fn test_cartesian_fallback_joins_in_from() {
        let schema = shop().with(Relation::new("public", "regions").column("code", "text"));
        let spec = QuerySpec::new()
            .relation("public.customers")
            .relation("public.regions")
            .relation("public.orders");
        assert_eq!(
            sql(&schema, &spec),
            "SELECT *\n\
             FROM public.customers, public.regions\n\
             LEFT JOIN public.orders ON customers.id = orders.customer_id\n\
             LIMIT 100"
        );
    }

    #[test]
    fn test_resolved_join_rendering() {
        let schema = shop().with(Relation::new("public", "regions").column("code", "text"));
        let relations = vec![
            RelationId::new("public", "customers"),
            RelationId::new("public", "regions"),
            RelationId::new("public", "orders"),
        ];
        let joins = resolve(&schema, &relations, &[]);
        assert_eq!(joins[0].to_sql(), "public.regions");
        assert_eq!(
            joins[1].to_sql(),
            "LEFT JOIN public.orders ON customers.id = orders.customer_id"
        );
    }

    #[test]
    fn test_explicit_join_kind() {
        let spec = QuerySpec::new()
            .relation("public.orders")
            .relation("public.customers")
            .join(ExplicitJoin::new(
                "public.orders",
                "customer_id",
                "public.customers",
                "id",
                JoinKind::Full,
            ));
        assert_eq!(
            sql(&shop(), &spec),
            "SELECT *\nFROM public.orders\nFULL JOIN public.customers ON orders.customer_id = customers.id\nLIMIT 100"
        );
    }

    #[test]
    fn test_calculated_columns_inline() {
        let spec = QuerySpec::new()
            .relation("public.orders")
            .select("orders.id")
            .calculated("with_tax", "orders.total * 1.2");
        assert_eq!(
            sql(&shop(), &spec),
            "SELECT orders.id,\n  orders.total * 1.2 AS with_tax\nFROM public.orders\nLIMIT 100"
        );
    }

    #[test]
    fn test_compile_is_deterministic() {
        let spec = QuerySpec::new()
            .relation("public.customers")
            .relation("public.orders")
            .aggregate("orders.total", AggregateFunc::Avg)
            .aggregate("orders.id", AggregateFunc::Count)
            .select("orders.id")
            .select("orders.total");
        assert_eq!(sql(&shop(), &spec), sql(&shop(), &spec));
    }
}
