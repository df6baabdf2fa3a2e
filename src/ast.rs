//! Query specification model.
//!
//! A [`QuerySpec`] is the structured, UI-built description of a query,
//! independent of whether it ends up as SQL text or is executed over
//! local snapshots.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QspecError;
use crate::parser;

/// Default row limit for a new spec.
pub const DEFAULT_LIMIT: usize = 100;

/// Schema used when a relation is named without one.
pub const DEFAULT_SCHEMA: &str = "public";

/// A relation identifier, rendered `schema.table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelationId {
    pub schema: String,
    pub table: String,
}

impl RelationId {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Qualify a column of this relation.
    pub fn column(&self, column: impl Into<String>) -> ColumnId {
        ColumnId::new(self.table.clone(), column)
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

impl FromStr for RelationId {
    type Err = QspecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parser::parse_relation_id(s)
    }
}

impl From<&str> for RelationId {
    fn from(s: &str) -> Self {
        match s.split_once('.') {
            Some((schema, table)) => RelationId::new(schema, table),
            None => RelationId::new(DEFAULT_SCHEMA, s),
        }
    }
}

impl TryFrom<String> for RelationId {
    type Error = QspecError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RelationId> for String {
    fn from(id: RelationId) -> Self {
        id.to_string()
    }
}

/// A column identifier, rendered `table.column`.
///
/// The table part is the bare table name of the owning relation; the
/// schema is implied by the relation it was selected from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ColumnId {
    pub table: String,
    pub column: String,
}

impl ColumnId {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Fully qualified name (`table.column`).
    pub fn qualified(&self) -> String {
        self.to_string()
    }

    /// Bare column name.
    pub fn bare(&self) -> &str {
        &self.column
    }

    pub fn belongs_to(&self, relation: &RelationId) -> bool {
        self.table == relation.table
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

impl FromStr for ColumnId {
    type Err = QspecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parser::parse_column_id(s)
    }
}

impl From<&str> for ColumnId {
    fn from(s: &str) -> Self {
        match s.rsplit_once('.') {
            Some((table, column)) => {
                let table = table.rsplit('.').next().unwrap_or(table);
                ColumnId::new(table, column)
            }
            None => ColumnId::new("", s),
        }
    }
}

impl TryFrom<String> for ColumnId {
    type Error = QspecError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ColumnId> for String {
    fn from(id: ColumnId) -> Self {
        id.to_string()
    }
}

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateFunc {
    #[default]
    None,
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    pub fn is_none(&self) -> bool {
        matches!(self, AggregateFunc::None)
    }

    /// Output alias for an aggregated column: `sum_total`.
    pub fn alias(&self, column: &str) -> String {
        format!("{}_{}", self.to_string().to_lowercase(), column)
    }
}

impl fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFunc::None => write!(f, "NONE"),
            AggregateFunc::Count => write!(f, "COUNT"),
            AggregateFunc::Sum => write!(f, "SUM"),
            AggregateFunc::Avg => write!(f, "AVG"),
            AggregateFunc::Min => write!(f, "MIN"),
            AggregateFunc::Max => write!(f, "MAX"),
        }
    }
}

/// Join kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinKind::Inner => write!(f, "INNER"),
            JoinKind::Left => write!(f, "LEFT"),
            JoinKind::Right => write!(f, "RIGHT"),
            JoinKind::Full => write!(f, "FULL"),
        }
    }
}

/// A join edge drawn explicitly by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplicitJoin {
    pub from: RelationId,
    pub from_column: String,
    pub to: RelationId,
    pub to_column: String,
    #[serde(default)]
    pub kind: JoinKind,
}

impl ExplicitJoin {
    pub fn new(
        from: impl Into<RelationId>,
        from_column: impl Into<String>,
        to: impl Into<RelationId>,
        to_column: impl Into<String>,
        kind: JoinKind,
    ) -> Self {
        Self {
            from: from.into(),
            from_column: from_column.into(),
            to: to.into(),
            to_column: to_column.into(),
            kind,
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// Equal (=)
    #[serde(rename = "=")]
    Eq,
    /// Not equal (!=)
    #[serde(rename = "!=")]
    Ne,
    /// Greater than (>)
    #[serde(rename = ">")]
    Gt,
    /// Less than (<)
    #[serde(rename = "<")]
    Lt,
    /// Greater than or equal (>=)
    #[serde(rename = ">=")]
    Gte,
    /// Less than or equal (<=)
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "ILIKE")]
    ILike,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "IS NULL")]
    IsNull,
    #[serde(rename = "IS NOT NULL")]
    IsNotNull,
}

impl Operator {
    /// Operators that take no right-hand value.
    pub fn is_unary(&self) -> bool {
        matches!(self, Operator::IsNull | Operator::IsNotNull)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
            Operator::Like => "LIKE",
            Operator::ILike => "ILIKE",
            Operator::In => "IN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        };
        f.write_str(s)
    }
}

/// A single filter predicate. All filters of a spec are AND-ed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: ColumnId,
    pub op: Operator,
    /// Raw value as typed by the user; unused for IS [NOT] NULL.
    #[serde(default)]
    pub value: String,
}

/// Sort order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => write!(f, "ASC"),
            SortOrder::Desc => write!(f, "DESC"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: ColumnId,
    #[serde(default)]
    pub direction: SortOrder,
}

/// A free-form projected expression (`expression AS alias`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculatedColumn {
    pub alias: String,
    pub expression: String,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn positive_limit<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match usize::deserialize(deserializer)? {
        0 => Err(serde::de::Error::custom("limit must be a positive integer")),
        n => Ok(n),
    }
}

/// The structured description of a desired query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Selected relations; the first one anchors the join chain.
    pub relations: Vec<RelationId>,
    /// Selected columns
    #[serde(default)]
    pub columns: Vec<ColumnId>,
    /// Requested aggregate per column
    #[serde(default)]
    pub aggregates: BTreeMap<ColumnId, AggregateFunc>,
    /// Joins drawn explicitly by the user
    #[serde(default)]
    pub joins: Vec<ExplicitJoin>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub group_by: Vec<ColumnId>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default = "default_limit", deserialize_with = "positive_limit")]
    pub limit: usize,
    #[serde(default)]
    pub calculated: Vec<CalculatedColumn>,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            relations: vec![],
            columns: vec![],
            aggregates: BTreeMap::new(),
            joins: vec![],
            filters: vec![],
            group_by: vec![],
            order_by: vec![],
            limit: DEFAULT_LIMIT,
            calculated: vec![],
        }
    }
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// The anchor relation, if any relation is selected.
    pub fn anchor(&self) -> Option<&RelationId> {
        self.relations.first()
    }

    /// Add a relation to the selection.
    pub fn relation(mut self, relation: impl Into<RelationId>) -> Self {
        self.relations.push(relation.into());
        self
    }

    /// Add a selected column.
    pub fn select(mut self, column: impl Into<ColumnId>) -> Self {
        self.columns.push(column.into());
        self
    }

    /// Request an aggregate on a column.
    pub fn aggregate(mut self, column: impl Into<ColumnId>, func: AggregateFunc) -> Self {
        self.aggregates.insert(column.into(), func);
        self
    }

    /// Add an explicit join edge.
    pub fn join(mut self, join: ExplicitJoin) -> Self {
        self.joins.push(join);
        self
    }

    /// Add a filter.
    pub fn filter(
        mut self,
        column: impl Into<ColumnId>,
        op: Operator,
        value: impl Into<String>,
    ) -> Self {
        self.filters.push(Filter {
            column: column.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn group_by(mut self, column: impl Into<ColumnId>) -> Self {
        self.group_by.push(column.into());
        self
    }

    pub fn order_by(mut self, column: impl Into<ColumnId>, direction: SortOrder) -> Self {
        self.order_by.push(OrderBy {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = n;
        self
    }

    /// Add a calculated column (compiled to SQL only).
    pub fn calculated(mut self, alias: impl Into<String>, expression: impl Into<String>) -> Self {
        self.calculated.push(CalculatedColumn {
            alias: alias.into(),
            expression: expression.into(),
        });
        self
    }

    /// Requested aggregate for a column; `None` when not aggregated.
    pub fn aggregate_for(&self, column: &ColumnId) -> AggregateFunc {
        self.aggregates.get(column).copied().unwrap_or_default()
    }

    /// Aggregated columns, skipping explicit `NONE` entries.
    pub fn active_aggregates(&self) -> impl Iterator<Item = (&ColumnId, AggregateFunc)> {
        self.aggregates
            .iter()
            .filter(|(_, func)| !func.is_none())
            .map(|(col, func)| (col, *func))
    }

    /// Whether the spec needs bucketing: any aggregate or any group-by.
    pub fn is_aggregating(&self) -> bool {
        !self.group_by.is_empty() || self.active_aggregates().next().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_pattern() {
        let spec = QuerySpec::new()
            .relation("public.customers")
            .relation("public.orders")
            .select("customers.name")
            .aggregate("orders.total", AggregateFunc::Sum)
            .group_by("customers.name")
            .limit(10);

        assert_eq!(spec.anchor(), Some(&RelationId::new("public", "customers")));
        assert_eq!(spec.columns, vec![ColumnId::new("customers", "name")]);
        assert_eq!(
            spec.aggregate_for(&ColumnId::new("orders", "total")),
            AggregateFunc::Sum
        );
        assert_eq!(spec.limit, 10);
        assert!(spec.is_aggregating());
    }

    #[test]
    fn test_none_aggregate_is_inactive() {
        let spec = QuerySpec::new()
            .relation("users")
            .aggregate("users.id", AggregateFunc::None);
        assert!(!spec.is_aggregating());
        assert_eq!(spec.anchor(), Some(&RelationId::new("public", "users")));
    }

    #[test]
    fn test_lenient_ids() {
        assert_eq!(
            ColumnId::from("public.orders.total"),
            ColumnId::new("orders", "total")
        );
        assert_eq!(AggregateFunc::Sum.alias("total"), "sum_total");
    }

    #[test]
    fn test_spec_json_shape() {
        let json = r#"{
            "relations": ["public.customers", "public.orders"],
            "columns": ["customers.name", "orders.total"],
            "aggregates": { "orders.total": "SUM" },
            "joins": [{
                "from": "public.customers", "from_column": "id",
                "to": "public.orders", "to_column": "customer_id", "kind": "LEFT"
            }],
            "filters": [{ "column": "orders.total", "op": ">=", "value": "10" }],
            "order_by": [{ "column": "customers.name", "direction": "DESC" }]
        }"#;
        let spec: QuerySpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.relations.len(), 2);
        assert_eq!(spec.joins[0].kind, JoinKind::Left);
        assert_eq!(spec.filters[0].op, Operator::Gte);
        assert_eq!(spec.order_by[0].direction, SortOrder::Desc);
        assert_eq!(spec.limit, DEFAULT_LIMIT);

        let back = serde_json::to_string(&spec).unwrap();
        assert!(back.contains(r#""orders.total":"SUM""#));
    }

    #[test]
    fn test_zero_limit_rejected() {
        let err = serde_json::from_str::<QuerySpec>(r#"{"relations": ["t"], "limit": 0}"#)
            .unwrap_err();
        assert!(err.to_string().contains("positive"));

        let spec: QuerySpec = serde_json::from_str(r#"{"relations": ["t"], "limit": 7}"#).unwrap();
        assert_eq!(spec.limit, 7);
    }
}
