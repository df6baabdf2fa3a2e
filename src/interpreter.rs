//! Local execution of a query spec over relation snapshots.
//!
//! Used when no live database is attached. The pipeline is:
//! anchor rows → joins → filters → aggregation or projection → first
//! ORDER BY entry → limit.
//!
//! Snapshots are owned by the caller and never mutated; every run
//! allocates its own rows.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;

use serde_json::{Map, Value};

use crate::ast::{AggregateFunc, ColumnId, Filter, Operator, OrderBy, QuerySpec, RelationId, SortOrder};
use crate::error::{QspecError, QspecResult};
use crate::resolver::ResolvedJoin;
use crate::schema::Schema;

/// One row: column name → value, in column order.
pub type Row = Map<String, Value>;

/// A result row, keyed by output column name.
pub type ResultRow = Row;

/// Relation data keyed by `schema.table` (bare `table` keys are accepted too).
pub type Snapshots = HashMap<String, Vec<Row>>;

/// Parse snapshots from JSON: `{ "schema.table": [ {..}, .. ], .. }`.
pub fn snapshots_from_json(json: &str) -> QspecResult<Snapshots> {
    serde_json::from_str(json).map_err(|e| QspecError::snapshot(e.to_string()))
}

/// Load snapshots from a JSON file.
pub fn load_snapshots(path: &Path) -> QspecResult<Snapshots> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        QspecError::snapshot(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let snapshots = snapshots_from_json(&content)?;
    tracing::info!(
        "Loaded {} relation snapshots from {}",
        snapshots.len(),
        path.display()
    );
    Ok(snapshots)
}

fn snapshot_for<'a>(snapshots: &'a Snapshots, id: &RelationId) -> Option<&'a Vec<Row>> {
    snapshots
        .get(&id.to_string())
        .or_else(|| snapshots.get(&id.table))
}

/// Execute `spec` over `snapshots` using already-resolved joins.
///
/// Returns an empty list when the anchor relation has no snapshot.
pub fn run(
    schema: &Schema,
    snapshots: &Snapshots,
    spec: &QuerySpec,
    joins: &[ResolvedJoin],
) -> QspecResult<Vec<ResultRow>> {
    let anchor = spec.anchor().ok_or(QspecError::EmptyQuerySpec)?;

    let Some(anchor_rows) = snapshot_for(snapshots, anchor) else {
        tracing::warn!("No snapshot for anchor relation {}", anchor);
        return Ok(Vec::new());
    };

    let mut rows: Vec<Row> = anchor_rows
        .iter()
        .map(|row| qualify(&anchor.table, row))
        .collect();

    for join in joins {
        rows = apply_join(schema, snapshots, rows, join);
        tracing::debug!("{} rows after joining {}", rows.len(), join.target);
    }

    rows.retain(|row| spec.filters.iter().all(|f| matches(row, f)));
    tracing::debug!("{} rows after filtering", rows.len());

    let mut out = if spec.is_aggregating() {
        aggregate(&rows, spec)
    } else {
        project(rows, &spec.columns)
    };

    // Only the first ORDER BY entry applies here.
    if let Some(order) = spec.order_by.first() {
        sort_rows(&mut out, order, spec);
    }

    out.truncate(spec.limit);
    Ok(out)
}

/// Re-key every column to `table.column`.
fn qualify(table: &str, row: &Row) -> Row {
    row.iter()
        .map(|(k, v)| (format!("{}.{}", table, k), v.clone()))
        .collect()
}

fn merge(into: &mut Row, table: &str, row: &Row) {
    for (k, v) in row {
        into.insert(format!("{}.{}", table, k), v.clone());
    }
}

fn pad_nulls(into: &mut Row, table: &str, columns: &[String]) {
    for col in columns {
        into.insert(format!("{}.{}", table, col), Value::Null);
    }
}

/// Column names of a join target: from the schema, else from the data.
fn target_columns(schema: &Schema, target: &RelationId, rows: &[Row]) -> Vec<String> {
    if let Some(rel) = schema.relation(target) {
        return rel.columns.iter().map(|c| c.name.clone()).collect();
    }
    let mut names: Vec<String> = Vec::new();
    for row in rows {
        for k in row.keys() {
            if !names.contains(k) {
                names.push(k.clone());
            }
        }
    }
    names
}

fn apply_join(schema: &Schema, snapshots: &Snapshots, rows: Vec<Row>, join: &ResolvedJoin) -> Vec<Row> {
    let targets: &[Row] = snapshot_for(snapshots, &join.target)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    let table = &join.target.table;
    let padding = target_columns(schema, &join.target, targets);

    let Some(on) = &join.on else {
        // Positional pairing, not a true cross product.
        return rows
            .into_iter()
            .enumerate()
            .map(|(k, mut row)| {
                if targets.is_empty() {
                    pad_nulls(&mut row, table, &padding);
                } else {
                    merge(&mut row, table, &targets[k % targets.len()]);
                }
                row
            })
            .collect();
    };

    let source_key = format!("{}.{}", on.source.table, on.source_column);
    let mut out = Vec::with_capacity(rows.len());

    for row in rows {
        let matched: Vec<&Row> = match row.get(&source_key).and_then(text) {
            Some(key) => targets
                .iter()
                .filter(|t| t.get(&on.target_column).and_then(text).as_deref() == Some(key.as_str()))
                .collect(),
            None => Vec::new(),
        };

        if matched.is_empty() {
            let mut row = row;
            pad_nulls(&mut row, table, &padding);
            out.push(row);
        } else {
            for target in matched {
                let mut merged = row.clone();
                merge(&mut merged, table, target);
                out.push(merged);
            }
        }
    }

    out
}

/// String form of a value; `None` for null.
fn text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            (_, _, Some(f)) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                (f as i64).to_string()
            }
            _ => n.to_string(),
        }),
        other => Some(other.to_string()),
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Numeric comparison when both sides are numbers, else lexicographic.
fn compare_text(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

/// Items of an IN list: `(1, 2, 'x')` or `1,2,x`.
fn in_list(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    let inner = raw
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(raw);
    inner
        .split(',')
        .map(|item| item.trim().trim_matches('\'').to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn matches(row: &Row, filter: &Filter) -> bool {
    // Null satisfies only IS NULL.
    let Some(cell) = row.get(&filter.column.qualified()).and_then(text) else {
        return filter.op == Operator::IsNull;
    };
    let value = filter.value.as_str();

    match filter.op {
        Operator::IsNull => false,
        Operator::IsNotNull => true,
        Operator::Eq => cell == value,
        Operator::Ne => cell != value,
        Operator::Gt => compare_text(&cell, value) == Ordering::Greater,
        Operator::Lt => compare_text(&cell, value) == Ordering::Less,
        Operator::Gte => compare_text(&cell, value) != Ordering::Less,
        Operator::Lte => compare_text(&cell, value) != Ordering::Greater,
        // Wildcard position is not honored: plain case-insensitive containment.
        Operator::Like | Operator::ILike => cell
            .to_lowercase()
            .contains(&value.replace('%', "").to_lowercase()),
        Operator::In => in_list(value).iter().any(|item| *item == cell),
    }
}

fn cell(row: &Row, column: &ColumnId) -> Value {
    row.get(&column.qualified()).cloned().unwrap_or(Value::Null)
}

fn project(rows: Vec<Row>, columns: &[ColumnId]) -> Vec<Row> {
    if columns.is_empty() {
        return rows;
    }
    rows.iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| (c.bare().to_string(), cell(row, c)))
                .collect()
        })
        .collect()
}

fn aggregate(rows: &[Row], spec: &QuerySpec) -> Vec<Row> {
    let mut buckets: Vec<Vec<&Row>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let key = if spec.group_by.is_empty() {
            "ALL".to_string()
        } else {
            // Same coercion as join and filter equality; null gets its own key.
            spec.group_by
                .iter()
                .map(|g| text(&cell(row, g)).unwrap_or_else(|| "\u{0}".to_string()))
                .collect::<Vec<_>>()
                .join("\u{1f}")
        };
        let slot = *index.entry(key).or_insert_with(|| {
            buckets.push(Vec::new());
            buckets.len() - 1
        });
        buckets[slot].push(row);
    }
    tracing::debug!("{} buckets from {} rows", buckets.len(), rows.len());

    buckets
        .iter()
        .map(|bucket| {
            // Non-aggregated columns take the first row's value.
            let first = bucket[0];
            let mut out = Row::new();

            for g in &spec.group_by {
                out.insert(g.bare().to_string(), cell(first, g));
            }
            for c in &spec.columns {
                let func = spec.aggregate_for(c);
                if func.is_none() {
                    out.entry(c.bare().to_string())
                        .or_insert_with(|| cell(first, c));
                } else {
                    out.insert(func.alias(c.bare()), compute(func, bucket, c));
                }
            }
            for (c, func) in spec.active_aggregates() {
                if !spec.columns.contains(c) {
                    out.insert(func.alias(c.bare()), compute(func, bucket, c));
                }
            }
            out
        })
        .collect()
}

fn compute(func: AggregateFunc, bucket: &[&Row], column: &ColumnId) -> Value {
    let key = column.qualified();
    let present: Vec<&Value> = bucket
        .iter()
        .filter_map(|row| row.get(&key))
        .filter(|v| !v.is_null())
        .collect();
    let nums: Vec<f64> = present.iter().filter_map(|v| numeric(v)).collect();

    match func {
        AggregateFunc::None => Value::Null,
        AggregateFunc::Count => Value::from(present.len()),
        AggregateFunc::Sum => number(round2(nums.iter().sum())),
        AggregateFunc::Avg => {
            if nums.is_empty() {
                Value::Null
            } else {
                number(round2(nums.iter().sum::<f64>() / nums.len() as f64))
            }
        }
        AggregateFunc::Min => nums
            .iter()
            .copied()
            .reduce(f64::min)
            .map(number)
            .unwrap_or(Value::Null),
        AggregateFunc::Max => nums
            .iter()
            .copied()
            .reduce(f64::max)
            .map(number)
            .unwrap_or(Value::Null),
    }
}

fn round2(x: f64) -> f64 {
    if x.fract() == 0.0 {
        x
    } else {
        (x * 100.0).round() / 100.0
    }
}

/// Integral results become JSON integers.
fn number(x: f64) -> Value {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 9.0e15 {
        Value::from(x as i64)
    } else {
        serde_json::Number::from_f64(x)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Output key for an ORDER BY column: qualified, bare, or aggregate alias.
fn sort_key(rows: &[Row], order: &OrderBy, spec: &QuerySpec) -> Option<String> {
    let column = &order.column;
    let func = spec.aggregate_for(column);
    let mut candidates = vec![column.qualified(), column.bare().to_string()];
    if !func.is_none() {
        candidates.push(func.alias(column.bare()));
    }
    candidates
        .into_iter()
        .find(|key| rows.iter().any(|row| row.contains_key(key)))
}

fn finite(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|x| x.is_finite())
}

/// Total order for sorting: numbers (numerically) before other text
/// (lexicographically).
fn sort_order(a: &str, b: &str) -> Ordering {
    match (finite(a), finite(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn compare_cells(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a.and_then(text), b.and_then(text)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => sort_order(&x, &y),
    }
}

fn sort_rows(rows: &mut [Row], order: &OrderBy, spec: &QuerySpec) {
    let Some(key) = sort_key(rows, order, spec) else {
        return;
    };
    rows.sort_by(|a, b| {
        let ord = compare_cells(a.get(&key), b.get(&key));
        match order.direction {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });
}
