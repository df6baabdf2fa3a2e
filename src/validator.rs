//! Advisory checks for query specs.
//!
//! Neither backend validates column references; misuse yields nulls or
//! malformed SQL. This module lets callers surface those problems ahead of
//! time without changing backend behavior.

use std::fmt;

use strsim::levenshtein;

use crate::ast::{ColumnId, QuerySpec};
use crate::resolver::{JoinOrigin, ResolvedJoin};
use crate::schema::Schema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A problem found in a spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub severity: Severity,
    pub message: String,
}

impl Issue {
    fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Warning => write!(f, "warning: {}", self.message),
            Severity::Error => write!(f, "error: {}", self.message),
        }
    }
}

/// Check `spec` against `schema` and its resolved joins.
pub fn check(schema: &Schema, spec: &QuerySpec, joins: &[ResolvedJoin]) -> Vec<Issue> {
    let mut issues = Vec::new();

    if spec.relations.is_empty() {
        issues.push(Issue::error("no relations selected"));
        return issues;
    }

    if spec.limit == 0 {
        issues.push(Issue::error("limit must be a positive integer"));
    }

    for relation in &spec.relations {
        if schema.relation(relation).is_none() {
            issues.push(Issue::warning(format!(
                "relation '{}' is not in the schema",
                relation
            )));
        }
    }

    let referenced = spec
        .columns
        .iter()
        .chain(spec.aggregates.keys())
        .chain(spec.filters.iter().map(|f| &f.column))
        .chain(spec.group_by.iter())
        .chain(spec.order_by.iter().map(|o| &o.column));

    let mut seen: Vec<&ColumnId> = Vec::new();
    for column in referenced {
        if seen.contains(&column) {
            continue;
        }
        seen.push(column);
        if let Some(issue) = check_column(schema, spec, column) {
            issues.push(issue);
        }
    }

    if spec.is_aggregating() {
        for column in &spec.columns {
            if spec.aggregate_for(column).is_none() && !spec.group_by.contains(column) {
                issues.push(Issue::warning(format!(
                    "'{}' is neither grouped nor aggregated; local runs use the first row's value",
                    column
                )));
            }
        }
        for (column, _) in spec.active_aggregates() {
            if !spec.columns.contains(column) {
                issues.push(Issue::warning(format!(
                    "aggregate on unselected column '{}' is omitted from SQL",
                    column
                )));
            }
        }
    }

    if !spec.calculated.is_empty() {
        issues.push(Issue::warning(
            "calculated columns are only rendered into SQL, local runs ignore them",
        ));
    }

    if spec.order_by.len() > 1 {
        issues.push(Issue::warning(
            "local runs sort by the first ORDER BY entry only",
        ));
    }

    for join in joins {
        if join.origin == JoinOrigin::CartesianFallback {
            issues.push(Issue::warning(format!(
                "no relationship found for '{}'; falling back to a cartesian join",
                join.target
            )));
        }
    }

    issues
}

fn check_column(schema: &Schema, spec: &QuerySpec, column: &ColumnId) -> Option<Issue> {
    let Some(relation) = spec.relations.iter().find(|r| column.belongs_to(r)) else {
        return Some(Issue::error(format!(
            "'{}' does not belong to a selected relation",
            column
        )));
    };

    let rel = schema.relation(relation)?;
    if rel.find_column(column.bare()).is_some() {
        return None;
    }

    let names: Vec<&str> = rel.columns.iter().map(|c| c.name.as_str()).collect();
    Some(match did_you_mean(column.bare(), &names) {
        Some(sugg) => Issue::error(format!(
            "column '{}' not found in '{}'. Did you mean '{}'?",
            column.bare(),
            relation,
            sugg
        )),
        None => Issue::error(format!(
            "column '{}' not found in '{}'",
            column.bare(),
            relation
        )),
    })
}

/// Best match with Levenshtein distance <= 3.
fn did_you_mean<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (levenshtein(input, c), *c))
        .filter(|(dist, _)| *dist <= 3)
        .min_by_key(|(dist, _)| *dist)
        .map(|(_, c)| c)
}
