//! Join resolution.
//!
//! Turns the ordered relation selection into one concrete join per
//! non-anchor relation. Both backends consume the same resolved list, so
//! the SQL text and the local execution always agree on how relations
//! connect.
//!
//! For relation `R` at position `i > 0`, only relations at positions `< i`
//! (the joined set) are candidates. Strategies are tried in order and the
//! first hit wins:
//!
//! 1. an explicit join linking `R` to a joined relation
//! 2. `R` has a foreign key into a joined relation
//! 3. a joined relation has a foreign key into `R`
//! 4. a joined relation has a column named after `R`'s table
//! 5. `R` has a column named after a joined relation's table
//! 6. cartesian fallback (no column pair)
//!
//! Strategies 2-5 walk the joined set in selection order, so reordering the
//! selection can change which edge is found.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::{ExplicitJoin, JoinKind, RelationId};
use crate::schema::{Relation, Schema};

/// How a join was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JoinOrigin {
    Explicit,
    FkForward,
    FkBackward,
    NameForward,
    NameBackward,
    CartesianFallback,
}

impl fmt::Display for JoinOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JoinOrigin::Explicit => "explicit",
            JoinOrigin::FkForward => "fk-forward",
            JoinOrigin::FkBackward => "fk-backward",
            JoinOrigin::NameForward => "name-forward",
            JoinOrigin::NameBackward => "name-backward",
            JoinOrigin::CartesianFallback => "cartesian-fallback",
        };
        f.write_str(s)
    }
}

/// The column pair of a resolved join.
///
/// `source` is always the already-joined relation; the target relation is
/// the one being added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinOn {
    pub source: RelationId,
    pub source_column: String,
    pub target_column: String,
}

/// A concrete join chosen for one non-anchor relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedJoin {
    pub target: RelationId,
    pub kind: JoinKind,
    pub origin: JoinOrigin,
    /// `None` only for cartesian fallback.
    pub on: Option<JoinOn>,
}

impl ResolvedJoin {
    fn paired(
        target: &RelationId,
        source: &RelationId,
        source_column: &str,
        target_column: &str,
        kind: JoinKind,
        origin: JoinOrigin,
    ) -> Self {
        Self {
            target: target.clone(),
            kind,
            origin,
            on: Some(JoinOn {
                source: source.clone(),
                source_column: source_column.to_string(),
                target_column: target_column.to_string(),
            }),
        }
    }

    fn cartesian(target: &RelationId) -> Self {
        Self {
            target: target.clone(),
            kind: JoinKind::Inner,
            origin: JoinOrigin::CartesianFallback,
            on: None,
        }
    }

    pub fn is_cartesian(&self) -> bool {
        self.origin == JoinOrigin::CartesianFallback
    }
}

/// Resolve one join per non-anchor relation, in selection order.
///
/// Never fails: when nothing connects a relation it falls back to a
/// cartesian marker.
pub fn resolve(
    schema: &Schema,
    relations: &[RelationId],
    explicit: &[ExplicitJoin],
) -> Vec<ResolvedJoin> {
    let mut resolved = Vec::with_capacity(relations.len().saturating_sub(1));

    for (i, target) in relations.iter().enumerate().skip(1) {
        let joined = &relations[..i];
        let join = resolve_one(schema, target, joined, explicit)
            .unwrap_or_else(|| ResolvedJoin::cartesian(target));

        if join.is_cartesian() {
            tracing::warn!("No relationship found for {}, using cartesian fallback", target);
        } else {
            tracing::debug!("Resolved {} via {}", target, join.origin);
        }
        resolved.push(join);
    }

    resolved
}

fn resolve_one(
    schema: &Schema,
    target: &RelationId,
    joined: &[RelationId],
    explicit: &[ExplicitJoin],
) -> Option<ResolvedJoin> {
    if let Some(join) = by_explicit(target, joined, explicit) {
        return Some(join);
    }

    let target_rel = schema.relation(target);
    let joined_rels: Vec<(&RelationId, Option<&Relation>)> =
        joined.iter().map(|id| (id, schema.relation(id))).collect();

    by_fk_forward(target, target_rel, &joined_rels)
        .or_else(|| by_fk_backward(target, &joined_rels))
        .or_else(|| by_name_forward(target, target_rel, &joined_rels))
        .or_else(|| by_name_backward(target, target_rel, &joined_rels))
}

fn by_explicit(
    target: &RelationId,
    joined: &[RelationId],
    explicit: &[ExplicitJoin],
) -> Option<ResolvedJoin> {
    explicit.iter().find_map(|j| {
        if &j.to == target && joined.contains(&j.from) {
            Some(ResolvedJoin::paired(
                target,
                &j.from,
                &j.from_column,
                &j.to_column,
                j.kind,
                JoinOrigin::Explicit,
            ))
        } else if &j.from == target && joined.contains(&j.to) {
            Some(ResolvedJoin::paired(
                target,
                &j.to,
                &j.to_column,
                &j.from_column,
                j.kind,
                JoinOrigin::Explicit,
            ))
        } else {
            None
        }
    })
}

/// `R.fk -> J.col`: join `J.col = R.fk`.
fn by_fk_forward(
    target: &RelationId,
    target_rel: Option<&Relation>,
    joined: &[(&RelationId, Option<&Relation>)],
) -> Option<ResolvedJoin> {
    let target_rel = target_rel?;
    joined.iter().find_map(|&(source, _)| {
        target_rel.columns.iter().find_map(|col| {
            let reference = col.references.as_ref()?;
            reference.targets(source).then(|| {
                ResolvedJoin::paired(
                    target,
                    source,
                    &reference.column,
                    &col.name,
                    JoinKind::Left,
                    JoinOrigin::FkForward,
                )
            })
        })
    })
}

/// `J.fk -> R.col`: join `J.fk = R.col`.
fn by_fk_backward(
    target: &RelationId,
    joined: &[(&RelationId, Option<&Relation>)],
) -> Option<ResolvedJoin> {
    joined.iter().find_map(|&(source, source_rel)| {
        source_rel?.columns.iter().find_map(|col| {
            let reference = col.references.as_ref()?;
            reference.targets(target).then(|| {
                ResolvedJoin::paired(
                    target,
                    source,
                    &col.name,
                    &reference.column,
                    JoinKind::Left,
                    JoinOrigin::FkBackward,
                )
            })
        })
    })
}

/// `J.<R's table name> = R.<pk-like>`.
fn by_name_forward(
    target: &RelationId,
    target_rel: Option<&Relation>,
    joined: &[(&RelationId, Option<&Relation>)],
) -> Option<ResolvedJoin> {
    let target_key = target_rel?.pk_like()?;
    joined.iter().find_map(|&(source, source_rel)| {
        let col = source_rel?.find_column(&target.table)?;
        Some(ResolvedJoin::paired(
            target,
            source,
            &col.name,
            &target_key.name,
            JoinKind::Left,
            JoinOrigin::NameForward,
        ))
    })
}

/// `J.<pk-like> = R.<J's table name>`.
fn by_name_backward(
    target: &RelationId,
    target_rel: Option<&Relation>,
    joined: &[(&RelationId, Option<&Relation>)],
) -> Option<ResolvedJoin> {
    let target_rel = target_rel?;
    joined.iter().find_map(|&(source, source_rel)| {
        let col = target_rel.find_column(&source.table)?;
        let source_key = source_rel?.pk_like()?;
        Some(ResolvedJoin::paired(
            target,
            source,
            &source_key.name,
            &col.name,
            JoinKind::Left,
            JoinOrigin::NameBackward,
        ))
    })
}
