use std::sync::Arc;

use bson::Bson;
use tessera_collation::collators_match;
use tessera_query::value::is_collatable;
use tessera_query::{Expression, Hint, KeyKind, KeyPattern, Sort, SortDirection};
use tracing::debug;

use crate::catalog::{CollectionMeta, IndexDescriptor};
use crate::error::DbError;

use super::PlanningContext;
use super::bounds::predicate_bounds;
use super::plan::{OpKind, QueryShape, ScanDirection};

/// Which kind of index access a candidate proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AccessKind {
    IxScan,
    DistinctScan,
    CountScan,
}

/// A conjunct an index field could answer.
#[derive(Debug, Clone)]
pub(crate) struct Assignment {
    pub conjunct: usize,
    pub position: usize,
    /// The predicate compares against strings.
    pub collatable: bool,
}

/// An index access proposed on structure alone; collation is not yet checked.
#[derive(Debug, Clone)]
pub(crate) struct IndexCandidate {
    pub index: Arc<IndexDescriptor>,
    pub kind: AccessKind,
    pub assignments: Vec<Assignment>,
    pub hinted: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct OrBranch {
    pub conjuncts: Vec<Expression>,
    pub candidates: Vec<IndexCandidate>,
}

/// Index merge over the branches of a top-level `$or`.
#[derive(Debug, Clone)]
pub(crate) struct OrCandidate {
    pub conjunct: usize,
    pub branches: Vec<OrBranch>,
}

#[derive(Debug, Clone)]
pub(crate) struct Candidates {
    pub conjuncts: Vec<Expression>,
    pub collscan: Option<ScanDirection>,
    pub fast_path: Option<(Arc<IndexDescriptor>, Bson)>,
    pub fast_count: bool,
    pub indexed: Vec<IndexCandidate>,
    pub or: Option<OrCandidate>,
}

/// The target of a `hint`.
#[derive(Debug, Clone)]
pub(crate) enum HintTarget {
    None,
    Natural(ScanDirection),
    Index(Arc<IndexDescriptor>),
}

/// Resolve a hint against the catalog. A missing index, or a key pattern
/// shared by several indexes, is an error.
pub(crate) fn resolve_hint(meta: &CollectionMeta, hint: Option<&Hint>) -> Result<HintTarget, DbError> {
    let index = match hint {
        None => return Ok(HintTarget::None),
        Some(Hint::Natural(forward)) => {
            let direction = if *forward {
                ScanDirection::Forward
            } else {
                ScanDirection::Backward
            };
            return Ok(HintTarget::Natural(direction));
        }
        Some(Hint::Name(name)) => meta.index(name).cloned().ok_or_else(|| {
            DbError::BadValue(format!(
                "error processing query: planner returned error :: caused by :: hint provided does not correspond to an existing index: {name}"
            ))
        })?,
        Some(Hint::KeyPattern(key)) => {
            let pattern = KeyPattern::parse(key)?;
            let matching = meta.indexes_with_key(&pattern);
            match matching.as_slice() {
                [only] => Arc::clone(only),
                [] => {
                    return Err(DbError::BadValue(format!(
                        "error processing query: planner returned error :: caused by :: hint provided does not correspond to an existing index: {key}"
                    )));
                }
                _ => {
                    return Err(DbError::BadValue(format!(
                        "hint {key} matches more than one index; specify the index by name"
                    )));
                }
            }
        }
    };
    if !index.key_pattern.is_btree() {
        return Err(DbError::BadValue(format!(
            "hinted index {} cannot serve this query",
            index.name
        )));
    }
    Ok(HintTarget::Index(index))
}

/// Enumerate structurally usable accesses for `shape`.
pub(crate) fn generate(ctx: &PlanningContext<'_>, shape: &QueryShape) -> Result<Candidates, DbError> {
    let conjuncts: Vec<Expression> = shape.predicate.conjuncts().into_iter().cloned().collect();
    let mut out = Candidates {
        conjuncts,
        collscan: None,
        fast_path: None,
        fast_count: false,
        indexed: Vec::new(),
        or: None,
    };

    match resolve_hint(ctx.meta(), shape.hint.as_ref())? {
        HintTarget::Natural(direction) => {
            out.collscan = Some(direction);
            return Ok(out);
        }
        HintTarget::Index(index) => {
            out.indexed = index_candidates(shape, &out.conjuncts, &index, true);
            return Ok(out);
        }
        HintTarget::None => {}
    }

    out.collscan = Some(ScanDirection::Forward);
    out.fast_path = fast_path(ctx, shape, &out.conjuncts);
    out.fast_count = shape.op == OpKind::Count
        && shape.predicate.is_always()
        && shape.skip.is_none()
        && shape.limit.is_none();
    for index in &ctx.meta().indexes {
        let found = index_candidates(shape, &out.conjuncts, index, false);
        out.indexed.extend(found);
    }
    out.or = or_candidate(ctx, &out.conjuncts);

    debug!(
        collection = %ctx.meta().name,
        indexed = out.indexed.len(),
        fast_path = out.fast_path.is_some(),
        or = out.or.is_some(),
        "candidates generated"
    );
    Ok(out)
}

fn index_candidates(
    shape: &QueryShape,
    conjuncts: &[Expression],
    index: &Arc<IndexDescriptor>,
    hinted: bool,
) -> Vec<IndexCandidate> {
    if !index.key_pattern.is_btree() {
        return Vec::new();
    }
    let assignments = assign(conjuncts, &index.key_pattern);
    let leading = assignments.iter().any(|a| a.position == 0);
    let sorts = sort_direction(&index.key_pattern, &shape.sort).is_some();

    let candidate = |kind| IndexCandidate {
        index: Arc::clone(index),
        kind,
        assignments: assignments.clone(),
        hinted,
    };

    let mut out = Vec::new();
    if leading || sorts || hinted {
        out.push(candidate(AccessKind::IxScan));
    }
    match &shape.op {
        OpKind::Distinct { key } if index.key_pattern.fields()[0].field == *key => {
            out.push(candidate(AccessKind::DistinctScan));
        }
        OpKind::Count if leading || hinted => out.push(candidate(AccessKind::CountScan)),
        _ => {}
    }
    out
}

/// Conjuncts each key field could answer.
pub(crate) fn assign(conjuncts: &[Expression], pattern: &KeyPattern) -> Vec<Assignment> {
    let mut out = Vec::new();
    for (i, conjunct) in conjuncts.iter().enumerate() {
        let Some(field) = conjunct.field() else {
            continue;
        };
        let Some(position) = pattern.field_names().position(|f| f == field) else {
            continue;
        };
        if predicate_bounds(conjunct).is_none() {
            continue;
        }
        out.push(Assignment {
            conjunct: i,
            position,
            collatable: is_collatable_predicate(conjunct),
        });
    }
    out
}

fn is_collatable_predicate(expr: &Expression) -> bool {
    match expr {
        Expression::Eq(_, v)
        | Expression::Gt(_, v)
        | Expression::Gte(_, v)
        | Expression::Lt(_, v)
        | Expression::Lte(_, v) => is_collatable(v),
        Expression::In(_, vs) => vs.iter().any(is_collatable),
        _ => false,
    }
}

/// The direction in which `pattern` yields documents in `sort` order, when
/// the sort is a prefix of the key pattern.
pub(crate) fn sort_direction(pattern: &KeyPattern, sort: &[Sort]) -> Option<ScanDirection> {
    if sort.is_empty() || sort.len() > pattern.len() {
        return None;
    }
    let mut forward = true;
    let mut backward = true;
    for (s, key) in sort.iter().zip(pattern.fields()) {
        if s.field != key.field {
            return None;
        }
        match (s.direction, key.kind) {
            (SortDirection::Asc, KeyKind::Ascending) | (SortDirection::Desc, KeyKind::Descending) => {
                backward = false
            }
            (SortDirection::Asc, KeyKind::Descending) | (SortDirection::Desc, KeyKind::Ascending) => {
                forward = false
            }
            _ => return None,
        }
    }
    if forward {
        Some(ScanDirection::Forward)
    } else if backward {
        Some(ScanDirection::Backward)
    } else {
        None
    }
}

/// Single-document lookup by `_id`, offered only when the `_id` index
/// compares the key the way the operation would.
fn fast_path(
    ctx: &PlanningContext<'_>,
    shape: &QueryShape,
    conjuncts: &[Expression],
) -> Option<(Arc<IndexDescriptor>, Bson)> {
    if !matches!(
        shape.op,
        OpKind::Find | OpKind::Update { .. } | OpKind::Delete { .. }
    ) || shape.skip.is_some()
        || shape.return_key
        || !shape.sort.is_empty()
        || shape.min.is_some()
        || shape.max.is_some()
    {
        return None;
    }
    let [Expression::Eq(field, value)] = conjuncts else {
        return None;
    };
    if field != "_id"
        || matches!(
            value,
            Bson::Null | Bson::Undefined | Bson::Array(_) | Bson::MinKey | Bson::MaxKey
        )
    {
        return None;
    }
    let id = ctx.meta().id_index()?;
    if is_collatable(value) && !collators_match(id.collator.as_ref(), ctx.collator) {
        debug!(collection = %ctx.meta().name, "fast path skipped: _id index collation differs");
        return None;
    }
    Some((Arc::clone(id), value.clone()))
}

fn or_candidate(ctx: &PlanningContext<'_>, conjuncts: &[Expression]) -> Option<OrCandidate> {
    let (conjunct, children) = conjuncts.iter().enumerate().find_map(|(i, c)| match c {
        Expression::Or(children) if !children.is_empty() => Some((i, children)),
        _ => None,
    })?;

    let mut branches = Vec::with_capacity(children.len());
    for child in children {
        let branch_conjuncts: Vec<Expression> = child.conjuncts().into_iter().cloned().collect();
        let candidates: Vec<IndexCandidate> = ctx
            .meta()
            .indexes
            .iter()
            .filter(|index| index.key_pattern.is_btree())
            .filter_map(|index| {
                let assignments = assign(&branch_conjuncts, &index.key_pattern);
                assignments
                    .iter()
                    .any(|a| a.position == 0)
                    .then(|| IndexCandidate {
                        index: Arc::clone(index),
                        kind: AccessKind::IxScan,
                        assignments,
                        hinted: false,
                    })
            })
            .collect();
        if candidates.is_empty() {
            return None;
        }
        branches.push(OrBranch {
            conjuncts: branch_conjuncts,
            candidates,
        });
    }
    Some(OrCandidate { conjunct, branches })
}
