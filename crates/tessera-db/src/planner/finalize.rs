//! Turns a ranked access into an executable stage tree.

use bson::doc;
use tessera_query::{Expression, Projection};

use crate::error::DbError;

use super::admissibility::{Access, IndexAccess};
use super::candidates::AccessKind;
use super::plan::{OpKind, PlanNode, QueryShape, ScanBounds, ScanDirection};

/// Whether `access` must read documents to answer `shape`.
///
/// A find is covered when every projected field comes from the key, the
/// bounds answer the whole filter, and the keys hold original values: a
/// non-simple index stores collation keys, and a multikey index stores
/// single array elements.
pub(crate) fn needs_fetch(shape: &QueryShape, access: &IndexAccess) -> bool {
    match &shape.op {
        OpKind::Count => !access.exact(),
        OpKind::Find => {
            let covered = access.exact()
                && !shape.return_key
                && !access.multikey
                && access.index.collator.is_none()
                && (shape.sort.is_empty() || access.sort_direction.is_some())
                && shape
                    .projection
                    .as_ref()
                    .is_some_and(|p| projection_covered(p, access));
            !covered
        }
        OpKind::Distinct { .. } | OpKind::Update { .. } | OpKind::Delete { .. } => true,
    }
}

fn projection_covered(projection: &Projection, access: &IndexAccess) -> bool {
    let Some(fields) = projection.included_fields() else {
        return false;
    };
    let pattern = &access.index.key_pattern;
    let in_key = |field: &str| pattern.field_names().any(|f| f == field);
    fields.iter().all(|f| in_key(f)) && (!projection.includes_id() || in_key("_id"))
}

/// Build the stage tree for a winning (or rejected) access.
pub(crate) fn finalize(shape: &QueryShape, conjuncts: &[Expression], access: &Access) -> Result<PlanNode, DbError> {
    let node = match access {
        Access::FastPath { index, key } => {
            let leaf = PlanNode::IdLookup {
                index: index.clone(),
                key: key.clone(),
            };
            return Ok(wrap_op(shape, finish(shape, leaf, true, false)));
        }
        Access::FastCount => return Ok(PlanNode::RecordStoreFastCount),
        Access::CollScan { direction } => {
            let leaf = PlanNode::CollScan {
                filter: (!shape.predicate.is_always()).then(|| shape.predicate.clone()),
                direction: *direction,
            };
            finish(shape, leaf, false, false)
        }
        Access::Index(access) => match access.kind {
            AccessKind::CountScan => PlanNode::Count {
                skip: shape.skip,
                limit: shape.limit,
                input: Box::new(PlanNode::CountScan {
                    index: access.index.clone(),
                    bounds: access.bounds.clone(),
                }),
            },
            AccessKind::DistinctScan => {
                let OpKind::Distinct { key } = &shape.op else {
                    return Err(DbError::BadValue("distinct scan outside of distinct".into()));
                };
                let projection = if key == "_id" {
                    Projection::parse(&doc! { "_id": 1 })?
                } else {
                    Projection::parse(&doc! { "_id": 0, key.as_str(): 1 })?
                };
                return Ok(PlanNode::Projection {
                    projection,
                    covered: !access.fetching,
                    input: Box::new(PlanNode::DistinctScan {
                        index: access.index.clone(),
                        bounds: access.bounds.clone(),
                        fetching: access.fetching,
                    }),
                });
            }
            AccessKind::IxScan => {
                let fetch = needs_fetch(shape, access);
                let leaf = index_scan(access);
                let node = if fetch {
                    PlanNode::Fetch {
                        filter: residual_filter(&access.residual),
                        input: Box::new(leaf),
                    }
                } else {
                    leaf
                };
                finish(shape, node, access.sort_direction.is_some(), !fetch)
            }
        },
        Access::Or { conjunct, branches } => {
            let inputs = branches.iter().map(index_scan).collect();
            let filter = if branches.iter().all(IndexAccess::exact) {
                let rest: Vec<Expression> = conjuncts
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| i != conjunct)
                    .map(|(_, c)| c.clone())
                    .collect();
                residual_filter(&rest)
            } else {
                Some(shape.predicate.clone())
            };
            let node = PlanNode::Fetch {
                filter,
                input: Box::new(PlanNode::Or { inputs }),
            };
            finish(shape, node, false, false)
        }
    };
    Ok(wrap_op(shape, node))
}

fn index_scan(access: &IndexAccess) -> PlanNode {
    PlanNode::IxScan {
        index: access.index.clone(),
        bounds: ScanBounds::Intervals(access.bounds.clone()),
        direction: access.sort_direction.unwrap_or(ScanDirection::Forward),
        multikey: access.multikey,
    }
}

fn residual_filter(residual: &[Expression]) -> Option<Expression> {
    (!residual.is_empty()).then(|| Expression::and(residual.to_vec()))
}

/// Add the blocking sort, skip and limit, and the find projection.
pub(crate) fn finish(shape: &QueryShape, mut node: PlanNode, sort_provided: bool, covered: bool) -> PlanNode {
    if !shape.sort.is_empty() && !sort_provided {
        let limit = match (&shape.op, shape.limit) {
            (OpKind::Find, Some(limit)) => Some(limit.saturating_add(shape.skip.unwrap_or(0))),
            (OpKind::Update { multi: false } | OpKind::Delete { multi: false }, _) => Some(1),
            _ => None,
        };
        node = PlanNode::Sort {
            sort: shape.sort.clone(),
            limit,
            input: Box::new(node),
        };
    }
    if shape.op != OpKind::Find {
        return node;
    }
    if let Some(n) = shape.skip {
        node = PlanNode::Skip {
            n,
            input: Box::new(node),
        };
    }
    if let Some(n) = shape.limit {
        node = PlanNode::Limit {
            n,
            input: Box::new(node),
        };
    }
    if shape.return_key {
        node = PlanNode::ReturnKey { input: Box::new(node) };
    } else if let Some(projection) = &shape.projection {
        node = PlanNode::Projection {
            projection: projection.clone(),
            covered,
            input: Box::new(node),
        };
    }
    node
}

/// Put the operation's own root on top.
pub(crate) fn wrap_op(shape: &QueryShape, node: PlanNode) -> PlanNode {
    match shape.op {
        OpKind::Find | OpKind::Distinct { .. } => node,
        OpKind::Count => PlanNode::Count {
            skip: shape.skip,
            limit: shape.limit,
            input: Box::new(node),
        },
        OpKind::Update { multi } => PlanNode::Update {
            multi,
            input: Box::new(node),
        },
        OpKind::Delete { multi } => PlanNode::Delete {
            multi,
            input: Box::new(node),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use bson::Bson;
    use tessera_query::{KeyPattern, parse_sort};

    use crate::catalog::IndexDescriptor;
    use crate::planner::bounds::IndexBounds;

    fn access(pattern: bson::Document, residual: Vec<Expression>) -> IndexAccess {
        let key_pattern = KeyPattern::parse(&pattern).unwrap();
        IndexAccess {
            bounds: IndexBounds::full(&key_pattern),
            index: Arc::new(IndexDescriptor {
                name: key_pattern.default_name(),
                key_pattern,
                collator: None,
                version: 2,
                unique: false,
                partial_filter: None,
            }),
            kind: AccessKind::IxScan,
            residual,
            multikey: false,
            assigned: 1,
            sort_direction: None,
            fetching: false,
        }
    }

    #[test]
    fn inclusion_of_key_fields_is_covered() {
        let mut shape = QueryShape::new(OpKind::Find, Expression::always());
        shape.projection = Some(Projection::parse(&doc! { "_id": 0, "a": 1 }).unwrap());
        assert!(!needs_fetch(&shape, &access(doc! { "a": 1 }, vec![])));

        shape.projection = Some(Projection::parse(&doc! { "a": 1 }).unwrap());
        assert!(needs_fetch(&shape, &access(doc! { "a": 1 }, vec![])));

        shape.projection = Some(Projection::parse(&doc! { "_id": 0, "a": 1 }).unwrap());
        let residual = vec![Expression::Eq("b".into(), Bson::Int32(1))];
        assert!(needs_fetch(&shape, &access(doc! { "a": 1 }, residual)));
    }

    #[test]
    fn blocking_sort_absorbs_skip_and_limit() {
        let mut shape = QueryShape::new(OpKind::Find, Expression::always());
        shape.sort = parse_sort(&doc! { "b": 1 }).unwrap();
        shape.skip = Some(2);
        shape.limit = Some(3);
        let plan = finalize(&shape, &[], &Access::CollScan { direction: ScanDirection::Forward }).unwrap();
        let PlanNode::Limit { n: 3, input } = plan else {
            panic!("expected LIMIT, got {plan:?}");
        };
        let PlanNode::Skip { n: 2, input } = *input else {
            panic!("expected SKIP");
        };
        assert!(matches!(*input, PlanNode::Sort { limit: Some(5), .. }));
    }

    #[test]
    fn absorbed_sort_limit_saturates() {
        let mut shape = QueryShape::new(OpKind::Find, Expression::always());
        shape.sort = parse_sort(&doc! { "b": 1 }).unwrap();
        shape.skip = Some(u64::MAX);
        shape.limit = Some(1);
        let plan = finalize(&shape, &[], &Access::CollScan { direction: ScanDirection::Forward }).unwrap();
        let PlanNode::Limit { input, .. } = plan else {
            panic!("expected LIMIT, got {plan:?}");
        };
        let PlanNode::Skip { input, .. } = *input else {
            panic!("expected SKIP");
        };
        assert!(matches!(*input, PlanNode::Sort { limit: Some(u64::MAX), .. }));
    }

    #[test]
    fn writes_wrap_a_fetch() {
        let shape = QueryShape::new(
            OpKind::Delete { multi: true },
            Expression::Eq("a".into(), Bson::Int32(1)),
        );
        let plan = finalize(&shape, &[], &Access::Index(access(doc! { "a": 1 }, vec![]))).unwrap();
        let PlanNode::Delete { multi: true, input } = plan else {
            panic!("expected DELETE");
        };
        assert!(matches!(*input, PlanNode::Fetch { filter: None, .. }));
    }
}
