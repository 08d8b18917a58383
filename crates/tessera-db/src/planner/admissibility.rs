use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;

use bson::Bson;
use tessera_collation::collators_match;
use tessera_query::{Expression, Sort};
use tracing::{debug, warn};

use crate::catalog::IndexDescriptor;

use super::PlanningContext;
use super::bounds::{IndexBounds, intersect, normalize, predicate_bounds};
use super::candidates::{AccessKind, Candidates, IndexCandidate, OrCandidate, sort_direction};
use super::finalize::needs_fetch;
use super::plan::{QueryShape, ScanDirection};
use super::subsumption::subsumes;

/// An index access that survived collation and subsumption checks, with
/// its bounds computed under the index collation.
#[derive(Debug, Clone)]
pub(crate) struct IndexAccess {
    pub index: Arc<IndexDescriptor>,
    pub kind: AccessKind,
    pub bounds: IndexBounds,
    /// Conjuncts the bounds do not answer exactly.
    pub residual: Vec<Expression>,
    pub multikey: bool,
    pub assigned: usize,
    /// Scan direction that yields the requested sort, if the index provides it.
    pub sort_direction: Option<ScanDirection>,
    /// Distinct scans that must read documents to return original strings.
    pub fetching: bool,
}

impl IndexAccess {
    pub fn exact(&self) -> bool {
        self.residual.is_empty()
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Access {
    CollScan { direction: ScanDirection },
    FastPath { index: Arc<IndexDescriptor>, key: Bson },
    FastCount,
    Index(IndexAccess),
    Or { conjunct: usize, branches: Vec<IndexAccess> },
}

/// Ordering key; smaller is better.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Rank {
    class: u8,
    equality: Reverse<usize>,
    assigned: Reverse<usize>,
    unsorted: bool,
    key_len: usize,
    name: String,
}

#[derive(Debug, Clone)]
pub(crate) struct Ranked {
    pub access: Access,
    rank: Rank,
}

/// Drop inadmissible candidates and order the rest best-first.
pub(crate) fn admit(ctx: &PlanningContext<'_>, shape: &QueryShape, candidates: Candidates) -> Vec<Ranked> {
    let mut out = Vec::new();

    if let Some((index, key)) = candidates.fast_path {
        out.push(Ranked {
            rank: rank_of(0, None),
            access: Access::FastPath { index, key },
        });
    }
    if candidates.fast_count {
        out.push(Ranked {
            rank: rank_of(1, None),
            access: Access::FastCount,
        });
    }

    for candidate in &candidates.indexed {
        let Some(access) = admit_index(ctx, &shape.sort, &candidates.conjuncts, candidate) else {
            continue;
        };
        let class = match access.kind {
            AccessKind::CountScan => 1,
            AccessKind::DistinctScan if !access.fetching => 1,
            AccessKind::DistinctScan => 2,
            AccessKind::IxScan if !needs_fetch(shape, &access) => 2,
            AccessKind::IxScan => 3,
        };
        out.push(Ranked {
            rank: rank_of(class, Some(&access)),
            access: Access::Index(access),
        });
    }

    if let Some(or) = &candidates.or
        && let Some(branches) = admit_or(ctx, or)
    {
        let assigned = branches.iter().map(|b| b.assigned).sum();
        out.push(Ranked {
            rank: Rank {
                class: 4,
                equality: Reverse(0),
                assigned: Reverse(assigned),
                unsorted: true,
                key_len: 0,
                name: String::new(),
            },
            access: Access::Or {
                conjunct: or.conjunct,
                branches,
            },
        });
    }

    if let Some(direction) = candidates.collscan {
        out.push(Ranked {
            rank: rank_of(5, None),
            access: Access::CollScan { direction },
        });
    }

    out.sort_by(|a, b| a.rank.cmp(&b.rank));
    debug!(
        collection = %ctx.meta().name,
        admitted = out.len(),
        winner = ?out.first().map(|r| r.rank.class),
        "candidates ranked"
    );
    out
}

fn rank_of(class: u8, access: Option<&IndexAccess>) -> Rank {
    match access {
        None => Rank {
            class,
            equality: Reverse(0),
            assigned: Reverse(0),
            unsorted: true,
            key_len: 0,
            name: String::new(),
        },
        Some(a) => Rank {
            class,
            equality: Reverse(a.bounds.equality_prefix()),
            assigned: Reverse(a.assigned),
            unsorted: a.sort_direction.is_none(),
            key_len: a.index.key_pattern.len(),
            name: a.index.name.clone(),
        },
    }
}

/// Apply the collation rules to one candidate and compute its bounds.
///
/// Under a different collation only predicates that compare no strings may
/// use the index. A hinted index is never dropped: whatever it cannot
/// answer stays in the residual filter.
pub(crate) fn admit_index(
    ctx: &PlanningContext<'_>,
    sort: &[Sort],
    conjuncts: &[Expression],
    candidate: &IndexCandidate,
) -> Option<IndexAccess> {
    let index = &candidate.index;
    let collator = index.collator.as_ref();
    let matching = collators_match(collator, ctx.collator);
    let multikey = ctx.is_multikey(index);

    let mut assignments: Vec<_> = candidate
        .assignments
        .iter()
        .filter(|a| matching || !a.collatable)
        .collect();
    if multikey {
        // bounds on one field of a multikey index cannot be intersected
        let mut seen = HashSet::new();
        assignments.retain(|a| seen.insert(a.position));
    }

    if candidate.hinted {
        if assignments.len() < candidate.assignments.len() {
            warn!(
                collection = %ctx.meta().name,
                index = %index.name,
                "hinted index collation differs from the query; collatable predicates move to the fetch filter"
            );
        }
    } else if let Some(partial) = &index.partial_filter
        && !subsumes(&partial.expression, conjuncts, collator, ctx.collator)
    {
        return None;
    }

    let mut bounds = IndexBounds::full(&index.key_pattern);
    let mut constrained = vec![false; index.key_pattern.len()];
    let mut exact_conjuncts = HashSet::new();
    for assignment in &assignments {
        let Some((intervals, exact)) = predicate_bounds(&conjuncts[assignment.conjunct]) else {
            continue;
        };
        let intervals = normalize(intervals, collator);
        let field = &mut bounds.fields[assignment.position];
        field.intervals = if constrained[assignment.position] {
            intersect(&field.intervals, &intervals, collator)
        } else {
            intervals
        };
        constrained[assignment.position] = true;
        if exact {
            exact_conjuncts.insert(assignment.conjunct);
        }
    }
    let residual: Vec<Expression> = conjuncts
        .iter()
        .enumerate()
        .filter(|(i, _)| !exact_conjuncts.contains(i))
        .map(|(_, c)| c.clone())
        .collect();

    let sort_direction = if matching && !multikey {
        sort_direction(&index.key_pattern, sort)
    } else {
        None
    };

    let mut access = IndexAccess {
        index: Arc::clone(index),
        kind: candidate.kind,
        bounds,
        residual,
        multikey,
        assigned: assignments.len(),
        sort_direction,
        fetching: false,
    };

    match candidate.kind {
        AccessKind::IxScan => {
            if !candidate.hinted && !constrained[0] && access.sort_direction.is_none() {
                return None;
            }
        }
        AccessKind::DistinctScan => {
            // the filter may only constrain the distinct key, exactly
            if multikey || !access.exact() || assignments.iter().any(|a| a.position != 0) {
                return None;
            }
            let strings = access.bounds.fields[0]
                .intervals
                .iter()
                .any(|i| i.may_contain_strings());
            if strings && !matching {
                return None;
            }
            access.fetching = strings && collator.is_some();
        }
        AccessKind::CountScan => {
            if multikey || !access.exact() || !access.bounds.is_single_range() {
                return None;
            }
        }
    }
    Some(access)
}

/// Best admissible index for every `$or` branch, or nothing.
fn admit_or(ctx: &PlanningContext<'_>, or: &OrCandidate) -> Option<Vec<IndexAccess>> {
    let mut chosen = Vec::with_capacity(or.branches.len());
    for branch in &or.branches {
        let best = branch
            .candidates
            .iter()
            .filter_map(|c| admit_index(ctx, &[], &branch.conjuncts, c))
            .filter(|a| a.bounds.fields.first().is_some_and(|f| !f.is_all()))
            .min_by_key(|a| rank_of(3, Some(a)))?;
        chosen.push(best);
    }
    Some(chosen)
}
