//! Collation-aware plan selection.
//!
//! Planning runs in four steps: resolve the operation's collation, propose
//! candidate accesses from the catalog, drop the ones whose index collation
//! cannot answer the predicates, then finalize the best survivor into a
//! stage tree.

mod admissibility;
pub(crate) mod bounds;
mod candidates;
mod finalize;
mod min_max;
pub mod plan;
mod resolver;
mod subsumption;

use tessera_collation::Collator;
use tracing::debug;

use crate::catalog::{CollectionMeta, IndexDescriptor};
use crate::error::DbError;
use crate::store::CollectionState;

use admissibility::{Access, admit};
use plan::{PlanNode, QueryPlan, QueryShape};

pub(crate) use resolver::resolve_collation;

/// A collection snapshot and the collation an operation runs under.
pub(crate) struct PlanningContext<'a> {
    pub collection: &'a CollectionState,
    pub collator: Option<&'a Collator>,
}

impl PlanningContext<'_> {
    pub fn meta(&self) -> &CollectionMeta {
        &self.collection.meta
    }

    pub fn is_multikey(&self, index: &IndexDescriptor) -> bool {
        self.collection.is_multikey(&index.name)
    }
}

/// Choose the winning plan for `shape`.
pub(crate) fn plan(ctx: &PlanningContext<'_>, shape: &QueryShape) -> Result<QueryPlan, DbError> {
    let collator = ctx.collator.cloned();
    if shape.min.is_some() || shape.max.is_some() {
        let root = min_max::plan_min_max(ctx, shape)?;
        return Ok(QueryPlan {
            root,
            rejected: Vec::new(),
            collator,
        });
    }

    let candidates = candidates::generate(ctx, shape)?;
    let conjuncts = candidates.conjuncts.clone();
    let mut ranked = admit(ctx, shape, candidates).into_iter();
    let Some(winner) = ranked.next() else {
        return Err(DbError::NoQueryExecutionPlans(
            "no index can answer the query under its collation".into(),
        ));
    };

    let root = finalize::finalize(shape, &conjuncts, &winner.access)?;
    let mut rejected = Vec::new();
    if !matches!(winner.access, Access::FastPath { .. } | Access::FastCount) {
        for other in ranked {
            if matches!(other.access, Access::Index(_) | Access::Or { .. }) {
                rejected.push(finalize::finalize(shape, &conjuncts, &other.access)?);
            }
        }
    }
    debug!(
        collection = %ctx.meta().name,
        winner = root_summary(&root),
        rejected = rejected.len(),
        "plan selected"
    );
    Ok(QueryPlan {
        root,
        rejected,
        collator,
    })
}

/// Plan for an operation on a collection that does not exist.
pub(crate) fn eof_plan(collator: Option<Collator>) -> QueryPlan {
    QueryPlan {
        root: PlanNode::Eof,
        rejected: Vec::new(),
        collator,
    }
}

fn root_summary(root: &PlanNode) -> String {
    let mut names = Vec::new();
    let mut node = Some(root);
    while let Some(n) = node {
        names.push(n.stage_name());
        node = n.input();
    }
    names.join(" > ")
}
