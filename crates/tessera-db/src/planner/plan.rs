use std::sync::Arc;

use bson::{Bson, Document};
use tessera_collation::Collator;
use tessera_query::{Expression, Hint, Projection, Sort};

use crate::catalog::IndexDescriptor;

use super::bounds::IndexBounds;

/// Scan direction for collection and index scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    Forward,
    Backward,
}

impl ScanDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanDirection::Forward => "forward",
            ScanDirection::Backward => "backward",
        }
    }
}

/// Describes how an index scan is bounded.
#[derive(Debug, Clone)]
pub enum ScanBounds {
    /// Per-field interval lists.
    Intervals(IndexBounds),
    /// A range over whole keys in index order, from `min` inclusive to
    /// `max`. The end is inclusive only when no `max` was given.
    KeyRange {
        min: Vec<Bson>,
        max: Vec<Bson>,
        end_inclusive: bool,
    },
}

/// One stage of a physical plan.
#[derive(Debug, Clone)]
pub enum PlanNode {
    /// The collection does not exist.
    Eof,
    CollScan {
        filter: Option<Expression>,
        direction: ScanDirection,
    },
    IxScan {
        index: Arc<IndexDescriptor>,
        bounds: ScanBounds,
        direction: ScanDirection,
        multikey: bool,
    },
    /// Single-document lookup on the `_id` index.
    IdLookup {
        index: Arc<IndexDescriptor>,
        key: Bson,
    },
    /// Yields the first entry for each distinct leading key.
    DistinctScan {
        index: Arc<IndexDescriptor>,
        bounds: IndexBounds,
        fetching: bool,
    },
    CountScan {
        index: Arc<IndexDescriptor>,
        bounds: IndexBounds,
    },
    RecordStoreFastCount,
    /// Union of record ids from several index scans.
    Or {
        inputs: Vec<PlanNode>,
    },
    Fetch {
        filter: Option<Expression>,
        input: Box<PlanNode>,
    },
    Sort {
        sort: Vec<Sort>,
        limit: Option<u64>,
        input: Box<PlanNode>,
    },
    Skip {
        n: u64,
        input: Box<PlanNode>,
    },
    Limit {
        n: u64,
        input: Box<PlanNode>,
    },
    Projection {
        projection: Projection,
        covered: bool,
        input: Box<PlanNode>,
    },
    ReturnKey {
        input: Box<PlanNode>,
    },
    Count {
        skip: Option<u64>,
        limit: Option<u64>,
        input: Box<PlanNode>,
    },
    Update {
        multi: bool,
        input: Box<PlanNode>,
    },
    Delete {
        multi: bool,
        input: Box<PlanNode>,
    },
}

impl PlanNode {
    /// Stage name without any fast-path renaming.
    pub fn stage_name(&self) -> &'static str {
        match self {
            PlanNode::Eof => "EOF",
            PlanNode::CollScan { .. } => "COLLSCAN",
            PlanNode::IxScan { .. } => "IXSCAN",
            PlanNode::IdLookup { .. } => "IDHACK",
            PlanNode::DistinctScan { .. } => "DISTINCT_SCAN",
            PlanNode::CountScan { .. } => "COUNT_SCAN",
            PlanNode::RecordStoreFastCount => "RECORD_STORE_FAST_COUNT",
            PlanNode::Or { .. } => "OR",
            PlanNode::Fetch { .. } => "FETCH",
            PlanNode::Sort { .. } => "SORT",
            PlanNode::Skip { .. } => "SKIP",
            PlanNode::Limit { .. } => "LIMIT",
            PlanNode::Projection { covered: true, .. } => "PROJECTION_COVERED",
            PlanNode::Projection { covered: false, .. } => "PROJECTION_DEFAULT",
            PlanNode::ReturnKey { .. } => "RETURN_KEY",
            PlanNode::Count { .. } => "COUNT",
            PlanNode::Update { .. } => "UPDATE",
            PlanNode::Delete { .. } => "DELETE",
        }
    }

    /// The single child of a pass-through stage.
    pub fn input(&self) -> Option<&PlanNode> {
        match self {
            PlanNode::Fetch { input, .. }
            | PlanNode::Sort { input, .. }
            | PlanNode::Skip { input, .. }
            | PlanNode::Limit { input, .. }
            | PlanNode::Projection { input, .. }
            | PlanNode::ReturnKey { input }
            | PlanNode::Count { input, .. }
            | PlanNode::Update { input, .. }
            | PlanNode::Delete { input, .. } => Some(input),
            _ => None,
        }
    }
}

/// What the operation does with the documents it selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpKind {
    Find,
    Count,
    Distinct { key: String },
    Update { multi: bool },
    Delete { multi: bool },
}

/// Everything the planner needs to know about one operation.
#[derive(Debug, Clone)]
pub struct QueryShape {
    pub op: OpKind,
    pub predicate: Expression,
    pub sort: Vec<Sort>,
    pub projection: Option<Projection>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub hint: Option<Hint>,
    pub min: Option<Document>,
    pub max: Option<Document>,
    pub return_key: bool,
}

impl QueryShape {
    pub fn new(op: OpKind, predicate: Expression) -> Self {
        QueryShape {
            op,
            predicate,
            sort: Vec::new(),
            projection: None,
            skip: None,
            limit: None,
            hint: None,
            min: None,
            max: None,
            return_key: false,
        }
    }
}

/// The planner's output: the winning tree, the runners-up, and the
/// collation the operation runs under.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub root: PlanNode,
    pub rejected: Vec<PlanNode>,
    pub collator: Option<Collator>,
}
