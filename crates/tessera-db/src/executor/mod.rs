mod nodes;

use std::sync::Arc;

use bson::{Bson, Document};
use tessera_collation::Collator;

use crate::catalog::IndexDescriptor;
use crate::error::DbError;
use crate::planner::plan::PlanNode;
use crate::store::{CollectionState, RecordId};

// ── Rows ────────────────────────────────────────────────────────

/// Index entry a row was produced from.
#[derive(Debug, Clone)]
pub(crate) struct KeyRef {
    pub index: Arc<IndexDescriptor>,
    pub values: Arc<Vec<Bson>>,
}

/// One result flowing between stages. Index stages yield a key and no
/// document until a fetch reads it.
#[derive(Debug, Clone)]
pub(crate) struct Row {
    pub rid: Option<RecordId>,
    pub doc: Option<Arc<Document>>,
    pub key: Option<KeyRef>,
}

impl Row {
    fn document(rid: RecordId, doc: Arc<Document>) -> Self {
        Row {
            rid: Some(rid),
            doc: Some(doc),
            key: None,
        }
    }

    fn keyed(rid: RecordId, key: KeyRef) -> Self {
        Row {
            rid: Some(rid),
            doc: None,
            key: Some(key),
        }
    }

    /// The row as a document: the stored document, or one rebuilt from
    /// the key fields.
    pub fn to_document(&self) -> Document {
        match (&self.doc, &self.key) {
            (Some(doc), _) => doc.as_ref().clone(),
            (None, Some(key)) => nodes::projection::key_document(key),
            (None, None) => Document::new(),
        }
    }
}

// ── Stats ───────────────────────────────────────────────────────

/// Per-stage counters, shaped like the plan tree they were collected on.
#[derive(Debug, Clone, Default)]
pub(crate) struct StageStats {
    pub n_returned: u64,
    pub keys_examined: u64,
    pub docs_examined: u64,
    pub n_counted: u64,
    pub children: Vec<StageStats>,
}

impl StageStats {
    fn with_child(child: StageStats) -> Self {
        StageStats {
            children: vec![child],
            ..StageStats::default()
        }
    }

    pub fn total_keys_examined(&self) -> u64 {
        self.keys_examined + self.children.iter().map(Self::total_keys_examined).sum::<u64>()
    }

    pub fn total_docs_examined(&self) -> u64 {
        self.docs_examined + self.children.iter().map(Self::total_docs_examined).sum::<u64>()
    }
}

pub(crate) struct Execution {
    pub rows: Vec<Row>,
    pub stats: StageStats,
}

impl Execution {
    /// Result documents in output order.
    pub fn documents(&self) -> Vec<Document> {
        self.rows.iter().map(Row::to_document).collect()
    }

    /// Count reported by a counting root.
    pub fn counted(&self) -> u64 {
        self.stats.n_counted
    }
}

// ── Executor ────────────────────────────────────────────────────

/// Runs a plan against one collection snapshot. Every stage is
/// materialized before its parent runs.
pub(crate) struct Executor<'c> {
    collection: Option<&'c CollectionState>,
    collator: Option<&'c Collator>,
    max_sort_documents: usize,
}

impl<'c> Executor<'c> {
    pub fn new(
        collection: Option<&'c CollectionState>,
        collator: Option<&'c Collator>,
        max_sort_documents: usize,
    ) -> Self {
        Self {
            collection,
            collator,
            max_sort_documents,
        }
    }

    pub fn execute(&self, node: &PlanNode) -> Result<Execution, DbError> {
        let (rows, stats) = self.execute_node(node)?;
        Ok(Execution { rows, stats })
    }

    fn execute_node(&self, node: &PlanNode) -> Result<(Vec<Row>, StageStats), DbError> {
        let Some(collection) = self.collection else {
            return Ok((Vec::new(), StageStats::default()));
        };
        let (rows, mut stats) = match node {
            PlanNode::Eof => (Vec::new(), StageStats::default()),
            PlanNode::CollScan { filter, direction } => {
                nodes::scan::execute(collection, filter.as_ref(), *direction, self.collator)
            }
            PlanNode::RecordStoreFastCount => nodes::scan::fast_count(collection),
            PlanNode::IxScan {
                index,
                bounds,
                direction,
                multikey,
            } => nodes::index_scan::execute(collection, index, bounds, *direction, *multikey)?,
            PlanNode::IdLookup { index, key } => nodes::index_scan::id_lookup(collection, index, key)?,
            PlanNode::DistinctScan {
                index,
                bounds,
                fetching,
                ..
            } => nodes::index_scan::distinct_scan(collection, index, bounds, *fetching)?,
            PlanNode::CountScan { index, bounds } => {
                nodes::index_scan::count_scan(collection, index, bounds)?
            }
            PlanNode::Or { inputs } => {
                let mut sources = Vec::with_capacity(inputs.len());
                for input in inputs {
                    sources.push(self.execute_node(input)?);
                }
                nodes::index_merge::execute(sources)
            }
            PlanNode::Fetch { filter, input } => {
                let source = self.execute_node(input)?;
                nodes::read_record::execute(collection, filter.as_ref(), self.collator, source)?
            }
            PlanNode::Sort { sort, limit, input } => {
                let source = self.execute_node(input)?;
                nodes::sort::execute(sort, *limit, self.collator, self.max_sort_documents, source)?
            }
            PlanNode::Skip { n, input } => {
                let source = self.execute_node(input)?;
                nodes::limit::skip(*n, source)
            }
            PlanNode::Limit { n, input } => {
                let source = self.execute_node(input)?;
                nodes::limit::limit(*n, source)
            }
            PlanNode::Projection { projection, input, .. } => {
                let source = self.execute_node(input)?;
                nodes::projection::execute(projection, source)
            }
            PlanNode::ReturnKey { input } => {
                let source = self.execute_node(input)?;
                nodes::projection::return_key(source)
            }
            PlanNode::Count { skip, limit, input } => {
                let source = self.execute_node(input)?;
                nodes::count::execute(*skip, *limit, source)
            }
            PlanNode::Update { multi, input } | PlanNode::Delete { multi, input } => {
                let source = self.execute_node(input)?;
                nodes::limit::write_targets(*multi, source)
            }
        };
        stats.n_returned = rows.len() as u64;
        Ok((rows, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use tessera_query::{Expression, KeyPattern};

    use crate::catalog::CollectionMeta;
    use crate::collection::CollectionConfig;
    use crate::planner::bounds::{IndexBounds, Interval};
    use crate::planner::plan::{ScanBounds, ScanDirection};

    fn collection() -> CollectionState {
        let meta = CollectionMeta::new(&CollectionConfig::new("t"), tessera_collation::COLLATOR_VERSION)
            .unwrap();
        let mut state = CollectionState::new(meta);
        for (i, a) in [3, 1, 2, 5, 4].into_iter().enumerate() {
            state.insert(doc! { "_id": i as i32, "a": a }).unwrap();
        }
        let pattern = KeyPattern::parse(&doc! { "a": 1 }).unwrap();
        state
            .add_index(IndexDescriptor {
                name: "a_1".into(),
                key_pattern: pattern,
                collator: None,
                version: 2,
                unique: false,
                partial_filter: None,
            })
            .unwrap();
        state
    }

    #[test]
    fn index_scan_walks_bounds_in_order() {
        let state = collection();
        let index = state.meta.index("a_1").unwrap().clone();
        let mut bounds = IndexBounds::full(&index.key_pattern);
        bounds.fields[0].intervals = vec![Interval {
            low: Bson::Int32(2),
            low_inclusive: false,
            high: Bson::Int32(5),
            high_inclusive: true,
        }];
        let plan = PlanNode::Fetch {
            filter: None,
            input: Box::new(PlanNode::IxScan {
                index,
                bounds: ScanBounds::Intervals(bounds),
                direction: ScanDirection::Backward,
                multikey: false,
            }),
        };
        let exec = Executor::new(Some(&state), None, 100).execute(&plan).unwrap();
        let values: Vec<i32> = exec
            .documents()
            .iter()
            .map(|d| d.get_i32("a").unwrap())
            .collect();
        assert_eq!(values, vec![5, 4, 3]);
        assert_eq!(exec.stats.total_docs_examined(), 3);
    }

    #[test]
    fn collscan_applies_filter() {
        let state = collection();
        let plan = PlanNode::CollScan {
            filter: Some(Expression::Gt("a".into(), Bson::Int32(3))),
            direction: ScanDirection::Forward,
        };
        let exec = Executor::new(Some(&state), None, 100).execute(&plan).unwrap();
        assert_eq!(exec.rows.len(), 2);
        assert_eq!(exec.stats.docs_examined, 5);
    }

    #[test]
    fn missing_collection_yields_nothing() {
        let plan = PlanNode::Eof;
        let exec = Executor::new(None, None, 100).execute(&plan).unwrap();
        assert!(exec.rows.is_empty());
    }
}
