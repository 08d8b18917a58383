//! Explain output for planned operations.

use bson::{Bson, Document, doc};
use tessera_query::{KeyPattern, sort_to_document};

use crate::catalog::{IndexDescriptor, collation_document};
use crate::config::StageNaming;
use crate::error::DbError;
use crate::executor::{Execution, StageStats};
use crate::planner::plan::{PlanNode, QueryPlan, QueryShape, ScanBounds, ScanDirection};

/// How much an explain reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    #[default]
    QueryPlanner,
    ExecutionStats,
    AllPlansExecution,
}

impl Verbosity {
    pub fn parse(value: &str) -> Result<Self, DbError> {
        match value {
            "queryPlanner" => Ok(Verbosity::QueryPlanner),
            "executionStats" => Ok(Verbosity::ExecutionStats),
            "allPlansExecution" => Ok(Verbosity::AllPlansExecution),
            other => Err(DbError::BadValue(format!("unrecognized verbosity value: {other}"))),
        }
    }
}

/// Writes an explain would have performed.
#[derive(Debug, Clone, Copy)]
pub(crate) enum WouldWrite {
    Modify(u64),
    Delete(u64),
}

pub(crate) struct ExplainRequest<'a> {
    pub namespace: String,
    pub shape: &'a QueryShape,
    pub plan: &'a QueryPlan,
    pub execution: Option<&'a Execution>,
    pub would_write: Option<WouldWrite>,
    pub naming: StageNaming,
}

pub(crate) fn explain_document(req: &ExplainRequest<'_>) -> Document {
    let mut planner = doc! {
        "namespace": req.namespace.as_str(),
        "parsedQuery": req.shape.predicate.to_document(),
    };
    if let Some(collation) = collation_document(req.plan.collator.as_ref()) {
        planner.insert("collation", collation);
    }
    planner.insert("winningPlan", stage_document(&req.plan.root, None, req.naming));
    let rejected: Vec<Bson> = req
        .plan
        .rejected
        .iter()
        .map(|p| Bson::Document(stage_document(p, None, req.naming)))
        .collect();
    planner.insert("rejectedPlans", rejected);

    let mut out = doc! { "queryPlanner": planner };
    if let Some(execution) = req.execution {
        let stats = &execution.stats;
        let mut exec = doc! {
            "executionSuccess": true,
            "nReturned": n_returned(&req.plan.root, execution) as i64,
            "totalKeysExamined": stats.total_keys_examined() as i64,
            "totalDocsExamined": stats.total_docs_examined() as i64,
            "executionStages": stage_document(&req.plan.root, Some(stats), req.naming),
        };
        match req.would_write {
            Some(WouldWrite::Modify(n)) => {
                exec.insert("nWouldModify", n as i64);
            }
            Some(WouldWrite::Delete(n)) => {
                exec.insert("nWouldDelete", n as i64);
            }
            None => {}
        }
        out.insert("executionStats", exec);
    }
    out.insert("ok", 1.0);
    out
}

fn n_returned(root: &PlanNode, execution: &Execution) -> u64 {
    match root {
        PlanNode::Count { .. } | PlanNode::RecordStoreFastCount => 0,
        _ => execution.rows.len() as u64,
    }
}

// ── Stages ──────────────────────────────────────────────────────

fn stage_document(node: &PlanNode, stats: Option<&StageStats>, naming: StageNaming) -> Document {
    // Express naming folds a single-document write into its lookup.
    if naming == StageNaming::Express
        && let PlanNode::Update { input, .. } | PlanNode::Delete { input, .. } = node
        && let PlanNode::IdLookup { index, .. } = input.as_ref()
    {
        let stage = if matches!(node, PlanNode::Update { .. }) {
            "EXPRESS_UPDATE"
        } else {
            "EXPRESS_DELETE"
        };
        let mut doc = doc! { "stage": stage };
        index_fields(&mut doc, index);
        if let Some(stats) = stats {
            let lookup = stats.children.first();
            add_stats(&mut doc, node, stats);
            doc.insert("keysExamined", lookup.map_or(0, |s| s.keys_examined) as i64);
            doc.insert("docsExamined", lookup.map_or(0, |s| s.docs_examined) as i64);
        }
        return doc;
    }

    if naming == StageNaming::Classic
        && let PlanNode::DistinctScan { fetching: true, .. } = node
    {
        let mut scan = stage_body(node, naming);
        let mut fetch = doc! { "stage": "FETCH" };
        if let Some(stats) = stats {
            add_stats(&mut scan, node, stats);
            scan.insert("docsExamined", 0_i64);
            fetch.insert("nReturned", stats.n_returned as i64);
            fetch.insert("advanced", stats.n_returned as i64);
            fetch.insert("docsExamined", stats.docs_examined as i64);
        }
        fetch.insert("inputStage", scan);
        return fetch;
    }

    let mut doc = stage_body(node, naming);
    if let Some(stats) = stats {
        add_stats(&mut doc, node, stats);
    }
    match node {
        PlanNode::Or { inputs } => {
            let children: Vec<Bson> = inputs
                .iter()
                .enumerate()
                .map(|(i, input)| {
                    let child = stats.and_then(|s| s.children.get(i));
                    Bson::Document(stage_document(input, child, naming))
                })
                .collect();
            doc.insert("inputStages", children);
        }
        other => {
            if let Some(input) = other.input() {
                let child = stats.and_then(|s| s.children.first());
                doc.insert("inputStage", stage_document(input, child, naming));
            }
        }
    }
    doc
}

fn stage_body(node: &PlanNode, naming: StageNaming) -> Document {
    let stage = match (node, naming) {
        (PlanNode::IdLookup { .. }, StageNaming::Express) => "EXPRESS_IXSCAN",
        _ => node.stage_name(),
    };
    let mut doc = doc! { "stage": stage };
    match node {
        PlanNode::CollScan { filter, direction } => {
            if let Some(filter) = filter {
                doc.insert("filter", filter.to_document());
            }
            doc.insert("direction", direction.as_str());
        }
        PlanNode::IxScan {
            index,
            bounds,
            direction,
            multikey,
        } => {
            index_fields(&mut doc, index);
            doc.insert("isMultiKey", *multikey);
            doc.insert("isUnique", index.unique);
            doc.insert("isPartial", index.partial_filter.is_some());
            doc.insert("indexVersion", index.version);
            doc.insert("direction", direction.as_str());
            let backward = *direction == ScanDirection::Backward;
            doc.insert("indexBounds", scan_bounds_document(bounds, &index.key_pattern, backward));
        }
        PlanNode::IdLookup { index, .. } => index_fields(&mut doc, index),
        PlanNode::DistinctScan {
            index,
            bounds,
            fetching,
            ..
        } => {
            index_fields(&mut doc, index);
            doc.insert("isMultiKey", false);
            doc.insert("direction", "forward");
            doc.insert("indexBounds", bounds.to_document(&index.key_pattern, false));
            if naming == StageNaming::Express {
                doc.insert("isFetching", *fetching);
            }
        }
        PlanNode::CountScan { index, bounds } => {
            index_fields(&mut doc, index);
            doc.insert("isMultiKey", false);
            doc.insert("indexBounds", bounds.to_document(&index.key_pattern, false));
        }
        PlanNode::Fetch { filter: Some(filter), .. } => {
            doc.insert("filter", filter.to_document());
        }
        PlanNode::Sort { sort, limit, .. } => {
            doc.insert("sortPattern", sort_to_document(sort));
            doc.insert("type", "simple");
            if let Some(limit) = limit {
                doc.insert("limitAmount", *limit as i64);
            }
        }
        PlanNode::Skip { n, .. } => {
            doc.insert("skipAmount", *n as i64);
        }
        PlanNode::Limit { n, .. } => {
            doc.insert("limitAmount", *n as i64);
        }
        PlanNode::Projection { projection, .. } => {
            doc.insert("transformBy", projection.to_document());
        }
        _ => {}
    }
    doc
}

/// Key pattern, name and bound collation of an index stage.
fn index_fields(doc: &mut Document, index: &IndexDescriptor) {
    doc.insert("keyPattern", index.key_pattern.to_document());
    doc.insert("indexName", index.name.as_str());
    if let Some(collation) = collation_document(index.collator.as_ref()) {
        doc.insert("collation", collation);
    }
}

fn scan_bounds_document(bounds: &ScanBounds, pattern: &KeyPattern, backward: bool) -> Document {
    match bounds {
        ScanBounds::Intervals(bounds) => bounds.to_document(pattern, backward),
        ScanBounds::KeyRange {
            min,
            max,
            end_inclusive,
        } => {
            let key = |values: &[Bson]| {
                let mut doc = Document::new();
                for (field, value) in pattern.field_names().zip(values) {
                    doc.insert(field, value.clone());
                }
                doc
            };
            doc! {
                "startKey": key(min),
                "startKeyInclusive": true,
                "endKey": key(max),
                "endKeyInclusive": *end_inclusive,
            }
        }
    }
}

fn add_stats(doc: &mut Document, node: &PlanNode, stats: &StageStats) {
    doc.insert("nReturned", stats.n_returned as i64);
    doc.insert("advanced", stats.n_returned as i64);
    match node {
        PlanNode::IxScan { .. }
        | PlanNode::IdLookup { .. }
        | PlanNode::DistinctScan { .. }
        | PlanNode::CountScan { .. } => {
            doc.insert("keysExamined", stats.keys_examined as i64);
        }
        PlanNode::CollScan { .. } | PlanNode::Fetch { .. } => {
            doc.insert("docsExamined", stats.docs_examined as i64);
        }
        PlanNode::Count { .. } | PlanNode::RecordStoreFastCount => {
            doc.insert("nCounted", stats.n_counted as i64);
        }
        _ => {}
    }
}

// ── Inspection helpers ──────────────────────────────────────────

/// Stage names of the winning plan, root first, depth first.
pub fn plan_stages(explain: &Document) -> Vec<String> {
    let mut out = Vec::new();
    if let Ok(plan) = explain
        .get_document("queryPlanner")
        .and_then(|p| p.get_document("winningPlan"))
    {
        collect_stages(plan, &mut out);
    }
    out
}

fn collect_stages(stage: &Document, out: &mut Vec<String>) {
    if let Ok(name) = stage.get_str("stage") {
        out.push(name.to_string());
    }
    if let Ok(input) = stage.get_document("inputStage") {
        collect_stages(input, out);
    }
    if let Ok(inputs) = stage.get_array("inputStages") {
        for input in inputs {
            if let Bson::Document(d) = input {
                collect_stages(d, out);
            }
        }
    }
}

/// The first stage named `name` in the winning plan.
pub fn find_stage<'a>(explain: &'a Document, name: &str) -> Option<&'a Document> {
    let plan = explain
        .get_document("queryPlanner")
        .and_then(|p| p.get_document("winningPlan"))
        .ok()?;
    find_in(plan, name)
}

/// The first stage named `name` in the execution stats tree.
pub fn find_execution_stage<'a>(explain: &'a Document, name: &str) -> Option<&'a Document> {
    let stages = explain
        .get_document("executionStats")
        .and_then(|p| p.get_document("executionStages"))
        .ok()?;
    find_in(stages, name)
}

fn find_in<'a>(stage: &'a Document, name: &str) -> Option<&'a Document> {
    if stage.get_str("stage").is_ok_and(|s| s == name) {
        return Some(stage);
    }
    if let Ok(input) = stage.get_document("inputStage")
        && let Some(found) = find_in(input, name)
    {
        return Some(found);
    }
    if let Ok(inputs) = stage.get_array("inputStages") {
        for input in inputs {
            if let Bson::Document(d) = input
                && let Some(found) = find_in(d, name)
            {
                return Some(found);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_helpers_walk_nested_plans() {
        let explain = doc! {
            "queryPlanner": {
                "winningPlan": {
                    "stage": "SORT",
                    "inputStage": {
                        "stage": "FETCH",
                        "inputStage": { "stage": "IXSCAN", "indexName": "a_1" },
                    },
                },
            },
        };
        assert_eq!(plan_stages(&explain), vec!["SORT", "FETCH", "IXSCAN"]);
        assert_eq!(
            find_stage(&explain, "IXSCAN").unwrap().get_str("indexName").unwrap(),
            "a_1"
        );
        assert!(find_stage(&explain, "COLLSCAN").is_none());
    }

    #[test]
    fn verbosity_names() {
        assert_eq!(Verbosity::parse("executionStats").unwrap(), Verbosity::ExecutionStats);
        assert!(Verbosity::parse("loud").is_err());
    }
}
