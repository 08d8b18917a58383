mod common;
use common::*;

use bson::{Bson, doc};
use tessera_db::explain::{find_stage, plan_stages};
use tessera_db::{DistinctQuery, ExplainTarget, IndexSpec, StageNaming, Verbosity};

fn distinct(db: &tessera_db::Database, query: &DistinctQuery) -> Vec<Bson> {
    let txn = db.begin(true).unwrap();
    txn.distinct(COLLECTION, query).unwrap()
}

fn on_str(collation: Option<bson::Document>) -> DistinctQuery {
    DistinctQuery {
        key: "str".into(),
        collation: collation.map(Into::into),
        ..Default::default()
    }
}

fn strings(values: &[&str]) -> Vec<Bson> {
    values.iter().map(|s| Bson::String(s.to_string())).collect()
}

// ── Distinct under collation ────────────────────────────────────

#[test]
fn values_are_deduplicated_under_collation() {
    let db = temp_db();
    create_collection(&db, COLLECTION, None);
    seed_strings(&db, &["foo", "FOO", "bar"]);

    assert_eq!(distinct(&db, &on_str(None)), strings(&["FOO", "bar", "foo"]));
    assert_eq!(distinct(&db, &on_str(Some(en_us_2()))), strings(&["bar", "foo"]));
}

#[test]
fn array_elements_are_unwound() {
    let db = temp_db();
    create_collection(&db, COLLECTION, None);
    insert(
        &db,
        COLLECTION,
        vec![doc! { "tags": ["a", "b"] }, doc! { "tags": ["b", "c"] }, doc! { "tags": "a" }],
    );
    let values = distinct(
        &db,
        &DistinctQuery {
            key: "tags".into(),
            ..Default::default()
        },
    );
    assert_eq!(values, strings(&["a", "b", "c"]));
}

#[test]
fn simple_index_gives_covered_distinct_scan() {
    let db = temp_db();
    create_collection(&db, COLLECTION, None);
    create_index(&db, COLLECTION, IndexSpec::new(doc! { "str": 1 }));
    seed_strings(&db, &["b", "a", "b"]);

    let explain = explain(&db, COLLECTION, ExplainTarget::Distinct(on_str(None)), Verbosity::QueryPlanner);
    assert_eq!(plan_stages(&explain), vec!["PROJECTION_COVERED", "DISTINCT_SCAN"]);
    assert!(!find_stage(&explain, "DISTINCT_SCAN").unwrap().get_bool("isFetching").unwrap());
    assert_eq!(distinct(&db, &on_str(None)), strings(&["a", "b"]));
}

#[test]
fn distinct_scan_counts_every_key_it_walks() {
    let db = temp_db();
    create_collection(&db, COLLECTION, None);
    create_index(&db, COLLECTION, IndexSpec::new(doc! { "str": 1 }));
    seed_strings(&db, &["b", "a", "b"]);

    let explain = explain(&db, COLLECTION, ExplainTarget::Distinct(on_str(None)), Verbosity::ExecutionStats);
    let stats = explain.get_document("executionStats").unwrap();
    assert_eq!(stats.get_i64("nReturned").unwrap(), 2);
    assert_eq!(stats.get_i64("totalKeysExamined").unwrap(), 3);
}

#[test]
fn collated_index_gives_fetching_distinct_scan() {
    let db = temp_db();
    create_collection(&db, COLLECTION, None);
    create_index(&db, COLLECTION, IndexSpec::new(doc! { "str": 1 }).collation(en_us_2()));
    seed_strings(&db, &["foo", "FOO", "bar"]);

    let target = ExplainTarget::Distinct(on_str(Some(en_us_2())));
    let explain = explain(&db, COLLECTION, target, Verbosity::QueryPlanner);
    assert_eq!(plan_stages(&explain), vec!["PROJECTION_DEFAULT", "DISTINCT_SCAN"]);
    let scan = find_stage(&explain, "DISTINCT_SCAN").unwrap();
    assert!(scan.get_bool("isFetching").unwrap());
    assert_eq!(scan.get_document("collation").unwrap().get_str("locale").unwrap(), "en_US");

    assert_eq!(distinct(&db, &on_str(Some(en_us_2()))), strings(&["bar", "foo"]));
}

#[test]
fn classic_naming_puts_fetch_above_distinct_scan() {
    let db = temp_db_with_naming(StageNaming::Classic);
    create_collection(&db, COLLECTION, None);
    create_index(&db, COLLECTION, IndexSpec::new(doc! { "str": 1 }).collation(en_us_2()));
    seed_strings(&db, &["foo", "FOO"]);

    let target = ExplainTarget::Distinct(on_str(Some(en_us_2())));
    let explain = explain(&db, COLLECTION, target, Verbosity::QueryPlanner);
    assert_eq!(plan_stages(&explain), vec!["PROJECTION_DEFAULT", "FETCH", "DISTINCT_SCAN"]);
    assert!(find_stage(&explain, "DISTINCT_SCAN").unwrap().get("isFetching").is_none());
}

#[test]
fn mismatched_index_is_not_used_for_strings() {
    let db = temp_db();
    create_collection(&db, COLLECTION, None);
    create_index(&db, COLLECTION, IndexSpec::new(doc! { "str": 1 }).collation(en_us_2()));
    seed_strings(&db, &["foo", "FOO"]);

    let explain = explain(&db, COLLECTION, ExplainTarget::Distinct(on_str(None)), Verbosity::QueryPlanner);
    assert_eq!(plan_stages(&explain), vec!["COLLSCAN"]);
    assert_eq!(distinct(&db, &on_str(None)), strings(&["FOO", "foo"]));
}

#[test]
fn empty_key_is_rejected() {
    let db = temp_db();
    create_collection(&db, COLLECTION, None);
    let txn = db.begin(true).unwrap();
    let err = txn.distinct(COLLECTION, &DistinctQuery::default()).unwrap_err();
    assert_eq!(err.code().code(), 2);
}
