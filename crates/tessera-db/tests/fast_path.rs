mod common;
use common::*;

use bson::doc;
use tessera_db::explain::{find_stage, plan_stages};
use tessera_db::{DeleteStatement, ExplainTarget, FindQuery, StageNaming, UpdateStatement, Verbosity};

fn by_id(id: impl Into<bson::Bson>, collation: Option<bson::Document>) -> FindQuery {
    FindQuery {
        filter: doc! { "_id": id.into() },
        collation: collation.map(Into::into),
        ..Default::default()
    }
}

// ── Fast path gating ────────────────────────────────────────────

#[test]
fn fast_path_when_collations_match() {
    let db = temp_db();
    create_collection(&db, COLLECTION, None);
    insert(&db, COLLECTION, vec![doc! { "_id": "foo" }, doc! { "_id": "FOO" }]);

    assert_eq!(find_stages(&db, COLLECTION, by_id("foo", None)), vec!["EXPRESS_IXSCAN"]);
    assert_eq!(find(&db, COLLECTION, &by_id("foo", None)).len(), 1);

    let mismatched = by_id("foo", Some(en_us_2()));
    let stages = find_stages(&db, COLLECTION, mismatched.clone());
    assert!(!stages.contains(&"EXPRESS_IXSCAN".to_string()));
    assert_eq!(find(&db, COLLECTION, &mismatched).len(), 2);
}

#[test]
fn fast_path_under_collection_default() {
    let db = temp_db();
    create_collection(&db, COLLECTION, Some(en_us_2()));
    insert(&db, COLLECTION, vec![doc! { "_id": "foo" }, doc! { "_id": "bar" }]);

    let explain = explain(&db, COLLECTION, ExplainTarget::Find(by_id("FOO", None)), Verbosity::QueryPlanner);
    let stage = find_stage(&explain, "EXPRESS_IXSCAN").unwrap();
    assert_eq!(stage.get_document("collation").unwrap().get_str("locale").unwrap(), "en_US");
    assert_eq!(find(&db, COLLECTION, &by_id("FOO", None)).len(), 1);

    let simple_query = by_id("FOO", Some(simple()));
    assert_eq!(find_stages(&db, COLLECTION, simple_query.clone()), vec!["COLLSCAN"]);
    assert!(find(&db, COLLECTION, &simple_query).is_empty());
}

#[test]
fn numeric_ids_ignore_collation() {
    let db = temp_db();
    create_collection(&db, COLLECTION, None);
    insert(&db, COLLECTION, vec![doc! { "_id": 1 }]);
    let stages = find_stages(&db, COLLECTION, by_id(1, Some(en_us_2())));
    assert_eq!(stages, vec!["EXPRESS_IXSCAN"]);
}

#[test]
fn classic_naming_uses_idhack() {
    let db = temp_db_with_naming(StageNaming::Classic);
    create_collection(&db, COLLECTION, None);
    insert(&db, COLLECTION, vec![doc! { "_id": "a", "n": 1 }]);

    assert_eq!(find_stages(&db, COLLECTION, by_id("a", None)), vec!["IDHACK"]);

    let update = ExplainTarget::Update(UpdateStatement {
        filter: doc! { "_id": "a" },
        update: doc! { "$inc": { "n": 1 } },
        ..Default::default()
    });
    let stages = plan_stages(&explain(&db, COLLECTION, update, Verbosity::QueryPlanner));
    assert_eq!(stages, vec!["UPDATE", "IDHACK"]);
}

#[test]
fn express_naming_folds_writes() {
    let db = temp_db();
    create_collection(&db, COLLECTION, None);
    insert(&db, COLLECTION, vec![doc! { "_id": "a", "n": 1 }]);

    let update = ExplainTarget::Update(UpdateStatement {
        filter: doc! { "_id": "a" },
        update: doc! { "$inc": { "n": 1 } },
        ..Default::default()
    });
    let stages = plan_stages(&explain(&db, COLLECTION, update, Verbosity::QueryPlanner));
    assert_eq!(stages, vec!["EXPRESS_UPDATE"]);

    let delete = ExplainTarget::Delete(DeleteStatement {
        filter: doc! { "_id": "a" },
        ..Default::default()
    });
    let stages = plan_stages(&explain(&db, COLLECTION, delete, Verbosity::QueryPlanner));
    assert_eq!(stages, vec!["EXPRESS_DELETE"]);

    let mismatched = ExplainTarget::Delete(DeleteStatement {
        filter: doc! { "_id": "a" },
        collation: Some(en_us_2().into()),
        ..Default::default()
    });
    let stages = plan_stages(&explain(&db, COLLECTION, mismatched, Verbosity::QueryPlanner));
    assert_eq!(stages, vec!["DELETE", "COLLSCAN"]);
}
