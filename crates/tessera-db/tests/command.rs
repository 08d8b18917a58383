mod common;
use common::*;

use bson::{Bson, Document, doc};
use tessera_db::Database;

fn run(db: &Database, command: Document) -> Document {
    let reply = db.run_command(&command);
    assert_eq!(reply.get_f64("ok").unwrap(), 1.0, "command failed: {reply}");
    reply
}

fn first_batch(reply: &Document) -> Vec<Document> {
    reply
        .get_document("cursor")
        .unwrap()
        .get_array("firstBatch")
        .unwrap()
        .iter()
        .map(|b| b.as_document().unwrap().clone())
        .collect()
}

fn seeded() -> Database {
    let db = temp_db();
    run(&db, doc! { "create": "strings", "collation": { "locale": "en_US", "strength": 2 } });
    run(&db, doc! {
        "insert": "strings",
        "documents": [
            { "_id": 1, "str": "foo" },
            { "_id": 2, "str": "FOO" },
            { "_id": 3, "str": "bar" },
        ],
    });
    db
}

// ── Catalog commands ────────────────────────────────────────────

#[test]
fn list_collections_echoes_normalized_collation() {
    let db = seeded();
    run(&db, doc! { "create": "plain" });

    let reply = run(&db, doc! { "listCollections": 1, "filter": { "name": "strings" } });
    let batch = first_batch(&reply);
    assert_eq!(batch.len(), 1);
    let collation = batch[0]
        .get_document("options")
        .unwrap()
        .get_document("collation")
        .unwrap();
    assert_eq!(collation.get_str("locale").unwrap(), "en_US");
    assert_eq!(collation.get_str("caseFirst").unwrap(), "off");
    assert_eq!(collation.get_str("version").unwrap(), "57.1");

    let all = first_batch(&run(&db, doc! { "listCollections": 1 }));
    assert_eq!(all.len(), 2);
}

#[test]
fn create_and_list_indexes() {
    let db = seeded();
    let reply = run(&db, doc! {
        "createIndexes": "strings",
        "indexes": [
            { "key": { "str": 1 }, "name": "str_1" },
            { "key": { "str": 1, "_id": 1 }, "name": "binary", "collation": { "locale": "simple" } },
        ],
    });
    assert!(!reply.get_bool("createdCollectionAutomatically").unwrap());
    assert_eq!(reply.get_i32("numIndexesBefore").unwrap(), 1);
    assert_eq!(reply.get_i32("numIndexesAfter").unwrap(), 3);

    let indexes = first_batch(&run(&db, doc! { "listIndexes": "strings" }));
    let names: Vec<&str> = indexes.iter().map(|i| i.get_str("name").unwrap()).collect();
    assert_eq!(names, vec!["_id_", "str_1", "binary"]);
    assert!(indexes[1].get_document("collation").is_ok());
    assert!(indexes[2].get("collation").is_none());

    run(&db, doc! { "dropIndexes": "strings", "index": "binary" });
    assert_eq!(first_batch(&run(&db, doc! { "listIndexes": "strings" })).len(), 2);
}

#[test]
fn error_replies_carry_code_name() {
    let db = seeded();
    let reply = db.run_command(&doc! { "create": "strings" });
    assert_eq!(reply.get_f64("ok").unwrap(), 0.0);
    assert_eq!(reply.get_i32("code").unwrap(), 48);
    assert_eq!(reply.get_str("codeName").unwrap(), "NamespaceExists");

    let reply = db.run_command(&doc! { "create": "bad", "collation": { "locale": "xx_YY" } });
    assert_eq!(reply.get_str("codeName").unwrap(), "BadValue");
    let listed = first_batch(&run(&db, doc! { "listCollections": 1, "filter": { "name": "bad" } }));
    assert!(listed.is_empty());
}

// ── Reads ───────────────────────────────────────────────────────

#[test]
fn find_count_and_distinct_use_collation() {
    let db = seeded();

    let found = first_batch(&run(&db, doc! { "find": "strings", "filter": { "str": "foo" } }));
    assert_eq!(found.len(), 2);

    let binary = first_batch(&run(&db, doc! {
        "find": "strings",
        "filter": { "str": "foo" },
        "collation": { "locale": "simple" },
    }));
    assert_eq!(binary, vec![doc! { "_id": 1, "str": "foo" }]);

    let count = run(&db, doc! { "count": "strings", "query": { "str": "FOO" } });
    assert_eq!(count.get_i32("n").unwrap(), 2);

    let distinct = run(&db, doc! { "distinct": "strings", "key": "str" });
    assert_eq!(distinct.get_array("values").unwrap().len(), 2);
}

#[test]
fn sorted_find_with_huge_skip_and_limit() {
    let db = seeded();
    let past_the_end = first_batch(&run(&db, doc! {
        "find": "strings",
        "sort": { "str": 1 },
        "skip": i64::MAX,
        "limit": i64::MAX,
    }));
    assert!(past_the_end.is_empty());

    let everything = first_batch(&run(&db, doc! {
        "find": "strings",
        "sort": { "_id": 1 },
        "skip": 0,
        "limit": i64::MAX,
    }));
    assert_eq!(everything.len(), 3);
}

#[test]
fn aggregate_returns_a_cursor() {
    let db = seeded();
    let reply = run(&db, doc! {
        "aggregate": "strings",
        "pipeline": [{ "$match": { "str": "foo" } }, { "$count": "n" }],
        "cursor": {},
    });
    assert_eq!(first_batch(&reply), vec![doc! { "n": 2 }]);
}

#[test]
fn explain_command_defaults_to_all_plans_execution() {
    let db = seeded();
    run(&db, doc! { "createIndexes": "strings", "indexes": [{ "key": { "str": 1 }, "name": "str_1" }] });

    let reply = run(&db, doc! { "explain": { "find": "strings", "filter": { "str": "foo" } } });
    assert_eq!(tessera_db::explain::plan_stages(&reply), vec!["FETCH", "IXSCAN"]);
    assert_eq!(
        reply.get_document("executionStats").unwrap().get_i64("nReturned").unwrap(),
        2
    );

    let planner_only = run(&db, doc! {
        "explain": { "count": "strings", "query": { "str": "foo" } },
        "verbosity": "queryPlanner",
    });
    assert!(planner_only.get("executionStats").is_none());

    let multi = db.run_command(&doc! {
        "explain": {
            "delete": "strings",
            "deletes": [{ "q": {}, "limit": 0 }, { "q": {}, "limit": 0 }],
        },
    });
    assert_eq!(multi.get_i32("code").unwrap(), 72);
}

// ── Writes ──────────────────────────────────────────────────────

#[test]
fn insert_reports_write_errors() {
    let db = seeded();
    let reply = run(&db, doc! {
        "insert": "strings",
        "documents": [{ "_id": 4 }, { "_id": 1 }, { "_id": 5 }],
        "ordered": false,
    });
    assert_eq!(reply.get_i32("n").unwrap(), 2);
    let errors = reply.get_array("writeErrors").unwrap();
    assert_eq!(errors.len(), 1);
    let error = errors[0].as_document().unwrap();
    assert_eq!(error.get_i32("index").unwrap(), 1);
    assert_eq!(error.get_i32("code").unwrap(), 11000);
}

#[test]
fn update_reports_upserts() {
    let db = seeded();
    let reply = run(&db, doc! {
        "update": "strings",
        "updates": [
            { "q": { "str": "foo" }, "u": { "$set": { "seen": true } }, "multi": true },
            { "q": { "_id": 9 }, "u": { "$set": { "str": "new" } }, "upsert": true },
        ],
    });
    assert_eq!(reply.get_i32("n").unwrap(), 3);
    assert_eq!(reply.get_i32("nModified").unwrap(), 2);
    let upserted = reply.get_array("upserted").unwrap();
    assert_eq!(
        upserted[0].as_document().unwrap(),
        &doc! { "index": 1, "_id": 9 }
    );
}

#[test]
fn delete_honors_statement_collation() {
    let db = seeded();
    let reply = run(&db, doc! {
        "delete": "strings",
        "deletes": [{ "q": { "str": "FOO" }, "limit": 0, "collation": { "locale": "simple" } }],
    });
    assert_eq!(reply.get_i32("n").unwrap(), 1);
    let left = first_batch(&run(&db, doc! { "find": "strings", "sort": { "_id": 1 } }));
    assert_eq!(strs(&left, "str"), vec!["foo", "bar"]);
}

#[test]
fn find_and_modify_reply() {
    let db = seeded();
    let reply = run(&db, doc! {
        "findAndModify": "strings",
        "query": { "str": "BAR" },
        "update": { "$set": { "n": 1 } },
        "new": true,
    });
    let last = reply.get_document("lastErrorObject").unwrap();
    assert_eq!(last.get_i32("n").unwrap(), 1);
    assert!(last.get_bool("updatedExisting").unwrap());
    assert_eq!(
        reply.get_document("value").unwrap(),
        &doc! { "_id": 3, "str": "bar", "n": 1 }
    );

    let missing = run(&db, doc! {
        "findAndModify": "strings",
        "query": { "str": "nothing" },
        "remove": true,
    });
    assert_eq!(missing.get("value"), Some(&Bson::Null));
}
