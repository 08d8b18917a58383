mod common;
use common::*;

use bson::{Bson, doc};
use tessera_db::{
    DeleteStatement, FindAndModifyQuery, FindQuery, UpdateStatement, WriteModel,
};

fn all(db: &tessera_db::Database) -> Vec<bson::Document> {
    find(
        db,
        COLLECTION,
        &FindQuery {
            sort: Some(doc! { "_id": 1 }),
            ..Default::default()
        },
    )
}

// ── Update ──────────────────────────────────────────────────────

#[test]
fn update_matches_under_collation() {
    let db = temp_db();
    create_collection(&db, COLLECTION, None);
    seed_strings(&db, &["foo", "FOO", "bar"]);

    let mut txn = db.begin(false).unwrap();
    let result = txn
        .update(
            COLLECTION,
            &UpdateStatement {
                filter: doc! { "str": "foo" },
                update: doc! { "$set": { "hit": true } },
                multi: true,
                collation: Some(en_us_2().into()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(result.matched, 2);
    assert_eq!(result.modified, 2);

    let single = txn
        .update(
            COLLECTION,
            &UpdateStatement {
                filter: doc! { "str": "foo" },
                update: doc! { "$inc": { "n": 1 } },
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(single.matched, 1);
    txn.commit().unwrap();

    let docs = all(&db);
    assert!(docs[0].get_bool("hit").unwrap());
    assert!(docs[1].get_bool("hit").unwrap());
    assert!(docs[2].get("hit").is_none());
    assert_eq!(docs[0].get_i32("n").unwrap(), 1);
}

#[test]
fn unchanged_documents_are_not_modified() {
    let db = temp_db();
    create_collection(&db, COLLECTION, None);
    insert(&db, COLLECTION, vec![doc! { "_id": 1, "a": 1 }]);
    let mut txn = db.begin(false).unwrap();
    let result = txn
        .update(
            COLLECTION,
            &UpdateStatement {
                filter: doc! { "_id": 1 },
                update: doc! { "$set": { "a": 1 } },
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!((result.matched, result.modified), (1, 0));
}

#[test]
fn upsert_inserts_seeded_document() {
    let db = temp_db();
    create_collection(&db, COLLECTION, None);
    let mut txn = db.begin(false).unwrap();
    let result = txn
        .update(
            COLLECTION,
            &UpdateStatement {
                filter: doc! { "str": "x" },
                update: doc! { "$set": { "n": 1 }, "$setOnInsert": { "created": true } },
                upsert: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert!(result.upserted_id.is_some());
    txn.commit().unwrap();

    let docs = all(&db);
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].get_str("str").unwrap(), "x");
    assert_eq!(docs[0].get_i32("n").unwrap(), 1);
    assert!(docs[0].get_bool("created").unwrap());
}

#[test]
fn replacement_rules() {
    let db = temp_db();
    create_collection(&db, COLLECTION, None);
    insert(&db, COLLECTION, vec![doc! { "_id": 1, "a": 1 }]);
    let mut txn = db.begin(false).unwrap();

    let multi = UpdateStatement {
        filter: doc! {},
        update: doc! { "b": 2 },
        multi: true,
        ..Default::default()
    };
    assert_eq!(txn.update(COLLECTION, &multi).unwrap_err().code().code(), 9);

    let change_id = UpdateStatement {
        filter: doc! { "_id": 1 },
        update: doc! { "_id": 2, "b": 2 },
        ..Default::default()
    };
    assert_eq!(txn.update(COLLECTION, &change_id).unwrap_err().code().code(), 66);

    let replace = UpdateStatement {
        filter: doc! { "_id": 1 },
        update: doc! { "b": 2 },
        ..Default::default()
    };
    txn.update(COLLECTION, &replace).unwrap();
    txn.commit().unwrap();
    assert_eq!(all(&db), vec![doc! { "_id": 1, "b": 2 }]);
}

// ── Delete ──────────────────────────────────────────────────────

#[test]
fn delete_under_collection_default() {
    let db = temp_db();
    create_collection(&db, COLLECTION, Some(en_us_2()));
    seed_strings(&db, &["foo", "FOO", "bar"]);

    let mut txn = db.begin(false).unwrap();
    let one = txn
        .delete(
            COLLECTION,
            &DeleteStatement {
                filter: doc! { "str": "FOO" },
                multi: false,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(one.deleted, 1);
    let rest = txn
        .delete(
            COLLECTION,
            &DeleteStatement {
                filter: doc! { "str": "FOO" },
                multi: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(rest.deleted, 1);
    txn.commit().unwrap();
    assert_eq!(strs(&all(&db), "str"), vec!["bar"]);
}

#[test]
fn delete_on_missing_collection_is_a_no_op() {
    let db = temp_db();
    let mut txn = db.begin(false).unwrap();
    let result = txn
        .delete("absent", &DeleteStatement {
            multi: true,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(result.deleted, 0);
}

// ── Find and modify ─────────────────────────────────────────────

#[test]
fn find_and_modify_sorts_under_collation() {
    let db = temp_db();
    create_collection(&db, COLLECTION, None);
    seed_strings(&db, &["b", "A", "a", "B"]);

    let mut txn = db.begin(false).unwrap();
    let removed = txn
        .find_and_modify(
            COLLECTION,
            &FindAndModifyQuery {
                sort: Some(doc! { "str": 1 }),
                remove: true,
                collation: Some(doc! { "locale": "en_US" }.into()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(removed.value.unwrap().get_str("str").unwrap(), "a");

    let binary = txn
        .find_and_modify(
            COLLECTION,
            &FindAndModifyQuery {
                sort: Some(doc! { "str": 1 }),
                update: Some(doc! { "$set": { "first": true } }),
                new: true,
                fields: Some(doc! { "_id": 0 }),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(binary.updated_existing);
    assert_eq!(binary.value.unwrap(), doc! { "str": "A", "first": true });
}

#[test]
fn find_and_modify_upsert_and_validation() {
    let db = temp_db();
    let mut txn = db.begin(false).unwrap();
    let result = txn
        .find_and_modify(
            COLLECTION,
            &FindAndModifyQuery {
                filter: doc! { "_id": "k" },
                update: Some(doc! { "$inc": { "n": 1 } }),
                upsert: true,
                new: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(result.upserted_id, Some(Bson::String("k".into())));
    assert_eq!(result.value.unwrap(), doc! { "_id": "k", "n": 1 });

    let both = FindAndModifyQuery {
        update: Some(doc! { "$set": { "a": 1 } }),
        remove: true,
        ..Default::default()
    };
    assert_eq!(txn.find_and_modify(COLLECTION, &both).unwrap_err().code().code(), 2);
    let neither = FindAndModifyQuery::default();
    assert_eq!(txn.find_and_modify(COLLECTION, &neither).unwrap_err().code().code(), 9);
}

// ── Bulk write ──────────────────────────────────────────────────

#[test]
fn bulk_statements_use_their_own_collation() {
    let db = temp_db();
    create_collection(&db, COLLECTION, None);
    seed_strings(&db, &["foo", "FOO", "bar"]);

    let models = vec![
        WriteModel::Update(UpdateStatement {
            filter: doc! { "str": "foo" },
            update: doc! { "$set": { "tag": 1 } },
            multi: true,
            collation: Some(en_us_2().into()),
            ..Default::default()
        }),
        WriteModel::Update(UpdateStatement {
            filter: doc! { "str": "foo" },
            update: doc! { "$set": { "tag": 2 } },
            multi: true,
            ..Default::default()
        }),
        WriteModel::Delete(DeleteStatement {
            filter: doc! { "str": "BAR" },
            multi: true,
            ..Default::default()
        }),
        WriteModel::Delete(DeleteStatement {
            filter: doc! { "str": "BAR" },
            multi: true,
            collation: Some(en_us_2().into()),
            ..Default::default()
        }),
    ];
    let mut txn = db.begin(false).unwrap();
    let result = txn.bulk_write(COLLECTION, &models, true).unwrap();
    txn.commit().unwrap();

    assert_eq!(result.matched, 3);
    assert_eq!(result.modified, 3);
    assert_eq!(result.deleted, 1);
    assert!(result.write_errors.is_empty());

    let docs = all(&db);
    let tags: Vec<i32> = docs.iter().map(|d| d.get_i32("tag").unwrap()).collect();
    assert_eq!(tags, vec![2, 1]);
}

#[test]
fn ordered_bulk_stops_at_first_error() {
    let models = vec![
        WriteModel::Insert(doc! { "_id": 1 }),
        WriteModel::Insert(doc! { "_id": 1 }),
        WriteModel::Insert(doc! { "_id": 2 }),
    ];

    let db = temp_db();
    let mut txn = db.begin(false).unwrap();
    let ordered = txn.bulk_write(COLLECTION, &models, true).unwrap();
    assert_eq!(ordered.inserted, 1);
    assert_eq!(ordered.write_errors.len(), 1);
    assert_eq!(ordered.write_errors[0].index, 1);
    assert_eq!(ordered.write_errors[0].code, 11000);

    let db = temp_db();
    let mut txn = db.begin(false).unwrap();
    let unordered = txn.bulk_write(COLLECTION, &models, false).unwrap();
    assert_eq!(unordered.inserted, 2);
    assert_eq!(unordered.write_errors.len(), 1);
}
