#![allow(dead_code)]

use bson::{Bson, Document, doc};
use tessera_db::explain::plan_stages;
use tessera_db::{
    CollectionConfig, Database, DatabaseConfig, ExplainTarget, FindQuery, IndexSpec, StageNaming,
    Verbosity,
};

pub const COLLECTION: &str = "strings";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn temp_db() -> Database {
    init_tracing();
    Database::open(DatabaseConfig::default())
}

pub fn temp_db_with_naming(stage_naming: StageNaming) -> Database {
    init_tracing();
    Database::open(DatabaseConfig {
        stage_naming,
        ..DatabaseConfig::default()
    })
}

pub fn en_us_2() -> Document {
    doc! { "locale": "en_US", "strength": 2 }
}

pub fn simple() -> Document {
    doc! { "locale": "simple" }
}

pub fn create_collection(db: &Database, name: &str, collation: Option<Document>) {
    let mut config = CollectionConfig::new(name);
    config.collation = collation.map(Bson::Document);
    let mut txn = db.begin(false).unwrap();
    txn.create_collection(&config).unwrap();
    txn.commit().unwrap();
}

pub fn create_index(db: &Database, collection: &str, spec: IndexSpec) -> String {
    let mut txn = db.begin(false).unwrap();
    let name = txn.create_index(collection, &spec).unwrap();
    txn.commit().unwrap();
    name
}

pub fn insert(db: &Database, collection: &str, docs: Vec<Document>) {
    let mut txn = db.begin(false).unwrap();
    txn.insert_many(collection, docs).unwrap();
    txn.commit().unwrap();
}

/// One `{_id, str}` document per value.
pub fn seed_strings(db: &Database, values: &[&str]) {
    let docs = values
        .iter()
        .enumerate()
        .map(|(i, s)| doc! { "_id": i as i32, "str": *s })
        .collect();
    insert(db, COLLECTION, docs);
}

pub fn find(db: &Database, collection: &str, query: &FindQuery) -> Vec<Document> {
    let txn = db.begin(true).unwrap();
    txn.find(collection, query).unwrap()
}

pub fn explain(db: &Database, collection: &str, target: ExplainTarget, verbosity: Verbosity) -> Document {
    let txn = db.begin(true).unwrap();
    txn.explain(collection, &target, verbosity).unwrap()
}

pub fn find_stages(db: &Database, collection: &str, query: FindQuery) -> Vec<String> {
    plan_stages(&explain(db, collection, ExplainTarget::Find(query), Verbosity::QueryPlanner))
}

pub fn strs(docs: &[Document], field: &str) -> Vec<String> {
    docs.iter()
        .map(|d| d.get_str(field).unwrap().to_string())
        .collect()
}

pub fn sorted(mut values: Vec<String>) -> Vec<String> {
    values.sort();
    values
}
