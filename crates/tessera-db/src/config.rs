use serde::{Deserialize, Serialize};
use tessera_collation::COLLATOR_VERSION;

/// Naming scheme for fast-path and fetching-distinct explain stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageNaming {
    /// `EXPRESS_IXSCAN`, `EXPRESS_UPDATE`, `EXPRESS_DELETE`; fetching
    /// distinct scans carry an `isFetching` flag.
    #[default]
    Express,
    /// `IDHACK` under `UPDATE`/`DELETE`; fetching distinct scans sit under
    /// a separate `FETCH` stage.
    Classic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database name used in explain namespaces.
    pub name: String,
    pub stage_naming: StageNaming,
    /// Comparison-table revision collations are validated against.
    pub collator_version: String,
    /// Upper bound on documents buffered by a blocking sort.
    pub max_sort_documents: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: "test".to_string(),
            stage_naming: StageNaming::default(),
            collator_version: COLLATOR_VERSION.to_string(),
            max_sort_documents: 100_000,
        }
    }
}
