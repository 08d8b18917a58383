use std::collections::HashSet;

use crate::executor::{Row, StageStats};

/// Union of the inputs' rows, first occurrence of each record wins.
pub(crate) fn execute(sources: Vec<(Vec<Row>, StageStats)>) -> (Vec<Row>, StageStats) {
    let mut stats = StageStats::default();
    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    for (source, child) in sources {
        stats.children.push(child);
        for row in source {
            if row.rid.is_none_or(|rid| seen.insert(rid)) {
                rows.push(row);
            }
        }
    }
    (rows, stats)
}
