use crate::executor::{Row, StageStats};

pub(crate) fn skip(n: u64, (source, child): (Vec<Row>, StageStats)) -> (Vec<Row>, StageStats) {
    let n = usize::try_from(n).unwrap_or(usize::MAX);
    let rows = source.into_iter().skip(n).collect();
    (rows, StageStats::with_child(child))
}

pub(crate) fn limit(n: u64, (source, child): (Vec<Row>, StageStats)) -> (Vec<Row>, StageStats) {
    let n = usize::try_from(n).unwrap_or(usize::MAX);
    let rows = source.into_iter().take(n).collect();
    (rows, StageStats::with_child(child))
}

/// Documents an update or delete would touch; single-document writes
/// stop at the first.
pub(crate) fn write_targets(multi: bool, (mut source, child): (Vec<Row>, StageStats)) -> (Vec<Row>, StageStats) {
    if !multi {
        source.truncate(1);
    }
    (source, StageStats::with_child(child))
}
