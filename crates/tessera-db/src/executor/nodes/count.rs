use crate::executor::{Row, StageStats};

pub(crate) fn execute(
    skip: Option<u64>,
    limit: Option<u64>,
    (source, child): (Vec<Row>, StageStats),
) -> (Vec<Row>, StageStats) {
    let mut stats = StageStats::with_child(child);
    let mut n = (source.len() as u64).saturating_sub(skip.unwrap_or(0));
    if let Some(limit) = limit.filter(|l| *l > 0) {
        n = n.min(limit);
    }
    stats.n_counted = n;
    (Vec::new(), stats)
}
