pub(crate) mod count;
pub(crate) mod index_merge;
pub(crate) mod index_scan;
pub(crate) mod limit;
pub(crate) mod projection;
pub(crate) mod read_record;
pub(crate) mod scan;
pub(crate) mod sort;
