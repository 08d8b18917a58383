mod eval;

pub(crate) use eval::{matches, sort_value};
