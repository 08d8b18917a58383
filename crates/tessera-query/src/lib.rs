mod error;
mod expression;
mod key_pattern;
pub mod mutation;
mod parse_filter;
pub mod path;
mod projection;
mod query;
mod sort;
pub mod value;

pub use error::QueryError;
pub use expression::Expression;
pub use key_pattern::{KeyField, KeyKind, KeyPattern};
pub use mutation::{UpdateOp, UpdateSpec, parse_update};
pub use parse_filter::parse_filter;
pub use projection::Projection;
pub use query::{
    AggregateQuery, CountQuery, DeleteStatement, DistinctQuery, FindAndModifyQuery, FindQuery,
    Hint, UpdateStatement,
};
pub use sort::{Sort, SortDirection, parse_sort, sort_to_document};
