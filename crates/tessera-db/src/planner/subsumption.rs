//! Syntactic implication between a partial index filter and a query.

use std::cmp::Ordering;

use bson::Bson;
use tessera_collation::{Collator, collators_match};
use tessera_query::Expression;
use tessera_query::value::{canonical_type_order, compare_values, is_collatable};

/// Whether every document matching `query` also matches `filter`.
///
/// The filter is evaluated under the index collation. A query conjunct on
/// a collatable value only implies the filter when both collations agree,
/// or when it is a simple-collation point: that value is then the only one
/// it matches. A string range under another collation covers strings the
/// index collation orders differently.
pub(crate) fn subsumes(
    filter: &Expression,
    query: &[Expression],
    index_collator: Option<&Collator>,
    query_collator: Option<&Collator>,
) -> bool {
    match filter {
        Expression::And(children) => children
            .iter()
            .all(|c| subsumes(c, query, index_collator, query_collator)),
        leaf => query.iter().any(|q| {
            let comparable_collation = collators_match(index_collator, query_collator)
                || !query_value_collatable(q)
                || (query_collator.is_none() && is_point(q));
            comparable_collation && implies(q, leaf, index_collator)
        }),
    }
}

fn is_point(expr: &Expression) -> bool {
    matches!(expr, Expression::Eq(..) | Expression::In(..))
}

fn query_value_collatable(expr: &Expression) -> bool {
    match expr {
        Expression::Eq(_, v)
        | Expression::Gt(_, v)
        | Expression::Gte(_, v)
        | Expression::Lt(_, v)
        | Expression::Lte(_, v) => is_collatable(v),
        Expression::In(_, vs) => vs.iter().any(is_collatable),
        _ => false,
    }
}

/// Single-conjunct implication `q => f` on the same field.
fn implies(q: &Expression, f: &Expression, collator: Option<&Collator>) -> bool {
    if q.field().is_none() || q.field() != f.field() {
        return false;
    }
    match f {
        Expression::Exists(_, true) => excludes_missing(q),
        Expression::Eq(_, target) => match q {
            Expression::Eq(_, v) => same_value(v, target, collator),
            Expression::In(_, vs) => !vs.is_empty() && vs.iter().all(|v| same_value(v, target, collator)),
            _ => false,
        },
        Expression::Gt(_, bound)
        | Expression::Gte(_, bound)
        | Expression::Lt(_, bound)
        | Expression::Lte(_, bound) => {
            let values: Vec<(&Bson, RangeSide)> = match q {
                Expression::Eq(_, v) => vec![(v, RangeSide::Point)],
                Expression::In(_, vs) if !vs.is_empty() => {
                    vs.iter().map(|v| (v, RangeSide::Point)).collect()
                }
                Expression::Gt(_, v) => vec![(v, RangeSide::LowerExclusive)],
                Expression::Gte(_, v) => vec![(v, RangeSide::LowerInclusive)],
                Expression::Lt(_, v) => vec![(v, RangeSide::UpperExclusive)],
                Expression::Lte(_, v) => vec![(v, RangeSide::UpperInclusive)],
                _ => return false,
            };
            values
                .into_iter()
                .all(|(v, side)| within(f, bound, v, side, collator))
        }
        _ => false,
    }
}

#[derive(Clone, Copy)]
enum RangeSide {
    Point,
    LowerInclusive,
    LowerExclusive,
    UpperInclusive,
    UpperExclusive,
}

/// Whether a query constraint `side` at `v` lies inside the filter range.
fn within(f: &Expression, bound: &Bson, v: &Bson, side: RangeSide, collator: Option<&Collator>) -> bool {
    if canonical_type_order(v) != canonical_type_order(bound) {
        return false;
    }
    let ord = compare_values(v, bound, collator);
    match (f, side) {
        (Expression::Gt(..), RangeSide::Point | RangeSide::LowerInclusive) => ord == Ordering::Greater,
        (Expression::Gt(..), RangeSide::LowerExclusive) => ord != Ordering::Less,
        (Expression::Gte(..), RangeSide::Point | RangeSide::LowerInclusive | RangeSide::LowerExclusive) => {
            ord != Ordering::Less
        }
        (Expression::Lt(..), RangeSide::Point | RangeSide::UpperInclusive) => ord == Ordering::Less,
        (Expression::Lt(..), RangeSide::UpperExclusive) => ord != Ordering::Greater,
        (Expression::Lte(..), RangeSide::Point | RangeSide::UpperInclusive | RangeSide::UpperExclusive) => {
            ord != Ordering::Greater
        }
        _ => false,
    }
}

fn same_value(a: &Bson, b: &Bson, collator: Option<&Collator>) -> bool {
    canonical_type_order(a) == canonical_type_order(b) && compare_values(a, b, collator) == Ordering::Equal
}

fn excludes_missing(q: &Expression) -> bool {
    match q {
        Expression::Eq(_, v)
        | Expression::Gt(_, v)
        | Expression::Gte(_, v)
        | Expression::Lt(_, v)
        | Expression::Lte(_, v) => !matches!(v, Bson::Null),
        Expression::In(_, vs) => !vs.is_empty() && !vs.iter().any(|v| matches!(v, Bson::Null)),
        Expression::Exists(_, true) | Expression::Regex(..) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use tessera_collation::parse_collation;
    use tessera_query::parse_filter;

    fn conjuncts(filter: bson::Document) -> Vec<Expression> {
        parse_filter(&filter)
            .unwrap()
            .conjuncts()
            .into_iter()
            .cloned()
            .collect()
    }

    fn check(partial: bson::Document, query: bson::Document) -> bool {
        subsumes(&parse_filter(&partial).unwrap(), &conjuncts(query), None, None)
    }

    #[test]
    fn range_implication() {
        assert!(check(doc! { "a": { "$gte": 10 } }, doc! { "a": { "$gt": 15 } }));
        assert!(check(doc! { "a": { "$gte": 10 } }, doc! { "a": 10 }));
        assert!(check(doc! { "a": { "$gt": 10 } }, doc! { "a": { "$gt": 10 } }));
        assert!(!check(doc! { "a": { "$gt": 10 } }, doc! { "a": { "$gte": 10 } }));
        assert!(!check(doc! { "a": { "$gte": 10 } }, doc! { "a": { "$lt": 15 } }));
        assert!(!check(doc! { "a": { "$gte": 10 } }, doc! { "b": 20 }));
        assert!(check(doc! { "a": { "$lt": 0 } }, doc! { "a": { "$in": [-1, -5] } }));
    }

    #[test]
    fn exists_and_conjunctions() {
        assert!(check(doc! { "a": { "$exists": true } }, doc! { "a": 1, "b": 2 }));
        assert!(!check(doc! { "a": { "$exists": true } }, doc! { "a": Bson::Null }));
        assert!(check(
            doc! { "a": { "$gt": 0 }, "b": { "$exists": true } },
            doc! { "a": 5, "b": "x" }
        ));
        assert!(!check(doc! { "a": { "$gt": 0 }, "b": { "$exists": true } }, doc! { "a": 5 }));
    }

    #[test]
    fn strings_under_mismatched_collation_imply_nothing() {
        let c = Collator::new(
            parse_collation(&doc! { "locale": "en_US", "strength": 2 }.into())
                .unwrap()
                .unwrap(),
        )
        .unwrap();
        let filter = parse_filter(&doc! { "a": "foo" }).unwrap();
        let query = conjuncts(doc! { "a": "FOO" });
        assert!(subsumes(&filter, &query, Some(&c), Some(&c)));
        assert!(!subsumes(&filter, &query, None, Some(&c)));
        assert!(subsumes(&filter, &query, Some(&c), None));
    }

    #[test]
    fn simple_string_range_does_not_imply_a_collated_range() {
        let en = Collator::new(
            parse_collation(&doc! { "locale": "en_US" }.into())
                .unwrap()
                .unwrap(),
        )
        .unwrap();
        let filter = parse_filter(&doc! { "a": { "$gt": "m" } }).unwrap();
        let range = conjuncts(doc! { "a": { "$gt": "n" } });
        assert!(!subsumes(&filter, &range, Some(&en), None));
        assert!(subsumes(&filter, &range, Some(&en), Some(&en)));
        assert!(subsumes(&filter, &conjuncts(doc! { "a": "z" }), Some(&en), None));

        let numeric = parse_filter(&doc! { "n": { "$gt": 5 } }).unwrap();
        assert!(subsumes(&numeric, &conjuncts(doc! { "n": { "$gt": 6 } }), Some(&en), None));
    }
}
