use std::cmp::Ordering;

use bson::{Bson, Document};
use tessera_collation::Collator;
use tessera_query::Expression;
use tessera_query::path::{self, PathValue};
use tessera_query::value::{canonical_type_order, compare_values};
use tessera_query::SortDirection;

/// Evaluate whether a document matches the given expression under `collator`.
pub(crate) fn matches(doc: &Document, expr: &Expression, collator: Option<&Collator>) -> bool {
    match expr {
        Expression::And(children) => children.iter().all(|c| matches(doc, c, collator)),
        Expression::Or(children) => children.iter().any(|c| matches(doc, c, collator)),
        Expression::Nor(children) => !children.iter().any(|c| matches(doc, c, collator)),
        Expression::Eq(field, val) => field_eq(doc, field, val, collator),
        Expression::Ne(field, val) => !field_eq(doc, field, val, collator),
        Expression::In(field, vals) => vals.iter().any(|v| field_eq(doc, field, v, collator)),
        Expression::Nin(field, vals) => !vals.iter().any(|v| field_eq(doc, field, v, collator)),
        Expression::Gt(field, val)
        | Expression::Gte(field, val)
        | Expression::Lt(field, val)
        | Expression::Lte(field, val) => {
            let predicate: fn(Ordering) -> bool = match expr {
                Expression::Gt(..) => |o| o == Ordering::Greater,
                Expression::Gte(..) => |o| o != Ordering::Less,
                Expression::Lt(..) => |o| o == Ordering::Less,
                _ => |o| o != Ordering::Greater,
            };
            // null bounds admit missing fields on the inclusive operators
            if matches!(val, Bson::Null)
                && matches!(expr, Expression::Gte(..) | Expression::Lte(..))
                && path::lookup(doc, field)
                    .iter()
                    .any(|v| matches!(v, PathValue::Missing))
            {
                return true;
            }
            candidates(doc, field).into_iter().any(|candidate| {
                comparable(candidate, val)
                    && predicate(compare_values(candidate, val, collator))
            })
        }
        Expression::Regex(field, re) => candidates(doc, field).into_iter().any(|v| match v {
            Bson::String(s) | Bson::Symbol(s) => re.is_match(s),
            _ => false,
        }),
        Expression::Exists(field, expected) => {
            let present = path::lookup(doc, field)
                .iter()
                .any(|v| matches!(v, PathValue::Found(_)));
            present == *expected
        }
    }
}

/// Values a predicate on `field` is tested against: each value found at the
/// path, plus the elements of any array found there.
fn candidates<'a>(doc: &'a Document, field: &str) -> Vec<&'a Bson> {
    let mut out = Vec::new();
    for found in path::lookup(doc, field) {
        if let PathValue::Found(value) = found {
            out.push(value);
            if let Bson::Array(items) = value {
                out.extend(items.iter());
            }
        }
    }
    out
}

fn field_eq(doc: &Document, field: &str, val: &Bson, collator: Option<&Collator>) -> bool {
    let found = path::lookup(doc, field);
    // $eq: null matches both missing fields and explicit null values
    if matches!(val, Bson::Null)
        && (found.is_empty() || found.iter().any(|v| matches!(v, PathValue::Missing)))
    {
        return true;
    }
    candidates(doc, field)
        .into_iter()
        .any(|candidate| comparable(candidate, val) && compare_values(candidate, val, collator) == Ordering::Equal)
}

/// Comparisons only hold within a type bracket; MinKey and MaxKey bound every type.
fn comparable(a: &Bson, b: &Bson) -> bool {
    matches!(b, Bson::MinKey | Bson::MaxKey) || canonical_type_order(a) == canonical_type_order(b)
}

/// The value a document sorts by on `field`: arrays sort by their smallest
/// element ascending and largest descending; missing fields sort as null.
pub(crate) fn sort_value(
    doc: &Document,
    field: &str,
    direction: SortDirection,
    collator: Option<&Collator>,
) -> Bson {
    let mut best: Option<&Bson> = None;
    for found in path::lookup(doc, field) {
        let values: Vec<&Bson> = match found {
            PathValue::Found(Bson::Array(items)) if !items.is_empty() => items.iter().collect(),
            PathValue::Found(Bson::Array(_)) => vec![&Bson::Undefined],
            PathValue::Found(v) => vec![v],
            PathValue::Missing => vec![&Bson::Null],
        };
        for v in values {
            best = match best {
                None => Some(v),
                Some(current) => {
                    let ord = compare_values(v, current, collator);
                    let better = match direction {
                        SortDirection::Asc => ord == Ordering::Less,
                        SortDirection::Desc => ord == Ordering::Greater,
                    };
                    Some(if better { v } else { current })
                }
            };
        }
    }
    best.cloned().unwrap_or(Bson::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use tessera_collation::parse_collation;
    use tessera_query::parse_filter;

    fn case_insensitive() -> Collator {
        Collator::new(
            parse_collation(&doc! { "locale": "en_US", "strength": 2 }.into())
                .unwrap()
                .unwrap(),
        )
        .unwrap()
    }

    fn check(doc: &Document, filter: Document, collator: Option<&Collator>) -> bool {
        matches(doc, &parse_filter(&filter).unwrap(), collator)
    }

    #[test]
    fn equality_under_collation() {
        let c = case_insensitive();
        let d = doc! { "str": "foo" };
        assert!(check(&d, doc! { "str": "FOO" }, Some(&c)));
        assert!(!check(&d, doc! { "str": "FOO" }, None));
        assert!(check(&d, doc! { "str": { "$ne": "FOO" } }, None));
        assert!(!check(&d, doc! { "str": { "$ne": "FOO" } }, Some(&c)));
    }

    #[test]
    fn ranges_are_type_bracketed() {
        let d = doc! { "a": "x" };
        assert!(!check(&d, doc! { "a": { "$gt": 3 } }, None));
        assert!(check(&d, doc! { "a": { "$gt": "w" } }, None));
        assert!(check(&doc! { "a": 5 }, doc! { "a": { "$gt": 3 } }, None));
        assert!(check(&doc! { "a": 5 }, doc! { "a": { "$gt": Bson::MinKey } }, None));
    }

    #[test]
    fn array_elements_match() {
        let d = doc! { "tags": ["a", "B"] };
        assert!(check(&d, doc! { "tags": "a" }, None));
        assert!(check(&d, doc! { "tags": "b" }, Some(&case_insensitive())));
        assert!(check(&d, doc! { "tags": ["a", "B"] }, None));
        assert!(check(&d, doc! { "tags": { "$in": ["z", "B"] } }, None));
    }

    #[test]
    fn null_matches_missing() {
        assert!(check(&doc! { "b": 1 }, doc! { "a": Bson::Null }, None));
        assert!(check(&doc! { "a": Bson::Null }, doc! { "a": Bson::Null }, None));
        assert!(!check(&doc! { "a": 1 }, doc! { "a": Bson::Null }, None));
    }

    #[test]
    fn exists_and_regex() {
        let d = doc! { "a": "hello" };
        assert!(check(&d, doc! { "a": { "$exists": true } }, None));
        assert!(check(&d, doc! { "b": { "$exists": false } }, None));
        assert!(check(&d, doc! { "a": { "$regex": "^he" } }, None));
        assert!(!check(&d, doc! { "a": { "$regex": "^HE" } }, None));
    }

    #[test]
    fn sort_value_uses_array_extremes() {
        let d = doc! { "a": [3, 1, 2] };
        assert_eq!(sort_value(&d, "a", SortDirection::Asc, None), Bson::Int32(1));
        assert_eq!(sort_value(&d, "a", SortDirection::Desc, None), Bson::Int32(3));
        assert_eq!(sort_value(&doc! {}, "a", SortDirection::Asc, None), Bson::Null);
    }
}
