//! Total ordering over BSON values, optionally under a string collator.

use std::cmp::Ordering;

use bson::{Bson, Document};
use tessera_collation::Collator;

/// Rank of a value's type in the cross-type sort order.
///
/// Numbers of different widths share a rank and compare by magnitude;
/// strings and symbols share a rank and compare under the collator.
pub fn canonical_type_order(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 1,
        Bson::Undefined => 2,
        Bson::Null => 5,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => 10,
        Bson::Decimal128(_) => 11,
        Bson::String(_) | Bson::Symbol(_) => 15,
        Bson::Document(_) => 20,
        Bson::Array(_) => 25,
        Bson::Binary(_) => 30,
        Bson::ObjectId(_) => 35,
        Bson::Boolean(_) => 40,
        Bson::DateTime(_) => 45,
        Bson::Timestamp(_) => 47,
        Bson::RegularExpression(_) => 50,
        Bson::DbPointer(_) => 55,
        Bson::JavaScriptCode(_) => 60,
        Bson::JavaScriptCodeWithScope(_) => 65,
        Bson::MaxKey => 127,
    }
}

/// Compare two values. `None` compares strings by code point.
pub fn compare_values(a: &Bson, b: &Bson, collator: Option<&Collator>) -> Ordering {
    let (ta, tb) = (canonical_type_order(a), canonical_type_order(b));
    if ta != tb {
        return ta.cmp(&tb);
    }

    match (a, b) {
        (Bson::Int32(_) | Bson::Int64(_), Bson::Int32(_) | Bson::Int64(_)) => {
            as_i64(a).cmp(&as_i64(b))
        }
        (Bson::Int32(_) | Bson::Int64(_), Bson::Double(d)) => compare_int_double(as_i64(a), *d),
        (Bson::Double(d), Bson::Int32(_) | Bson::Int64(_)) => {
            compare_int_double(as_i64(b), *d).reverse()
        }
        (Bson::Double(x), Bson::Double(y)) => compare_f64(*x, *y),
        (Bson::Decimal128(x), Bson::Decimal128(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::String(_) | Bson::Symbol(_), Bson::String(_) | Bson::Symbol(_)) => {
            let (x, y) = (string_of(a), string_of(b));
            match collator {
                Some(c) => c.compare(x, y),
                None => x.cmp(y),
            }
        }
        (Bson::Document(x), Bson::Document(y)) => compare_documents(x, y, collator),
        (Bson::Array(x), Bson::Array(y)) => {
            for (ex, ey) in x.iter().zip(y.iter()) {
                let ord = compare_values(ex, ey, collator);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Bson::Binary(x), Bson::Binary(y)) => x
            .bytes
            .len()
            .cmp(&y.bytes.len())
            .then_with(|| u8::from(x.subtype).cmp(&u8::from(y.subtype)))
            .then_with(|| x.bytes.cmp(&y.bytes)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => {
            x.timestamp_millis().cmp(&y.timestamp_millis())
        }
        (Bson::Timestamp(x), Bson::Timestamp(y)) => {
            (x.time, x.increment).cmp(&(y.time, y.increment))
        }
        (Bson::MinKey, _) | (Bson::MaxKey, _) | (Bson::Null, _) | (Bson::Undefined, _) => {
            Ordering::Equal
        }
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn compare_documents(x: &Document, y: &Document, collator: Option<&Collator>) -> Ordering {
    for ((kx, vx), (ky, vy)) in x.iter().zip(y.iter()) {
        let ord = canonical_type_order(vx)
            .cmp(&canonical_type_order(vy))
            .then_with(|| kx.cmp(ky))
            .then_with(|| compare_values(vx, vy, collator));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    x.len().cmp(&y.len())
}

/// NaN sorts below every other number.
fn compare_f64(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Exact integer against double. Widening the integer would round above 2^53.
fn compare_int_double(n: i64, d: f64) -> Ordering {
    // i64 covers [-2^63, 2^63); both ends are exact doubles.
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
    if d.is_nan() {
        return Ordering::Greater;
    }
    if d >= TWO_POW_63 {
        return Ordering::Less;
    }
    if d < -TWO_POW_63 {
        return Ordering::Greater;
    }
    let whole = d.trunc();
    n.cmp(&(whole as i64))
        .then_with(|| 0.0_f64.partial_cmp(&(d - whole)).unwrap_or(Ordering::Equal))
}

pub fn values_equal(a: &Bson, b: &Bson, collator: Option<&Collator>) -> bool {
    compare_values(a, b, collator) == Ordering::Equal
}

/// True when the value's comparison depends on the collation in effect.
pub fn is_collatable(value: &Bson) -> bool {
    match value {
        Bson::String(_) | Bson::Symbol(_) => true,
        Bson::Document(d) => d.values().any(is_collatable),
        Bson::Array(a) => a.iter().any(is_collatable),
        _ => false,
    }
}

pub fn is_number(value: &Bson) -> bool {
    matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
}

pub fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(d) => Some(*d),
        _ => None,
    }
}

fn as_i64(value: &Bson) -> i64 {
    match value {
        Bson::Int32(n) => i64::from(*n),
        Bson::Int64(n) => *n,
        _ => 0,
    }
}

fn string_of(value: &Bson) -> &str {
    match value {
        Bson::String(s) | Bson::Symbol(s) => s.as_str(),
        _ => "",
    }
}
