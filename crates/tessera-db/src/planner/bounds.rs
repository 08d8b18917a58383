//! Index bounds: per-field interval lists derived from predicates.
//!
//! Intervals are kept in ascending value order under the index collation;
//! descending key fields and backward scans only change how they render
//! and the order they are walked in.

use std::cmp::Ordering;

use bson::oid::ObjectId;
use bson::{Bson, DateTime, Document};
use tessera_collation::Collator;
use tessera_query::value::{canonical_type_order, compare_values};
use tessera_query::{Expression, KeyKind, KeyPattern};

const STRING_TYPE: u8 = 15;

#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    pub low: Bson,
    pub low_inclusive: bool,
    pub high: Bson,
    pub high_inclusive: bool,
}

impl Interval {
    /// `[MinKey, MaxKey]`
    pub fn all() -> Self {
        Interval {
            low: Bson::MinKey,
            low_inclusive: true,
            high: Bson::MaxKey,
            high_inclusive: true,
        }
    }

    pub fn point(value: Bson) -> Self {
        Interval {
            low: value.clone(),
            low_inclusive: true,
            high: value,
            high_inclusive: true,
        }
    }

    pub fn is_point(&self) -> bool {
        self.low_inclusive && self.high_inclusive && self.low == self.high
    }

    pub fn is_all(&self) -> bool {
        matches!(self.low, Bson::MinKey) && matches!(self.high, Bson::MaxKey)
    }

    pub fn contains(&self, value: &Bson, collator: Option<&Collator>) -> bool {
        let above = match compare_values(value, &self.low, collator) {
            Ordering::Greater => true,
            Ordering::Equal => self.low_inclusive,
            Ordering::Less => false,
        };
        let below = match compare_values(value, &self.high, collator) {
            Ordering::Less => true,
            Ordering::Equal => self.high_inclusive,
            Ordering::Greater => false,
        };
        above && below
    }

    /// Whether any string value could fall inside the interval.
    pub fn may_contain_strings(&self) -> bool {
        let low = canonical_type_order(&self.low);
        let high = canonical_type_order(&self.high);
        low <= STRING_TYPE && high >= STRING_TYPE
    }

    fn is_empty(&self, collator: Option<&Collator>) -> bool {
        match compare_values(&self.low, &self.high, collator) {
            Ordering::Greater => true,
            Ordering::Equal => !(self.low_inclusive && self.high_inclusive),
            Ordering::Less => false,
        }
    }

    fn intersect(&self, other: &Interval, collator: Option<&Collator>) -> Option<Interval> {
        let (low, low_inclusive) = match compare_values(&self.low, &other.low, collator) {
            Ordering::Greater => (&self.low, self.low_inclusive),
            Ordering::Less => (&other.low, other.low_inclusive),
            Ordering::Equal => (&self.low, self.low_inclusive && other.low_inclusive),
        };
        let (high, high_inclusive) = match compare_values(&self.high, &other.high, collator) {
            Ordering::Less => (&self.high, self.high_inclusive),
            Ordering::Greater => (&other.high, other.high_inclusive),
            Ordering::Equal => (&self.high, self.high_inclusive && other.high_inclusive),
        };
        let out = Interval {
            low: low.clone(),
            low_inclusive,
            high: high.clone(),
            high_inclusive,
        };
        (!out.is_empty(collator)).then_some(out)
    }

    /// Render as `[low, high)`, walking from high to low when `reversed`.
    pub fn render(&self, reversed: bool) -> String {
        if reversed {
            format!(
                "{}{}, {}{}",
                if self.high_inclusive { '[' } else { '(' },
                render_value(&self.high),
                render_value(&self.low),
                if self.low_inclusive { ']' } else { ')' },
            )
        } else {
            format!(
                "{}{}, {}{}",
                if self.low_inclusive { '[' } else { '(' },
                render_value(&self.low),
                render_value(&self.high),
                if self.high_inclusive { ']' } else { ')' },
            )
        }
    }
}

pub(crate) fn render_value(value: &Bson) -> String {
    match value {
        Bson::MinKey => "MinKey".into(),
        Bson::MaxKey => "MaxKey".into(),
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => {
            let f = tessera_query::value::as_f64(value).unwrap_or(f64::NAN);
            if f.is_infinite() {
                if f > 0.0 { "inf.0".into() } else { "-inf.0".into() }
            } else {
                format!("{f:?}")
            }
        }
        Bson::String(s) => format!("\"{s}\""),
        Bson::Undefined => "undefined".into(),
        other => other.to_string(),
    }
}

/// Sorted, non-overlapping intervals for one key field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldBounds {
    pub field: String,
    pub intervals: Vec<Interval>,
}

impl FieldBounds {
    pub fn is_all(&self) -> bool {
        self.intervals.len() == 1 && self.intervals[0].is_all()
    }

    pub fn is_point(&self) -> bool {
        self.intervals.len() == 1 && self.intervals[0].is_point()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexBounds {
    pub fields: Vec<FieldBounds>,
}

impl IndexBounds {
    /// `[MinKey, MaxKey]` on every field.
    pub fn full(pattern: &KeyPattern) -> Self {
        IndexBounds {
            fields: pattern
                .field_names()
                .map(|f| FieldBounds {
                    field: f.to_string(),
                    intervals: vec![Interval::all()],
                })
                .collect(),
        }
    }

    /// Whether a stored key tuple lies inside every field's intervals.
    pub fn contains(&self, values: &[Bson], collator: Option<&Collator>) -> bool {
        self.fields.iter().zip(values).all(|(bounds, value)| {
            bounds.intervals.iter().any(|i| i.contains(value, collator))
        })
    }

    /// One contiguous key range: points on a prefix, then at most one range,
    /// then unconstrained fields.
    pub fn is_single_range(&self) -> bool {
        let mut open = false;
        for field in &self.fields {
            if field.intervals.len() != 1 {
                return false;
            }
            if open && !field.is_all() {
                return false;
            }
            if !field.is_point() {
                open = true;
            }
        }
        true
    }

    /// Number of leading fields pinned to a single value.
    pub fn equality_prefix(&self) -> usize {
        self.fields.iter().take_while(|f| f.is_point()).count()
    }

    pub fn to_document(&self, pattern: &KeyPattern, backward: bool) -> Document {
        let mut out = Document::new();
        for (bounds, key) in self.fields.iter().zip(pattern.fields()) {
            let reversed = (key.kind == KeyKind::Descending) != backward;
            let mut rendered: Vec<Bson> = bounds
                .intervals
                .iter()
                .map(|i| Bson::String(i.render(reversed)))
                .collect();
            if reversed {
                rendered.reverse();
            }
            out.insert(bounds.field.clone(), rendered);
        }
        out
    }
}

/// Intervals a single predicate constrains its field to, and whether they
/// answer it exactly. `None` when an index cannot serve the predicate.
pub(crate) fn predicate_bounds(expr: &Expression) -> Option<(Vec<Interval>, bool)> {
    match expr {
        Expression::Eq(_, value) => point_bounds(value),
        Expression::In(_, values) => {
            let mut intervals = Vec::with_capacity(values.len());
            let mut exact = true;
            for value in values {
                let (mut found, value_exact) = point_bounds(value)?;
                exact &= value_exact;
                intervals.append(&mut found);
            }
            if intervals.is_empty() {
                return None;
            }
            Some((intervals, exact))
        }
        Expression::Gt(_, value) | Expression::Gte(_, value) => {
            let inclusive = matches!(expr, Expression::Gte(..));
            if matches!(value, Bson::Null) {
                return inclusive.then(|| (vec![Interval::point(Bson::Null)], false));
            }
            let (_, high, high_inclusive) = type_bracket(value)?;
            Some((
                vec![Interval {
                    low: value.clone(),
                    low_inclusive: inclusive,
                    high,
                    high_inclusive,
                }],
                true,
            ))
        }
        Expression::Lt(_, value) | Expression::Lte(_, value) => {
            let inclusive = matches!(expr, Expression::Lte(..));
            if matches!(value, Bson::Null) {
                return inclusive.then(|| (vec![Interval::point(Bson::Null)], false));
            }
            let (low, _, _) = type_bracket(value)?;
            Some((
                vec![Interval {
                    low,
                    low_inclusive: true,
                    high: value.clone(),
                    high_inclusive: inclusive,
                }],
                true,
            ))
        }
        Expression::Exists(_, true) => Some((vec![Interval::all()], false)),
        Expression::Exists(_, false) => Some((vec![Interval::point(Bson::Null)], false)),
        _ => None,
    }
}

fn point_bounds(value: &Bson) -> Option<(Vec<Interval>, bool)> {
    match value {
        Bson::Array(_) | Bson::RegularExpression(_) => None,
        // null also matches missing fields and empty arrays
        Bson::Null => Some((
            vec![Interval::point(Bson::Undefined), Interval::point(Bson::Null)],
            false,
        )),
        v => Some((vec![Interval::point(v.clone())], true)),
    }
}

/// Lowest and highest values of a value's type bracket, and whether the
/// upper end is inclusive.
fn type_bracket(value: &Bson) -> Option<(Bson, Bson, bool)> {
    match value {
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => Some((
            Bson::Double(f64::NEG_INFINITY),
            Bson::Double(f64::INFINITY),
            true,
        )),
        Bson::String(_) | Bson::Symbol(_) => Some((
            Bson::String(String::new()),
            Bson::Document(Document::new()),
            false,
        )),
        Bson::DateTime(_) => Some((
            Bson::DateTime(DateTime::from_millis(i64::MIN)),
            Bson::DateTime(DateTime::from_millis(i64::MAX)),
            true,
        )),
        Bson::Boolean(_) => Some((Bson::Boolean(false), Bson::Boolean(true), true)),
        Bson::ObjectId(_) => Some((
            Bson::ObjectId(ObjectId::from_bytes([0; 12])),
            Bson::ObjectId(ObjectId::from_bytes([0xFF; 12])),
            true,
        )),
        _ => None,
    }
}

/// Sort and merge overlapping intervals.
pub(crate) fn normalize(mut intervals: Vec<Interval>, collator: Option<&Collator>) -> Vec<Interval> {
    intervals.retain(|i| !i.is_empty(collator));
    intervals.sort_by(|a, b| {
        compare_values(&a.low, &b.low, collator)
            .then_with(|| b.low_inclusive.cmp(&a.low_inclusive))
    });
    let mut out: Vec<Interval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        if let Some(last) = out.last_mut() {
            let touches = match compare_values(&interval.low, &last.high, collator) {
                Ordering::Less => true,
                Ordering::Equal => interval.low_inclusive || last.high_inclusive,
                Ordering::Greater => false,
            };
            if touches {
                match compare_values(&interval.high, &last.high, collator) {
                    Ordering::Greater => {
                        last.high = interval.high;
                        last.high_inclusive = interval.high_inclusive;
                    }
                    Ordering::Equal => last.high_inclusive |= interval.high_inclusive,
                    Ordering::Less => {}
                }
                continue;
            }
        }
        out.push(interval);
    }
    out
}

/// Intersect two normalized interval lists.
pub(crate) fn intersect(a: &[Interval], b: &[Interval], collator: Option<&Collator>) -> Vec<Interval> {
    let mut out = Vec::new();
    for x in a {
        for y in b {
            if let Some(i) = x.intersect(y, collator) {
                out.push(i);
            }
        }
    }
    normalize(out, collator)
}
