//! Plans for `find` with `min` and/or `max`.
//!
//! The bounds are whole index keys: the scan covers `[min, max)` in key
//! order, the remaining filter is applied after the fetch.

use std::sync::Arc;

use bson::{Bson, Document};
use tessera_collation::collators_match;
use tessera_query::value::is_collatable;
use tracing::debug;

use crate::catalog::IndexDescriptor;
use crate::error::DbError;
use crate::keys::KeyOrder;

use super::PlanningContext;
use super::candidates::{HintTarget, resolve_hint, sort_direction};
use super::finalize::{finish, wrap_op};
use super::plan::{PlanNode, QueryShape, ScanBounds, ScanDirection};

pub(crate) fn plan_min_max(ctx: &PlanningContext<'_>, shape: &QueryShape) -> Result<PlanNode, DbError> {
    let fields = bound_fields(shape)?;
    let index = match resolve_hint(ctx.meta(), shape.hint.as_ref())? {
        HintTarget::Index(index) => {
            if !fields_match(&index, &fields) {
                return Err(DbError::MinMaxIndexMismatch(
                    "The index chosen is not consistent with min/max".into(),
                ));
            }
            index
        }
        HintTarget::Natural(_) => {
            return Err(DbError::BadValue("min and max cannot be used with a $natural hint".into()));
        }
        HintTarget::None => choose_index(ctx, &fields)?,
    };

    let matching = collators_match(index.collator.as_ref(), ctx.collator);
    let collatable = [&shape.min, &shape.max]
        .into_iter()
        .flatten()
        .flat_map(|d| d.values())
        .any(is_collatable);
    if !matching && collatable {
        return Err(DbError::MinMaxIndexMismatch(format!(
            "The index chosen is not consistent with the query collation; index {} cannot serve string bounds under a different collation",
            index.name
        )));
    }

    let pattern = &index.key_pattern;
    let key_values = |doc: &Document| doc.values().cloned().collect::<Vec<Bson>>();
    if let (Some(min), Some(max)) = (&shape.min, &shape.max)
        && KeyOrder::for_index(&index).compare(&key_values(min), &key_values(max)).is_ge()
    {
        return Err(DbError::MinMaxBoundsOrder(
            "max() must be greater than min()".into(),
        ));
    }
    let min = shape
        .min
        .as_ref()
        .map_or_else(|| vec![Bson::MinKey; pattern.len()], key_values);
    let max = shape
        .max
        .as_ref()
        .map_or_else(|| vec![Bson::MaxKey; pattern.len()], key_values);
    debug!(collection = %ctx.meta().name, index = %index.name, "min/max scan");

    let scan = PlanNode::IxScan {
        multikey: ctx.is_multikey(&index),
        bounds: ScanBounds::KeyRange {
            min,
            max,
            end_inclusive: shape.max.is_none(),
        },
        direction: ScanDirection::Forward,
        index: Arc::clone(&index),
    };
    let fetch = PlanNode::Fetch {
        filter: (!shape.predicate.is_always()).then(|| shape.predicate.clone()),
        input: Box::new(scan),
    };
    let sort_provided =
        matching && sort_direction(pattern, &shape.sort) == Some(ScanDirection::Forward);
    Ok(wrap_op(shape, finish(shape, fetch, sort_provided, false)))
}

/// Field names of the bounds, which must agree when both are given.
fn bound_fields(shape: &QueryShape) -> Result<Vec<String>, DbError> {
    let names = |d: &Document| d.keys().cloned().collect::<Vec<_>>();
    match (&shape.min, &shape.max) {
        (Some(min), Some(max)) => {
            let fields = names(min);
            if fields != names(max) {
                return Err(DbError::BadValue(
                    "min and max must have the same field names".into(),
                ));
            }
            Ok(fields)
        }
        (Some(bound), None) | (None, Some(bound)) => Ok(names(bound)),
        (None, None) => Err(DbError::BadValue("min/max planning without bounds".into())),
    }
}

fn fields_match(index: &IndexDescriptor, fields: &[String]) -> bool {
    index.key_pattern.is_btree()
        && index.key_pattern.len() == fields.len()
        && index.key_pattern.field_names().zip(fields).all(|(a, b)| a == b)
}

/// An index whose key fields are exactly the bound fields, preferring one
/// that compares strings the way the query does.
fn choose_index(ctx: &PlanningContext<'_>, fields: &[String]) -> Result<Arc<IndexDescriptor>, DbError> {
    ctx.meta()
        .indexes
        .iter()
        .filter(|index| fields_match(index, fields))
        .min_by_key(|index| {
            (
                !collators_match(index.collator.as_ref(), ctx.collator),
                index.name.clone(),
            )
        })
        .cloned()
        .ok_or_else(|| {
            DbError::NoQueryExecutionPlans(
                "could not find an index to satisfy min/max; hint the index to use".into(),
            )
        })
}
