use bson::{Bson, Document};

use crate::error::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn reverse(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// Parse a sort specification such as `{ a: 1, b: -1 }`.
pub fn parse_sort(doc: &Document) -> Result<Vec<Sort>, QueryError> {
    doc.iter()
        .map(|(field, value)| {
            let direction = match value {
                Bson::Int32(n) => direction_of(f64::from(*n)),
                Bson::Int64(n) => direction_of(*n as f64),
                Bson::Double(d) => direction_of(*d),
                _ => None,
            }
            .ok_or_else(|| {
                QueryError::bad_value(format!(
                    "$sort key ordering must be 1 (for ascending) or -1 (for descending), got {value} for {field}"
                ))
            })?;
            Ok(Sort {
                field: field.clone(),
                direction,
            })
        })
        .collect()
}

fn direction_of(n: f64) -> Option<SortDirection> {
    if n == 1.0 {
        Some(SortDirection::Asc)
    } else if n == -1.0 {
        Some(SortDirection::Desc)
    } else {
        None
    }
}

/// Render a sort back to document form.
pub fn sort_to_document(sort: &[Sort]) -> Document {
    let mut doc = Document::new();
    for s in sort {
        doc.insert(s.field.clone(), s.direction.as_i32());
    }
    doc
}
