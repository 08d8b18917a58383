//! Dotted field path access over owned documents.

use bson::{Bson, Document};

use crate::error::QueryError;

/// A value reached while walking a dotted path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathValue<'a> {
    Found(&'a Bson),
    Missing,
}

/// Every value a path resolves to, descending into arrays of documents.
///
/// `a.b` over `{a: [{b: 1}, {b: 2}]}` yields both `1` and `2`. A numeric
/// component indexes into an array. The result is `[Missing]` when no
/// branch reaches the leaf.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Vec<PathValue<'a>> {
    let parts: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    walk_document(doc, &parts, &mut out);
    if out.is_empty() {
        out.push(PathValue::Missing);
    }
    out
}

fn walk_document<'a>(doc: &'a Document, parts: &[&str], out: &mut Vec<PathValue<'a>>) {
    let Some((head, rest)) = parts.split_first() else {
        return;
    };
    match doc.get(*head) {
        Some(value) if rest.is_empty() => out.push(PathValue::Found(value)),
        Some(value) => walk_value(value, rest, out),
        None => {}
    }
}

fn walk_value<'a>(value: &'a Bson, parts: &[&str], out: &mut Vec<PathValue<'a>>) {
    match value {
        Bson::Document(d) => walk_document(d, parts, out),
        Bson::Array(items) => {
            if let Ok(index) = parts[0].parse::<usize>() {
                if let Some(item) = items.get(index) {
                    if parts.len() == 1 {
                        out.push(PathValue::Found(item));
                    } else {
                        walk_value(item, &parts[1..], out);
                    }
                }
                return;
            }
            for item in items {
                if let Bson::Document(d) = item {
                    walk_document(d, parts, out);
                }
            }
        }
        _ => {}
    }
}

/// Exact lookup without array expansion other than numeric components.
pub fn get<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(d) => d.get(part)?,
            Bson::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Set `path` to `value`, creating intermediate documents as needed.
pub fn set(doc: &mut Document, path: &str, value: Bson) -> Result<(), QueryError> {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !doc.contains_key(head) {
                doc.insert(head, Document::new());
            }
            match doc.get_mut(head) {
                Some(Bson::Document(child)) => set(child, rest, value),
                Some(Bson::Array(items)) => {
                    let (index, tail) = match rest.split_once('.') {
                        Some((i, t)) => (i, Some(t)),
                        None => (rest, None),
                    };
                    let index: usize = index.parse().map_err(|_| {
                        QueryError::bad_value(format!(
                            "cannot create field '{index}' in element {{{head}: array}}"
                        ))
                    })?;
                    while items.len() <= index {
                        items.push(Bson::Null);
                    }
                    match tail {
                        None => {
                            items[index] = value;
                            Ok(())
                        }
                        Some(tail) => {
                            if !matches!(items[index], Bson::Document(_)) {
                                items[index] = Bson::Document(Document::new());
                            }
                            match &mut items[index] {
                                Bson::Document(child) => set(child, tail, value),
                                _ => Ok(()),
                            }
                        }
                    }
                }
                _ => Err(QueryError::bad_value(format!(
                    "cannot create field '{rest}' in non-document element '{head}'"
                ))),
            }
        }
    }
}

/// Remove `path`, returning the old value.
pub fn remove(doc: &mut Document, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        None => doc.remove(path),
        Some((head, rest)) => match doc.get_mut(head)? {
            Bson::Document(child) => remove(child, rest),
            _ => None,
        },
    }
}
