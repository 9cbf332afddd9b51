// ABOUTME: Strips empty entries from page records and decides whether a record carries content.
// ABOUTME: Sanitizing is idempotent; falsy scalars such as 0, false and "" survive.

use serde_json::Value;

use crate::extractors::Record;

/// Message carried by a soft failure when a page had nothing worth returning.
pub const NO_CONTENT_MESSAGE: &str =
    "no meaningful content found in result; the request was likely rate-limited or blocked";

/// Removes top-level entries that are null, an empty array or an empty object.
pub fn sanitize(record: Record) -> Record {
    record
        .into_iter()
        .filter(|(_, v)| !is_removable(v))
        .collect()
}

fn is_removable(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// True when any primary key resolves to a non-empty array or object.
///
/// Keys may be dotted paths into nested objects, e.g. `pagination.page_links`.
pub fn has_meaningful_content<S: AsRef<str>>(record: &Record, primary: &[S]) -> bool {
    primary.iter().any(|key| match lookup(record, key.as_ref()) {
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        _ => false,
    })
}

fn lookup<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = record.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}
