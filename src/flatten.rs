//! Optional flattening of nested objects into dotted field names
//!
//! An explicit pre-processing step applied to a page before accumulation,
//! never an implicit behavior of the fetcher.

use serde_json::Value;

use crate::types::{Page, Record};

/// Flatten nested objects in every record of the page, in place.
///
/// `{"a": {"b": 1}}` becomes `{"a.b": 1}`; arrays and scalars are kept
/// as-is. Field order follows a depth-first walk of the original record.
pub fn flatten_page(page: &mut Page) {
    for record in &mut page.records {
        if record.values().any(Value::is_object) {
            let original = std::mem::take(record);
            flatten_into(record, None, original);
        }
    }
}

fn flatten_into(target: &mut Record, prefix: Option<&str>, source: Record) {
    for (key, value) in source {
        let name = match prefix {
            Some(p) => format!("{p}.{key}"),
            None => key,
        };
        match value {
            Value::Object(nested) => flatten_into(target, Some(name.as_str()), nested),
            other => {
                target.insert(name, other);
            }
        }
    }
}
