//! Section merge for `content_json` blobs.
//!
//! A page blob is edited one top-level section at a time. Saving a section
//! replaces only that key; every sibling is carried over untouched.

use serde_json::{Map, Value};

use super::ContentError;

/// Replace `section` inside `content`, keeping all other top-level keys.
///
/// A non-object `content` (null, array, scalar) is treated as an empty object.
pub fn merge_section(content: &Value, section: &str, value: Value) -> Result<Value, ContentError> {
    let section = section.trim();
    if section.is_empty() {
        return Err(ContentError::EmptySection);
    }

    let mut merged = match content {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    merged.insert(section.to_string(), value);

    Ok(Value::Object(merged))
}

/// Set a dotted field path such as `hero.title`, creating intermediate objects.
///
/// Intermediate values that are not objects are replaced by objects.
pub fn set_field_path(content: &mut Value, path: &str, value: Value) -> Result<(), ContentError> {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.iter().any(|p| p.trim().is_empty()) {
        return Err(ContentError::InvalidPath(path.to_string()));
    }

    if !content.is_object() {
        *content = Value::Object(Map::new());
    }

    let (last, parents) = match parts.split_last() {
        Some(split) => split,
        None => return Err(ContentError::InvalidPath(path.to_string())),
    };

    let mut cursor = content;
    for part in parents {
        let Value::Object(map) = cursor else {
            return Err(ContentError::InvalidPath(path.to_string()));
        };
        let entry = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        cursor = entry;
    }

    if let Value::Object(map) = cursor {
        map.insert(last.to_string(), value);
    }

    Ok(())
}

/// Names of top-level keys whose values differ between two blobs.
pub fn changed_sections(before: &Value, after: &Value) -> Vec<String> {
    let empty = Map::new();
    let before = before.as_object().unwrap_or(&empty);
    let after = after.as_object().unwrap_or(&empty);

    let mut changed: Vec<String> = after
        .iter()
        .filter(|(k, v)| before.get(*k) != Some(*v))
        .map(|(k, _)| k.clone())
        .chain(
            before
                .keys()
                .filter(|k| !after.contains_key(*k))
                .cloned(),
        )
        .collect();
    changed.sort();
    changed
}
