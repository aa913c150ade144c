//! Dot-notation lookups into JSON pages.

use serde_json::Value;

/// Looks up `path` inside `value`. Empty segments are skipped, so `""` and `"."`
/// return `value` itself; numeric segments index into arrays.
///
/// ```
/// use serde_json::json;
/// use list_view::json_path::get_value;
///
/// let page = json!({"a": {"b": [10, 20]}});
/// assert_eq!(get_value(&page, "a.b.1"), Some(&json!(20)));
/// assert_eq!(get_value(&page, "a.c"), None);
/// ```
pub fn get_value<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index)),
            _ => None,
        })
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Items held by `page` under `items_key`. A single non-array value counts as one item.
pub fn items_from_page(page: &Value, items_key: &str) -> Vec<Value> {
    match get_value(page, items_key) {
        None => Vec::new(),
        Some(found) if is_falsy(found) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(single) => vec![single.clone()],
    }
}

/// URL of the page after `page`, read from the `bookmark` path.
pub fn next_page_url(page: &Value, bookmark: &str) -> Option<String> {
    match get_value(page, bookmark)? {
        Value::String(url) if !url.is_empty() => Some(url.clone()),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/json_path_tests.rs"]
mod tests;
