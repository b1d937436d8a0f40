use serde_json::Value;

/// Walk a dotted path such as `data.result.recordingId`
fn at_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |node, key| node.get(key))
}

/// First non-empty string found at any of `paths`, in order
pub fn first_string_at(value: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|path| match at_path(value, path)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    })
}

/// First array found at any of `paths`, in order
pub fn first_array_at(value: &Value, paths: &[&str]) -> Option<Vec<Value>> {
    paths
        .iter()
        .find_map(|path| at_path(value, path)?.as_array().cloned())
}
