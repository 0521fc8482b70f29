//! Semantic equality of remote specs
//!
//! Specs are compared in their serialized form. Absent fields, `null`, and
//! empty arrays or objects are all equal to each other. Fields listed in
//! `ignore_if_unset` are skipped when the desired side leaves them unset,
//! because the service fills in its own default for them.
//!
//! Paths are dot-separated field names with `*` standing for any array
//! element, e.g. `listeners.*.healthCheck.port`.

use serde_json::Value;

use super::RemoteSpec;

/// Fields the service defaults when the desired spec leaves them unset
pub const HEALTH_CHECK_PORT: &str = "listeners.*.healthCheck.port";

/// Compare `desired` against `actual` under semantic equality.
pub fn specs_equal(desired: &RemoteSpec, actual: &RemoteSpec, ignore_if_unset: &[&str]) -> bool {
    if std::mem::discriminant(desired) != std::mem::discriminant(actual) {
        return false;
    }
    match (desired.body(), actual.body()) {
        (Ok(desired), Ok(actual)) => values_equal(&desired, &actual, ignore_if_unset),
        _ => false,
    }
}

/// Compare two JSON documents under semantic equality.
pub fn values_equal(desired: &Value, actual: &Value, ignore_if_unset: &[&str]) -> bool {
    let patterns: Vec<Vec<&str>> = ignore_if_unset
        .iter()
        .map(|p| p.split('.').collect())
        .collect();
    let mut path = Vec::new();
    compare(Some(desired), Some(actual), &patterns, &mut path)
}

fn compare<'a>(
    desired: Option<&'a Value>,
    actual: Option<&'a Value>,
    patterns: &[Vec<&str>],
    path: &mut Vec<&'a str>,
) -> bool {
    if is_empty(desired) && is_empty(actual) {
        return true;
    }
    if desired.is_none_or(Value::is_null) && is_ignored(path, patterns) {
        return true;
    }

    match (desired, actual) {
        (Some(Value::Object(d)), Some(Value::Object(a))) => {
            d.keys().chain(a.keys().filter(|k| !d.contains_key(*k))).all(|key| {
                path.push(key.as_str());
                let equal = compare(d.get(key), a.get(key), patterns, path);
                path.pop();
                equal
            })
        }
        (Some(Value::Array(d)), Some(Value::Array(a))) => {
            d.len() == a.len()
                && d.iter().zip(a.iter()).all(|(d, a)| {
                    path.push("*");
                    let equal = compare(Some(d), Some(a), patterns, path);
                    path.pop();
                    equal
                })
        }
        (Some(d), Some(a)) => d == a,
        _ => false,
    }
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(fields)) => fields.is_empty(),
        Some(_) => false,
    }
}

fn is_ignored(path: &[&str], patterns: &[Vec<&str>]) -> bool {
    patterns.iter().any(|pattern| {
        pattern.len() == path.len()
            && pattern
                .iter()
                .zip(path.iter())
                .all(|(p, segment)| *p == "*" || p == segment)
    })
}
