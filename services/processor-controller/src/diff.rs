//! Field-level diffs between two serializable values, for logging.

use serde::Serialize;
use serde_json::Value;

/// Lines of the form `-path: desired` / `+path: observed` for every leaf
/// that differs. Objects are walked by key, arrays by index.
pub fn diff<T: Serialize>(desired: &T, observed: &T) -> Result<Vec<String>, serde_json::Error> {
    let desired = serde_json::to_value(desired)?;
    let observed = serde_json::to_value(observed)?;
    let mut lines = Vec::new();
    walk("", Some(&desired), Some(&observed), &mut lines);
    Ok(lines)
}

fn walk(path: &str, desired: Option<&Value>, observed: Option<&Value>, out: &mut Vec<String>) {
    match (desired, observed) {
        (Some(Value::Object(d)), Some(Value::Object(o))) => {
            let mut keys: Vec<&String> = d.keys().chain(o.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                walk(&child(path, key), d.get(key), o.get(key), out);
            }
        }
        (Some(Value::Array(d)), Some(Value::Array(o))) => {
            for i in 0..d.len().max(o.len()) {
                walk(&format!("{path}[{i}]"), d.get(i), o.get(i), out);
            }
        }
        (d, o) if d == o => {}
        (d, o) => {
            let path = if path.is_empty() { "." } else { path };
            if let Some(d) = d {
                out.push(format!("-{path}: {d}"));
            }
            if let Some(o) = o {
                out.push(format!("+{path}: {o}"));
            }
        }
    }
}

fn child(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}
