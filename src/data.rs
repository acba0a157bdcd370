//! Dynamic wire representation.
//!
//! Resources travel through the pipeline as untyped string-keyed maps because
//! schemas are declared at runtime. These helpers give path-based access and
//! the loose conversions the builder and mappers rely on.

use serde_json::{Map, Value};

pub type Object = Map<String, Value>;

pub fn get_value<'a>(data: &'a Object, path: &[&str]) -> Option<&'a Value> {
    let (last, parents) = path.split_last()?;
    let mut current = data;
    for key in parents {
        current = current.get(*key)?.as_object()?;
    }
    current.get(*last)
}

pub fn get_str<'a>(data: &'a Object, path: &[&str]) -> Option<&'a str> {
    get_value(data, path).and_then(Value::as_str)
}

/// Sets `value` at `path`, creating (or replacing non-map) intermediate nodes.
pub fn put_value(data: &mut Object, value: Value, path: &[&str]) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = data;
    for key in parents {
        let entry = current
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Object::new()));
        if !entry.is_object() {
            *entry = Value::Object(Object::new());
        }
        current = match entry {
            Value::Object(map) => map,
            _ => return,
        };
    }
    current.insert(last.to_string(), value);
}

pub fn remove_value(data: &mut Object, path: &[&str]) -> Option<Value> {
    let (last, parents) = path.split_last()?;
    let mut current = data;
    for key in parents {
        current = current.get_mut(*key)?.as_object_mut()?;
    }
    current.remove(*last)
}

pub fn split_path<'a>(path: &'a str, separator: &str) -> Vec<&'a str> {
    path.split(separator).collect()
}

/// Loose string rendering: strings verbatim, null as empty, everything else as JSON.
pub fn to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

pub fn to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.to_lowercase().as_str(), "true" | "t" | "yes" | "y" | "1"),
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    }
}

pub fn to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Treats a single value as a one-element list; null becomes empty.
pub fn to_value_slice(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

pub fn to_object_slice(value: &Value) -> Vec<Object> {
    match value {
        Value::Array(items) => items.iter().filter_map(|v| v.as_object().cloned()).collect(),
        _ => Vec::new(),
    }
}

/// Recursively overlays `update` onto `dest`. Nested maps merge key by key,
/// every other value in `update` replaces the destination value.
pub fn merge(dest: &mut Object, update: &Object) {
    for (key, value) in update {
        match (dest.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => merge(existing, incoming),
            _ => {
                dest.insert(key.clone(), value.clone());
            }
        }
    }
}

pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Object {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn put_value_creates_intermediate_maps() {
        let mut data = Object::new();
        put_value(&mut data, json!("v1"), &["metadata", "labels", "app"]);
        assert_eq!(data, obj(json!({"metadata": {"labels": {"app": "v1"}}})));

        let mut data = obj(json!({"metadata": "oops"}));
        put_value(&mut data, json!(1), &["metadata", "generation"]);
        assert_eq!(get_value(&data, &["metadata", "generation"]), Some(&json!(1)));
    }

    #[test]
    fn remove_value_returns_nested_value() {
        let mut data = obj(json!({"annotations": {"a": "1", "b": "2"}}));
        assert_eq!(remove_value(&mut data, &["annotations", "a"]), Some(json!("1")));
        assert_eq!(remove_value(&mut data, &["annotations", "missing"]), None);
        assert_eq!(remove_value(&mut data, &["nothing", "here"]), None);
        assert_eq!(data, obj(json!({"annotations": {"b": "2"}})));
    }

    #[test]
    fn merge_keeps_unspecified_fields() {
        let mut dest = obj(json!({
            "metadata": {"name": "a", "labels": {"x": "1"}},
            "spec": {"replicas": 1, "image": "nginx"}
        }));
        let update = obj(json!({"metadata": {"labels": {"y": "2"}}, "spec": {"replicas": 3}}));
        merge(&mut dest, &update);
        assert_eq!(
            dest,
            obj(json!({
                "metadata": {"name": "a", "labels": {"x": "1", "y": "2"}},
                "spec": {"replicas": 3, "image": "nginx"}
            }))
        );
    }

    #[test]
    fn loose_conversions() {
        assert_eq!(to_string(&json!(12)), "12");
        assert_eq!(to_string(&Value::Null), "");
        assert!(to_bool(&json!("Yes")));
        assert!(!to_bool(&json!("nope")));
        assert_eq!(to_i64(&json!(" 42 ")), Some(42));
        assert_eq!(to_i64(&json!("4x")), None);
        assert_eq!(capitalize("widget"), "Widget");
    }
}
