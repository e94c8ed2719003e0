//! Bracket-path tree records
//!
//! Form-style entries (`foo[bar][0]=x`) to nested objects and back.
//!
//! - `[x]` segments are path tokens; numeric tokens index arrays.
//! - `[]` appends a new element.
//! - Setting an existing key again promotes it to an array of values, so
//!   repeated keys (`a=x&a=y`) become `{a: ["x", "y"]}`.
//! - Collecting emits arrays of leaves as repeated keys, which round-trips
//!   with the promotion above.
//! - A numeric token more than [`MAX_INDEX_GAP`] past the end of an array is
//!   an object key, so `a[4000000000]` never allocates.
//! - A path that descends below an existing leaf (`a=x` then `a[b]=y`)
//!   replaces the leaf with the container: the later, deeper entry wins.

use indexmap::IndexMap;
use std::sync::Arc;
use tracing::trace;

use crate::value::{PropertyKey, Record, Value};

enum Node {
    Leaf(Value),
    Array(Vec<Node>),
    Object(IndexMap<String, Node>),
}

impl Node {
    fn container_for(next: &str) -> Node {
        if next.is_empty() || is_index(next) {
            Node::Array(Vec::new())
        } else {
            Node::Object(IndexMap::new())
        }
    }

    fn into_value(self) -> Value {
        match self {
            Node::Leaf(value) => value,
            Node::Array(items) => Value::array(items.into_iter().map(Node::into_value).collect()),
            Node::Object(map) => Value::Object(Arc::new(
                map.into_iter()
                    .map(|(k, v)| (PropertyKey::String(k), v.into_value()))
                    .collect::<Record>(),
            )),
        }
    }

    /// Arrays only take numeric or append tokens; anything else turns the
    /// array into an index-keyed object
    fn as_object(&mut self) -> &mut IndexMap<String, Node> {
        if !matches!(self, Node::Object(_)) {
            let previous = std::mem::replace(self, Node::Object(IndexMap::new()));
            if let (Node::Array(items), Node::Object(map)) = (previous, &mut *self) {
                for (i, item) in items.into_iter().enumerate() {
                    map.insert(i.to_string(), item);
                }
            }
        }
        match self {
            Node::Object(map) => map,
            _ => unreachable!("converted to an object above"),
        }
    }
}

/// How far past the current end an index may reach
pub const MAX_INDEX_GAP: usize = 1024;

fn is_index(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// Split `foo[bar][0][]` into `["foo", "bar", "0", ""]`
pub fn bracket_path_to_tokens(path: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let head_end = path.find('[').unwrap_or(path.len());
    tokens.push(path[..head_end].to_string());
    let mut rest = &path[head_end..];
    while let Some(stripped) = rest.strip_prefix('[') {
        match stripped.find(']') {
            Some(close) => {
                tokens.push(stripped[..close].to_string());
                rest = &stripped[close + 1..];
            }
            None => {
                // unterminated bracket: keep the remainder as a literal token
                tokens.push(stripped.to_string());
                rest = "";
            }
        }
    }
    tokens
}

/// Build a nested record from bracket-path entries
pub fn make_tree_record(entries: &[(String, Value)]) -> Value {
    let mut root = Node::Object(IndexMap::new());
    for (key, value) in entries {
        let tokens = bracket_path_to_tokens(key);
        insert(&mut root, &tokens, value.clone());
    }
    root.into_value()
}

fn insert(current: &mut Node, tokens: &[String], value: Value) {
    let Some((token, rest)) = tokens.split_first() else {
        return;
    };
    let is_last = rest.is_empty();

    if let Node::Array(items) = current {
        if token.is_empty() {
            if is_last {
                items.push(Node::Leaf(value));
            } else {
                items.push(Node::container_for(&rest[0]));
                if let Some(next) = items.last_mut() {
                    insert(next, rest, value);
                }
            }
            return;
        }
        let index = token
            .parse::<usize>()
            .ok()
            .filter(|index| *index <= items.len().saturating_add(MAX_INDEX_GAP));
        if let Some(index) = index {
            if items.len() <= index {
                items.resize_with(index + 1, || Node::Leaf(Value::Undefined));
            }
            let slot = &mut items[index];
            let vacant = matches!(slot, Node::Leaf(Value::Undefined));
            if is_last {
                if vacant {
                    *slot = Node::Leaf(value);
                } else {
                    promote(slot, value);
                }
            } else {
                if !vacant && matches!(slot, Node::Leaf(_)) {
                    trace!(token = %token, "bracket path descends below a leaf, replacing it");
                }
                if matches!(slot, Node::Leaf(_)) {
                    *slot = Node::container_for(&rest[0]);
                }
                insert(slot, rest, value);
            }
            return;
        }
    }

    if matches!(current, Node::Leaf(_)) {
        *current = Node::Object(IndexMap::new());
    }
    let map = current.as_object();
    if is_last {
        match map.get_mut(token) {
            Some(existing) => promote(existing, value),
            None => {
                map.insert(token.clone(), Node::Leaf(value));
            }
        }
    } else {
        let child = map
            .entry(token.clone())
            .or_insert_with(|| Node::container_for(&rest[0]));
        if matches!(child, Node::Leaf(_)) {
            trace!(token = %token, "bracket path descends below a leaf, replacing it");
            *child = Node::container_for(&rest[0]);
        }
        insert(child, rest, value);
    }
}

/// A key set twice becomes an array of its values
fn promote(existing: &mut Node, value: Value) {
    match existing {
        Node::Array(items) => items.push(Node::Leaf(value)),
        other => {
            let previous = std::mem::replace(other, Node::Array(Vec::new()));
            if let Node::Array(items) = other {
                items.push(previous);
                items.push(Node::Leaf(value));
            }
        }
    }
}

fn is_leaf(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// Flatten a nested record into bracket-path entries
pub fn collect_bracket_path_entries(value: &Value) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    collect(value, "", &mut out);
    out
}

fn collect(value: &Value, prefix: &str, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Array(items) => {
            if items.iter().all(is_leaf) {
                for item in items.iter() {
                    out.push((prefix.to_string(), item.clone()));
                }
            } else {
                for (i, item) in items.iter().enumerate() {
                    collect(item, &format!("{}[{}]", prefix, i), out);
                }
            }
        }
        Value::Object(record) => {
            for (key, item) in record.iter() {
                let key = match key {
                    PropertyKey::String(s) => s.clone(),
                    PropertyKey::Index(i) => i.to_string(),
                    PropertyKey::Symbol(_) => continue,
                };
                let path = if prefix.is_empty() {
                    key
                } else {
                    format!("{}[{}]", prefix, key)
                };
                collect(item, &path, out);
            }
        }
        leaf => out.push((prefix.to_string(), leaf.clone())),
    }
}

/// Read `[[key, value], ...]` pairs out of an array value
pub fn entries_from_value(value: &Value) -> Option<Vec<(String, Value)>> {
    value
        .as_array()?
        .iter()
        .map(|pair| match pair.as_array()? {
            [Value::String(key), item] => Some((key.clone(), item.clone())),
            _ => None,
        })
        .collect()
}

pub fn entries_to_value(entries: &[(String, Value)]) -> Value {
    Value::array(
        entries
            .iter()
            .map(|(key, item)| Value::array(vec![Value::from(key.as_str()), item.clone()]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries(pairs: &[(&str, &str)]) -> Vec<(String, Value)> {
        pairs.iter().map(|(k, v)| (k.to_string(), Value::from(*v))).collect()
    }

    #[test]
    fn test_tokens() {
        assert_eq!(bracket_path_to_tokens("foo[bar][0][]"), vec!["foo", "bar", "0", ""]);
        assert_eq!(bracket_path_to_tokens("plain"), vec!["plain"]);
    }

    #[test]
    fn test_indexed_and_appended_arrays() {
        let indexed = make_tree_record(&entries(&[("a[0]", "x"), ("a[1]", "y")]));
        assert_eq!(indexed.to_json(), Some(json!({"a": ["x", "y"]})));
        let appended = make_tree_record(&entries(&[("a[]", "x"), ("a[]", "y")]));
        assert_eq!(appended.to_json(), Some(json!({"a": ["x", "y"]})));
    }

    #[test]
    fn test_repeated_keys_promote() {
        let out = make_tree_record(&entries(&[("a", "x"), ("a", "y"), ("a", "z")]));
        assert_eq!(out.to_json(), Some(json!({"a": ["x", "y", "z"]})));
    }

    #[test]
    fn test_nested_objects_in_arrays() {
        let out = make_tree_record(&entries(&[("u[0][name]", "a"), ("u[1][name]", "b"), ("u[][name]", "c")]));
        assert_eq!(
            out.to_json(),
            Some(json!({"u": [{"name": "a"}, {"name": "b"}, {"name": "c"}]}))
        );
    }

    #[test]
    fn test_huge_indexes_become_object_keys() {
        let out = make_tree_record(&entries(&[("a[18446744073709551615]", "x")]));
        assert_eq!(out.to_json(), Some(json!({"a": {"18446744073709551615": "x"}})));

        let out = make_tree_record(&entries(&[("a[0]", "x"), ("a[4000000000]", "y")]));
        assert_eq!(out.to_json(), Some(json!({"a": {"0": "x", "4000000000": "y"}})));

        let sparse = make_tree_record(&entries(&[("a[2]", "x")]));
        assert_eq!(sparse.get(&PropertyKey::from("a")).and_then(Value::length), Some(3));
    }

    #[test]
    fn test_deeper_entry_replaces_leaf() {
        let out = make_tree_record(&entries(&[("a", "x"), ("a[b]", "y")]));
        assert_eq!(out.to_json(), Some(json!({"a": {"b": "y"}})));

        let out = make_tree_record(&entries(&[("a[0]", "x"), ("a[0][b]", "y")]));
        assert_eq!(out.to_json(), Some(json!({"a": [{"b": "y"}]})));
    }

    #[test]
    fn test_collect_round_trips() {
        let input = entries(&[("a", "1"), ("b[c]", "2"), ("b[d][e]", "3")]);
        let tree = make_tree_record(&input);
        assert_eq!(collect_bracket_path_entries(&tree), input);
    }

    #[test]
    fn test_arrays_of_leaves_collect_as_repeated_keys() {
        let tree = Value::from_json(&json!({"a": ["x", "y"], "b": [{"c": "z"}]}));
        let out = collect_bracket_path_entries(&tree);
        assert_eq!(out, entries(&[("a", "x"), ("a", "y"), ("b[0][c]", "z")]));
        assert_eq!(make_tree_record(&out), tree);
    }
}
