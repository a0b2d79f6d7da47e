//! set command - Set a value at a JSON pointer and commit

use std::path::Path;

use anyhow::{anyhow, bail, Context as _, Result};
use serde_json::{Map, Value};

use super::open_document;
use crate::cli::Context;
use crate::core::format::Format;
use crate::ui::output;

/// Store `value` at `pointer` and commit the document.
///
/// The edit is applied to a copy first, so a bad pointer leaves the
/// document untouched.
pub fn set(
    ctx: &Context,
    path: &Path,
    pointer: &str,
    value: &str,
    format: Option<Format>,
) -> Result<()> {
    let value: Value =
        serde_json::from_str(value).with_context(|| format!("Invalid JSON value: {}", value))?;

    let mut doc = open_document(ctx, path, format)?;
    let mut root = doc.read(Value::clone)?;
    set_pointer(&mut root, pointer, value)
        .with_context(|| format!("Cannot set '{}' in {}", pointer, path.display()))?;

    doc.set_content(root)?;
    let outcome = doc.commit()?;
    doc.release()?;

    if outcome.was_written() {
        output::success(format!("Set {} in {}", pointer, path.display()), ctx.verbosity);
    } else {
        output::print("Value unchanged", ctx.verbosity);
    }
    Ok(())
}

/// Write `value` at an RFC 6901 pointer, creating missing objects on the way.
///
/// `-` as the last token appends to an array. Null parents become objects.
pub(crate) fn set_pointer(root: &mut Value, pointer: &str, value: Value) -> Result<()> {
    if pointer.is_empty() {
        *root = value;
        return Ok(());
    }
    let Some(rest) = pointer.strip_prefix('/') else {
        bail!("JSON pointer must start with '/'");
    };

    let tokens: Vec<String> = rest.split('/').map(unescape).collect();
    let Some((last, parents)) = tokens.split_last() else {
        bail!("empty JSON pointer");
    };

    let mut target = root;
    for token in parents {
        target = child_mut(target, token)?;
    }
    insert(target, last, value)
}

fn unescape(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

fn child_mut<'a>(parent: &'a mut Value, token: &str) -> Result<&'a mut Value> {
    if parent.is_null() {
        *parent = Value::Object(Map::new());
    }
    match parent {
        Value::Object(map) => Ok(map
            .entry(token.to_string())
            .or_insert_with(|| Value::Object(Map::new()))),
        Value::Array(items) => {
            let len = items.len();
            let index = array_index(token)?;
            items
                .get_mut(index)
                .ok_or_else(|| anyhow!("index {} is out of bounds (length {})", index, len))
        }
        other => bail!("cannot descend into {} at '{}'", kind(other), token),
    }
}

fn insert(parent: &mut Value, token: &str, value: Value) -> Result<()> {
    if parent.is_null() {
        *parent = Value::Object(Map::new());
    }
    match parent {
        Value::Object(map) => {
            map.insert(token.to_string(), value);
        }
        Value::Array(items) if token == "-" => items.push(value),
        Value::Array(items) => {
            let index = array_index(token)?;
            if index < items.len() {
                items[index] = value;
            } else if index == items.len() {
                items.push(value);
            } else {
                bail!("index {} is out of bounds (length {})", index, items.len());
            }
        }
        other => bail!("cannot set '{}' inside {}", token, kind(other)),
    }
    Ok(())
}

fn array_index(token: &str) -> Result<usize> {
    token
        .parse()
        .with_context(|| format!("'{}' is not an array index", token))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn creates_intermediate_objects() {
        let mut root = json!({});
        set_pointer(&mut root, "/a/b/c", json!(1)).unwrap();
        assert_eq!(root, json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn empty_pointer_replaces_root() {
        let mut root = json!({"x": 1});
        set_pointer(&mut root, "", json!([true])).unwrap();
        assert_eq!(root, json!([true]));
    }

    #[test]
    fn array_index_and_append() {
        let mut root = json!({"list": [1, 2]});
        set_pointer(&mut root, "/list/0", json!(9)).unwrap();
        set_pointer(&mut root, "/list/-", json!(3)).unwrap();
        set_pointer(&mut root, "/list/3", json!(4)).unwrap();
        assert_eq!(root, json!({"list": [9, 2, 3, 4]}));

        assert!(set_pointer(&mut root, "/list/9", json!(0)).is_err());
        assert!(set_pointer(&mut root, "/list/x", json!(0)).is_err());
    }

    #[test]
    fn escaped_tokens() {
        let mut root = json!({});
        set_pointer(&mut root, "/a~1b/c~0d", json!("v")).unwrap();
        assert_eq!(root, json!({"a/b": {"c~d": "v"}}));
    }

    #[test]
    fn scalar_parent_is_error() {
        let mut root = json!({"n": 5});
        let err = set_pointer(&mut root, "/n/x", json!(1)).unwrap_err();
        assert!(err.to_string().contains("a number"));
        assert_eq!(root, json!({"n": 5}));
    }

    #[test]
    fn null_parent_becomes_object() {
        let mut root = json!({"n": null});
        set_pointer(&mut root, "/n/x", json!(1)).unwrap();
        assert_eq!(root, json!({"n": {"x": 1}}));
    }

    #[test]
    fn missing_slash_is_error() {
        let mut root = json!({});
        assert!(set_pointer(&mut root, "a", json!(1)).is_err());
    }
}
