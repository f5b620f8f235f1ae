//! `$ref` resolution against the schema document root.
//!
//! Only fragment-only JSON Pointers of the form `#/seg/seg/...` are
//! supported; anything else, including a bare `#`, is rejected. Each segment is unescaped (`~1` → `/`, then `~0` → `~`)
//! and followed as an object key. Resolution is a pure function of
//! `(pointer, root)` and is not cached.

use std::borrow::Cow;
use std::sync::LazyLock;

use serde_json::{Map, Value};

use super::SchemaError;

static EMPTY_NODE: LazyLock<Value> = LazyLock::new(|| Value::Object(Map::new()));

/// The empty object schema that failed resolutions degrade to.
pub fn empty_node() -> &'static Value {
    &EMPTY_NODE
}

/// Unescape one JSON Pointer segment.
///
/// `~1` is replaced before `~0`, so `a~01` becomes `a~1` rather than `a/`.
pub fn unescape_segment(segment: &str) -> Cow<'_, str> {
    if !segment.contains('~') {
        return Cow::Borrowed(segment);
    }
    Cow::Owned(segment.replace("~1", "/").replace("~0", "~"))
}

/// Resolve `pointer` to a node borrowed from `root`.
pub fn resolve_ref<'a>(pointer: &str, root: &'a Value) -> Result<&'a Value, SchemaError> {
    let unsupported = || SchemaError::UnsupportedReferenceFormat {
        pointer: pointer.to_string(),
    };

    let path = pointer.strip_prefix("#/").ok_or_else(unsupported)?;

    let mut current = root;
    let mut last_segment = "";
    for segment in path.split('/') {
        let key = unescape_segment(segment);
        current = current
            .as_object()
            .and_then(|fields| fields.get(key.as_ref()))
            .ok_or_else(|| SchemaError::ReferencePathNotFound {
                pointer: pointer.to_string(),
                segment: segment.to_string(),
            })?;
        last_segment = segment;
    }

    // A pointer must land on a schema object, not on a scalar or list
    if !current.is_object() {
        return Err(SchemaError::ReferencePathNotFound {
            pointer: pointer.to_string(),
            segment: last_segment.to_string(),
        });
    }

    Ok(current)
}

/// Resolve `pointer` to an owned copy of the target node.
pub fn resolve(pointer: &str, root: &Value) -> Result<Value, SchemaError> {
    resolve_ref(pointer, root).cloned()
}

/// Resolve `pointer`, degrading any failure to the empty object node.
///
/// The error, if any, is handed back so the caller can report it.
pub fn resolve_or_empty<'a>(pointer: &str, root: &'a Value) -> (&'a Value, Option<SchemaError>) {
    match resolve_ref(pointer, root) {
        Ok(node) => (node, None),
        Err(err) => (empty_node(), Some(err)),
    }
}
