//! Schema introspection for tool input schemas.
//!
//! Tool schemas arrive as untyped JSON. [`SchemaNode`] is a borrowed view
//! over one node with accessors for the handful of JSON Schema keywords this
//! crate understands (`type`, `properties`, `items`, `enum`, `default`,
//! `$ref`, `description`). An accessor reports [`SchemaError::TypeMismatch`]
//! when a keyword has the wrong JSON shape instead of guessing.
//!
//! - `resolver` follows internal `$ref` pointers (`#/a/b`) against the
//!   document root.
//! - `walker` renders human-readable descriptions and synthesizes example
//!   values.
//!
//! Nothing here validates instances against a schema.

mod resolver;
mod walker;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::ipc::codec::json_kind;

pub use resolver::{empty_node, resolve, resolve_or_empty, resolve_ref, unescape_segment};
pub use walker::{build_example, SchemaWalker, MAX_DEPTH};

/// Schema errors. None of these are fatal: callers degrade to an empty node
/// or a `null` placeholder and report the error as a warning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Only fragment-only JSON Pointers (`#/...`) are supported.
    #[error("unsupported ref format: {pointer}")]
    UnsupportedReferenceFormat { pointer: String },

    /// A pointer segment does not name an existing object field.
    #[error("ref path not found: {pointer} (at \"{segment}\")")]
    ReferencePathNotFound { pointer: String, segment: String },

    /// A schema keyword holds an unexpected JSON type.
    #[error("schema keyword '{keyword}' should be {expected}, found {found}")]
    TypeMismatch {
        keyword: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// Nesting (usually a self-referencing `$ref`) went too deep.
    #[error("schema nesting exceeds {0} levels")]
    RecursionLimit(usize),
}

/// Borrowed view of one schema node.
#[derive(Debug, Clone, Copy)]
pub struct SchemaNode<'a> {
    value: &'a Value,
}

impl<'a> SchemaNode<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self { value }
    }

    /// The underlying JSON value.
    pub fn value(&self) -> &'a Value {
        self.value
    }

    /// `$ref` pointer string.
    pub fn reference(&self) -> Result<Option<&'a str>, SchemaError> {
        self.keyword("$ref", "a string", Value::as_str)
    }

    /// `type` keyword.
    ///
    /// A type list such as `["string", "null"]` yields its first non-null entry.
    pub fn type_name(&self) -> Result<Option<&'a str>, SchemaError> {
        self.keyword("type", "a string or list of strings", |v| match v {
            Value::String(s) => Some(s.as_str()),
            Value::Array(types) => {
                let names: Option<Vec<&str>> = types.iter().map(Value::as_str).collect();
                let names = names?;
                Some(
                    names
                        .iter()
                        .copied()
                        .find(|t| *t != "null")
                        .unwrap_or("null"),
                )
            }
            _ => None,
        })
    }

    /// `properties` mapping, in declaration order.
    pub fn properties(&self) -> Result<Option<&'a Map<String, Value>>, SchemaError> {
        self.keyword("properties", "an object", Value::as_object)
    }

    /// `items` schema for arrays.
    pub fn items(&self) -> Result<Option<&'a Value>, SchemaError> {
        self.keyword("items", "an object", |v| v.is_object().then_some(v))
    }

    /// `enum` values, in declaration order.
    pub fn enum_values(&self) -> Result<Option<&'a Vec<Value>>, SchemaError> {
        self.keyword("enum", "an array", Value::as_array)
    }

    /// `default` value. Any JSON value is acceptable, including `null`.
    pub fn default_value(&self) -> Option<&'a Value> {
        self.value.get("default")
    }

    /// `description` text.
    pub fn description(&self) -> Result<Option<&'a str>, SchemaError> {
        self.keyword("description", "a string", Value::as_str)
    }

    /// Look up `key`; absent or `null` is `Ok(None)`, a present value that
    /// `extract` rejects is a `TypeMismatch`.
    fn keyword<T>(
        &self,
        key: &'static str,
        expected: &'static str,
        extract: impl FnOnce(&'a Value) -> Option<T>,
    ) -> Result<Option<T>, SchemaError> {
        match self.value.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(raw) => extract(raw).map(Some).ok_or(SchemaError::TypeMismatch {
                keyword: key,
                expected,
                found: json_kind(raw),
            }),
        }
    }
}
