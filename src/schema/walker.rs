//! Schema descriptions and example synthesis.
//!
//! `SchemaWalker` keeps the document root next to every node it visits so
//! `$ref` pointers can be resolved wherever they appear. It never rejects a
//! schema: unresolvable references degrade to an empty schema, malformed
//! keywords are ignored, and each such problem is recorded as a warning.

use serde_json::{json, Map, Value};
use tracing::warn;

use super::resolver::{empty_node, resolve_or_empty};
use super::{SchemaError, SchemaNode};

/// Maximum nesting followed before giving up (guards self-referencing `$ref`).
pub const MAX_DEPTH: usize = 32;

/// Walks a schema document, collecting warnings along the way.
#[derive(Debug)]
pub struct SchemaWalker<'r> {
    root: &'r Value,
    warnings: Vec<SchemaError>,
}

impl<'r> SchemaWalker<'r> {
    /// Create a walker for the document `root`.
    pub fn new(root: &'r Value) -> Self {
        Self {
            root,
            warnings: Vec::new(),
        }
    }

    /// Warnings recorded so far, without duplicates, in first-seen order.
    pub fn warnings(&self) -> &[SchemaError] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<SchemaError> {
        self.warnings
    }

    /// Describe the properties of an object schema, one entry per line.
    ///
    /// Each property yields `<indent><path> (<type>)[: <description>]`,
    /// followed by `↳ default:` / `↳ enum:` annotations when present. Nested
    /// object properties are expanded beneath their parent with a dotted path.
    pub fn describe(&mut self, schema: &'r Value, path_prefix: &str, depth: usize) -> Vec<String> {
        let mut lines = Vec::new();
        self.describe_into(schema, path_prefix, depth, &mut lines);
        lines
    }

    /// Synthesize a representative value for `schema`.
    ///
    /// A non-empty `enum` wins over the declared type and yields its first
    /// value. Scalars get fixed placeholders (`"string"`, `0`, `0.0`,
    /// `false`); arrays hold one example item.
    pub fn build_example(&mut self, schema: &'r Value) -> Value {
        self.example_at(schema, 0)
    }

    /// Sketch an object schema as a map from property name to a type
    /// placeholder (`"string"`, `0`, `["<item type>"]`, nested objects, or
    /// `"any"`).
    pub fn type_sketch(&mut self, schema: &'r Value) -> Value {
        self.sketch_at(schema, 0)
    }

    /// Top-level property names of an object schema, in declaration order.
    pub fn property_names(&mut self, schema: &'r Value) -> Vec<String> {
        let node = self.deref(schema);
        self.properties_of(node)
            .map(|properties| properties.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn describe_into(&mut self, schema: &'r Value, prefix: &str, depth: usize, lines: &mut Vec<String>) {
        if depth > MAX_DEPTH {
            self.warn(SchemaError::RecursionLimit(MAX_DEPTH));
            return;
        }

        let node = self.deref(schema);
        let Some(properties) = self.properties_of(node) else {
            return;
        };

        let indent = "  ".repeat(depth);
        for (name, raw) in properties {
            let prop = self.deref(raw);
            let field_path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", prefix, name)
            };

            let type_name = self.type_of(prop);
            let mut line = format!("{}{} ({})", indent, field_path, type_name.unwrap_or("any"));
            if let Some(description) = self.description_of(prop) {
                line.push_str(": ");
                line.push_str(description);
            }
            lines.push(line);

            if let Some(default) = prop.default_value() {
                lines.push(format!("{}  ↳ default: {}", indent, default));
            }
            if let Some(values) = self.enum_of(prop) {
                lines.push(format!("{}  ↳ enum: {}", indent, Value::Array(values.clone())));
            }

            if type_name == Some("object") {
                self.describe_into(prop.value(), &field_path, depth + 1, lines);
            }
        }
    }

    fn example_at(&mut self, schema: &'r Value, depth: usize) -> Value {
        if depth > MAX_DEPTH {
            self.warn(SchemaError::RecursionLimit(MAX_DEPTH));
            return Value::Null;
        }

        let node = self.deref(schema);
        if let Some(first) = self.enum_of(node).and_then(|values| values.first()) {
            return first.clone();
        }

        match self.type_of(node) {
            Some("object") => {
                let mut example = Map::new();
                if let Some(properties) = self.properties_of(node) {
                    for (name, prop) in properties {
                        example.insert(name.clone(), self.example_at(prop, depth + 1));
                    }
                }
                Value::Object(example)
            }
            Some("array") => match self.items_of(node) {
                Some(items) => Value::Array(vec![self.example_at(items, depth + 1)]),
                None => Value::Array(Vec::new()),
            },
            Some("string") => json!("string"),
            Some("integer") => json!(0),
            Some("number") => json!(0.0),
            Some("boolean") => node.default_value().cloned().unwrap_or(Value::Bool(false)),
            _ => node.default_value().cloned().unwrap_or(Value::Null),
        }
    }

    fn sketch_at(&mut self, schema: &'r Value, depth: usize) -> Value {
        let mut sketch = Map::new();
        if depth > MAX_DEPTH {
            self.warn(SchemaError::RecursionLimit(MAX_DEPTH));
            return Value::Object(sketch);
        }

        let node = self.deref(schema);
        let Some(properties) = self.properties_of(node) else {
            return Value::Object(sketch);
        };

        for (name, raw) in properties {
            let prop = self.deref(raw);
            if let Some(first) = self.enum_of(prop).and_then(|values| values.first()) {
                sketch.insert(name.clone(), first.clone());
                continue;
            }

            let placeholder = match self.type_of(prop) {
                Some("string") => json!("string"),
                Some("integer") => json!(0),
                Some("number") => json!(0.0),
                Some("boolean") => json!(false),
                Some("array") => {
                    let item_type = self
                        .items_of(prop)
                        .map(|items| self.deref(items))
                        .and_then(|items| self.type_of(items))
                        .unwrap_or("any");
                    json!([item_type])
                }
                Some("object") => self.sketch_at(prop.value(), depth + 1),
                _ => json!("any"),
            };
            sketch.insert(name.clone(), placeholder);
        }

        Value::Object(sketch)
    }

    /// Follow `$ref` until reaching a node without one.
    fn deref(&mut self, schema: &'r Value) -> SchemaNode<'r> {
        let mut current = schema;
        for _ in 0..MAX_DEPTH {
            match SchemaNode::new(current).reference() {
                Ok(Some(pointer)) => {
                    let (target, err) = resolve_or_empty(pointer, self.root);
                    if let Some(err) = err {
                        self.warn(err);
                    }
                    current = target;
                }
                Ok(None) => return SchemaNode::new(current),
                Err(err) => {
                    self.warn(err);
                    return SchemaNode::new(current);
                }
            }
        }

        self.warn(SchemaError::RecursionLimit(MAX_DEPTH));
        SchemaNode::new(empty_node())
    }

    fn type_of(&mut self, node: SchemaNode<'r>) -> Option<&'r str> {
        let result = node.type_name();
        self.ok_or_warn(result)
    }

    fn properties_of(&mut self, node: SchemaNode<'r>) -> Option<&'r Map<String, Value>> {
        let result = node.properties();
        self.ok_or_warn(result)
    }

    fn items_of(&mut self, node: SchemaNode<'r>) -> Option<&'r Value> {
        let result = node.items();
        self.ok_or_warn(result)
    }

    fn enum_of(&mut self, node: SchemaNode<'r>) -> Option<&'r Vec<Value>> {
        let result = node.enum_values();
        self.ok_or_warn(result)
    }

    fn description_of(&mut self, node: SchemaNode<'r>) -> Option<&'r str> {
        let result = node.description();
        self.ok_or_warn(result)
    }

    fn ok_or_warn<T>(&mut self, result: Result<Option<T>, SchemaError>) -> Option<T> {
        match result {
            Ok(value) => value,
            Err(err) => {
                self.warn(err);
                None
            }
        }
    }

    fn warn(&mut self, err: SchemaError) {
        if !self.warnings.contains(&err) {
            warn!("{}", err);
            self.warnings.push(err);
        }
    }
}

/// Synthesize an example for `schema`, resolving `$ref` against `root`.
///
/// Warnings are logged and otherwise discarded; use [`SchemaWalker`] to
/// inspect them.
pub fn build_example(schema: &Value, root: &Value) -> Value {
    SchemaWalker::new(root).build_example(schema)
}
