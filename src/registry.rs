//! In-memory cache of the server's tools.
//!
//! The registry is empty until the first discovery response. Every later
//! discovery response replaces it wholesale: a fresh map is built and swapped
//! in, so a lookup never sees a half-updated mapping.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::models::ToolDescriptor;

/// Tool cache keyed by tool name.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolDescriptor>,
    populated: bool,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard the current mapping and install `tools`.
    ///
    /// On duplicate names the last descriptor wins.
    pub fn replace_all(&mut self, tools: Vec<ToolDescriptor>) {
        let mut fresh = BTreeMap::new();
        for tool in tools {
            if fresh.contains_key(&tool.name) {
                debug!("Duplicate tool '{}' in discovery response, keeping the last", tool.name);
            }
            fresh.insert(tool.name.clone(), tool);
        }
        self.tools = fresh;
        self.populated = true;
    }

    /// Look up a tool by exact name.
    pub fn lookup(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// Cached tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Whether at least one discovery response has been applied.
    pub fn is_populated(&self) -> bool {
        self.populated
    }
}

/// Parse the entries of a discovery response's `result.tools`.
///
/// Entries without a string `name` or an object `inputSchema` are skipped with
/// a warning; a missing `description` becomes empty.
pub fn tools_from_discovery(entries: &[Value]) -> Vec<ToolDescriptor> {
    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let Some(name) = entry.get("name").and_then(Value::as_str) else {
                warn!("Skipping tool #{} without a name", index);
                return None;
            };
            let Some(schema) = entry.get("inputSchema").filter(|s| s.is_object()) else {
                warn!("Skipping tool '{}' without an object inputSchema", name);
                return None;
            };
            let description = entry
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default();

            Some(ToolDescriptor {
                name: name.to_string(),
                description: description.to_string(),
                schema: schema.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(name: &str, description: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: description.to_string(),
            schema: json!({"type": "object"}),
        }
    }

    #[test]
    fn test_new_registry_is_unpopulated() {
        let registry = ToolRegistry::new();
        assert!(!registry.is_populated());
        assert!(registry.is_empty());
        assert!(registry.lookup("echo").is_none());
    }

    #[test]
    fn test_replace_all_discards_previous() {
        let mut registry = ToolRegistry::new();
        registry.replace_all(vec![tool("a", ""), tool("b", "")]);
        assert_eq!(registry.names(), vec!["a", "b"]);

        registry.replace_all(vec![tool("c", "")]);
        assert_eq!(registry.names(), vec!["c"]);
        assert!(registry.lookup("a").is_none());
        assert!(registry.is_populated());
    }

    #[test]
    fn test_duplicate_names_last_wins() {
        let mut registry = ToolRegistry::new();
        registry.replace_all(vec![tool("echo", "first"), tool("echo", "second")]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("echo").unwrap().description, "second");
    }

    #[test]
    fn test_empty_discovery_still_populates() {
        let mut registry = ToolRegistry::new();
        registry.replace_all(Vec::new());
        assert!(registry.is_populated());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_tools_from_discovery_skips_incomplete_entries() {
        let entries = vec![
            json!({"name": "echo", "description": "echoes input", "inputSchema": {"type": "object"}}),
            json!({"name": "no_schema", "description": "x"}),
            json!({"description": "no name", "inputSchema": {}}),
            json!({"name": "bad_schema", "inputSchema": "object"}),
            json!({"name": "quiet", "inputSchema": {"type": "object"}}),
        ];

        let tools = tools_from_discovery(&entries);
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "quiet"]);
        assert_eq!(tools[0].description, "echoes input");
        assert_eq!(tools[1].description, "");
    }
}
