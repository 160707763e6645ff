//! Immutable name → tool index, built once at registration time.

use std::collections::HashMap;
use std::sync::Arc;

use super::{Tool, ToolDefinition};

/// Maps tool name → `Arc<dyn Tool>`. Built via [`ToolRegistryBuilder`] and
/// immutable thereafter — dispatch is a single `HashMap` lookup.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    index: HashMap<String, Arc<dyn Tool>>,
    definitions: Vec<ToolDefinition>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.definitions.iter().map(|d| &d.name).collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.index.get(name)
    }

    /// All tool definitions in registration order.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.definitions.clone()
    }

    /// Number of distinct (name) entries in the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the registry has no tools.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Builder for [`ToolRegistry`].
#[derive(Default)]
pub struct ToolRegistryBuilder {
    index: HashMap<String, Arc<dyn Tool>>,
    definitions: Vec<ToolDefinition>,
}

impl ToolRegistryBuilder {
    /// Register a tool, indexing it under every name in its definitions.
    #[must_use]
    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        for def in tool.definitions() {
            self.index.insert(def.name.clone(), Arc::clone(&tool));
            self.definitions.push(def);
        }
        self
    }

    /// Finalize the registry.
    #[must_use]
    pub fn build(self) -> ToolRegistry {
        ToolRegistry {
            index: self.index,
            definitions: self.definitions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{ToolError, ToolPayload};
    use async_trait::async_trait;
    use serde_json::Value;

    struct Greet;

    #[async_trait]
    impl Tool for Greet {
        fn definitions(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition {
                name: "greet".into(),
                description: "Say hello".into(),
                parameters: serde_json::json!({"type": "object"}),
            }]
        }

        async fn execute(&self, _name: &str, _args: Value) -> Result<ToolPayload, ToolError> {
            Ok(ToolPayload::text("hello"))
        }
    }

    #[test]
    fn lookup_is_case_sensitive_exact_match() {
        let registry = ToolRegistry::builder().tool(Arc::new(Greet)).build();
        assert!(registry.get("greet").is_some());
        assert!(registry.get("Greet").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn definitions_reflect_registration() {
        let registry = ToolRegistry::builder().tool(Arc::new(Greet)).build();
        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "greet");
    }
}
