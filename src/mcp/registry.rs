//! The MCP server's tool registry (spec.md §3 "Ownership": "Tools are
//! stored both in a mapping by name and in an insertion-ordered sequence
//! so that `tools/list` returns a deterministic order").

use std::collections::HashMap;

use crate::model::ToolInfo;
use crate::tools::{SynthesizedTool, ToolHandler};

pub struct RegisteredTool {
    pub info: ToolInfo,
    pub handler: ToolHandler,
}

/// Built once at startup from [`crate::tools::synthesize`] and held
/// read-only by [`super::server::McpServer`] for the life of the process
/// (spec.md §5 — metadata, and therefore the tool catalog, is fetched once).
#[derive(Default)]
pub struct ToolRegistry {
    by_name: HashMap<String, RegisteredTool>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn from_synthesized(tools: Vec<SynthesizedTool>) -> Self {
        let mut registry = ToolRegistry::default();
        for tool in tools {
            registry.insert(tool);
        }
        registry
    }

    fn insert(&mut self, tool: SynthesizedTool) {
        let name = tool.info.name.clone();
        if !self.by_name.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.by_name.insert(
            name,
            RegisteredTool {
                info: tool.info,
                handler: tool.handler,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.by_name.get(name)
    }

    /// Tools in insertion order (spec.md §3 Ownership, §8 "tools/list
    /// ordering equals insertion order").
    pub fn iter_in_order(&self) -> impl Iterator<Item = &RegisteredTool> {
        self.order.iter().filter_map(move |name| self.by_name.get(name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
