// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use kode_model::ToolSchema;

use crate::Tool;

/// Central registry holding all available tools: built-ins, user-defined,
/// and MCP-adapted.  Built once at startup; immutable afterwards, which is
/// what makes parallel tool execution safe.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Insertion order, so schemas are presented deterministically.
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a tool.  Disabled tools are skipped; re-registering a name
    /// replaces the previous entry.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        if !tool.is_enabled() {
            return;
        }
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Schemas for every registered tool, in registration order.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The standard built-in set.
pub fn builtin_registry() -> ToolRegistry {
    let mut reg = ToolRegistry::new();
    reg.register(crate::builtin::read::FileReadTool);
    reg.register(crate::builtin::ls::LsTool);
    reg.register(crate::builtin::glob::GlobTool);
    reg.register(crate::builtin::grep::GrepTool);
    reg.register(crate::builtin::bash::BashTool);
    reg.register(crate::builtin::edit::FileEditTool);
    reg.register(crate::builtin::write::FileWriteTool);
    reg
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
