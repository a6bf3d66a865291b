// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: Apache-2.0
//! Scoped MCP server configuration.
//!
//! Three scopes feed the merged server list, highest precedence first:
//! `project` (`.kode.json` in the working project), `mcprc` (a `.mcprc`
//! file in the working directory, gated by per-server user approval), and
//! `global` (the user-home config).

use std::collections::HashMap;
use std::path::Path;

use kode_config::{load_project_file, GlobalConfig, McpServerConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigScope {
    Global,
    Mcprc,
    Project,
}

impl std::fmt::Display for ConfigScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigScope::Global => write!(f, "global"),
            ConfigScope::Mcprc => write!(f, "mcprc"),
            ConfigScope::Project => write!(f, "project"),
        }
    }
}

/// Approval state of a `.mcprc` server.  Only `Approved` servers join client
/// startup; `Rejected` excludes them permanently, `Pending` until the user
/// decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    Approved,
    Rejected,
    Pending,
}

/// A server entry together with its originating scope.
#[derive(Debug, Clone)]
pub struct ScopedServer {
    pub name: String,
    pub config: McpServerConfig,
    pub scope: ConfigScope,
    /// Only meaningful for `mcprc` scope; other scopes are always approved.
    pub approval: ApprovalStatus,
}

impl ScopedServer {
    /// Whether this server participates in client startup.
    pub fn is_startable(&self) -> bool {
        self.approval == ApprovalStatus::Approved
    }
}

/// Merged view of all configured servers.  Higher-precedence scopes shadow
/// same-named entries from lower ones.
pub fn list_servers(global: &GlobalConfig, project_dir: &Path) -> Vec<ScopedServer> {
    let project_key = project_dir.display().to_string();
    let project_cfg = global.project(&project_key);

    let mut merged: HashMap<String, ScopedServer> = HashMap::new();

    for (name, config) in &global.mcp_servers {
        merged.insert(
            name.clone(),
            ScopedServer {
                name: name.clone(),
                config: config.clone(),
                scope: ConfigScope::Global,
                approval: ApprovalStatus::Approved,
            },
        );
    }

    if let Some(mcprc) = load_project_file(project_dir, ".mcprc") {
        for (name, config) in mcprc.mcp_servers {
            let approval = if project_cfg.approved_mcprc_servers.contains(&name) {
                ApprovalStatus::Approved
            } else if project_cfg.rejected_mcprc_servers.contains(&name) {
                ApprovalStatus::Rejected
            } else {
                ApprovalStatus::Pending
            };
            merged.insert(
                name.clone(),
                ScopedServer {
                    name,
                    config,
                    scope: ConfigScope::Mcprc,
                    approval,
                },
            );
        }
    }

    if let Some(project) = load_project_file(project_dir, ".kode.json") {
        for (name, config) in project.mcp_servers {
            merged.insert(
                name.clone(),
                ScopedServer {
                    name,
                    config,
                    scope: ConfigScope::Project,
                    approval: ApprovalStatus::Approved,
                },
            );
        }
    }

    let mut servers: Vec<ScopedServer> = merged.into_values().collect();
    servers.sort_by(|a, b| a.name.cmp(&b.name));
    servers
}

/// The highest-precedence entry with the given name.
pub fn get_server(
    global: &GlobalConfig,
    project_dir: &Path,
    name: &str,
) -> Option<ScopedServer> {
    list_servers(global, project_dir)
        .into_iter()
        .find(|s| s.name == name)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
