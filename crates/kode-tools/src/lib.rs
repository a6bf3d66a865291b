// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: MIT
pub mod builtin;
pub mod permissions;
pub mod registry;
pub mod schema;
pub mod tool;

pub use permissions::{
    ModeTransition, PermissionDecision, PermissionGate, PermissionHandler, PermissionOutcome,
    PermissionRequest, RiskCategory, StaticPermissionHandler, EDIT_TOOLS, READ_ONLY_ALLOWLIST,
};
pub use registry::ToolRegistry;
pub use schema::validate_against_schema;
pub use tool::{
    PermissionKey, PrefixResult, Tool, ToolOutput, ToolStream, ToolStreamItem, ToolUseContext,
};

pub use builtin::bash::BashTool;
pub use builtin::edit::FileEditTool;
pub use builtin::glob::GlobTool;
pub use builtin::grep::GrepTool;
pub use builtin::ls::LsTool;
pub use builtin::read::FileReadTool;
pub use builtin::write::FileWriteTool;
