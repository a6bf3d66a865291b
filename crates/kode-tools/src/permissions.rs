// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: MIT
//! The permission gate: per-invocation authorization for tool use.
//!
//! Process-wide state (approved/rejected keys, the current policy mode)
//! lives here; persistence of permanent approvals goes through a caller
//! supplied hook so this crate stays independent of the config layer's I/O.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use kode_config::PolicyMode;
use kode_model::REJECT_MESSAGE;

use crate::tool::{PermissionKey, PrefixResult, Tool, ToolUseContext};

/// Tools usable in `plan` mode.  The plan-mode exit sentinel is included so
/// the model can leave plan mode without a write tool.
pub const READ_ONLY_ALLOWLIST: &[&str] = &[
    "read",
    "grep",
    "glob",
    "ls",
    "web_search",
    "web_fetch",
    "notebook_read",
    "exit_plan_mode",
];

/// Tools that `accept_edits` mode runs without prompting.
pub const EDIT_TOOLS: &[&str] = &["edit", "write", "notebook_edit"];

/// Risk bucket shown on a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskCategory {
    Low,
    Moderate,
    High,
}

impl RiskCategory {
    /// `<30` low, `<70` moderate, else high.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=29 => RiskCategory::Low,
            30..=69 => RiskCategory::Moderate,
            _ => RiskCategory::High,
        }
    }
}

fn risk_score(tool: &dyn Tool) -> u8 {
    if tool.is_read_only() {
        10
    } else if EDIT_TOOLS.contains(&tool.name()) {
        45
    } else if tool.name() == "bash" {
        75
    } else {
        55
    }
}

/// A rendered permission request handed to the UI.
#[derive(Debug, Clone)]
pub struct PermissionRequest {
    pub tool_name: String,
    pub description: String,
    pub risk: RiskCategory,
    pub input: Value,
    pub key: PermissionKey,
}

/// What the user chose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOutcome {
    /// Allow and remember the key across sessions.
    AllowPermanent,
    /// Allow this invocation only.
    AllowTemporary,
    /// Refuse; `remember` also records the key in the rejected set.
    Reject { remember: bool },
    /// Cancel the whole request.
    Abort,
}

/// Gate verdict for one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDecision {
    Allow,
    Deny {
        message: String,
        /// When true the enclosing request must be cancelled, not just this
        /// tool use.
        abort: bool,
    },
}

impl PermissionDecision {
    fn deny(message: impl Into<String>) -> Self {
        Self::Deny {
            message: message.into(),
            abort: false,
        }
    }
}

/// Asynchronous UI seam: render a request, await the user's choice.
#[async_trait]
pub trait PermissionHandler: Send + Sync {
    async fn request(&self, req: PermissionRequest) -> PermissionOutcome;
}

/// Handler returning a fixed outcome; the default for headless runs and the
/// workhorse of tests.
pub struct StaticPermissionHandler(pub PermissionOutcome);

#[async_trait]
impl PermissionHandler for StaticPermissionHandler {
    async fn request(&self, _req: PermissionRequest) -> PermissionOutcome {
        self.0
    }
}

/// A recorded policy-mode transition.
#[derive(Debug, Clone)]
pub struct ModeTransition {
    pub from: PolicyMode,
    pub to: PolicyMode,
    pub at: DateTime<Utc>,
    pub seq: u64,
}

/// Process-wide permission state.  All mutation happens on the driver task;
/// concurrent read-only dispatch only reads.
pub struct PermissionGate {
    mode: Mutex<PolicyMode>,
    allow_bypass: bool,
    approved: Mutex<HashSet<String>>,
    rejected: Mutex<HashSet<String>>,
    /// Outcomes already decided this turn, so the same key is never asked
    /// twice within one turn.
    turn_cache: Mutex<HashMap<String, PermissionDecision>>,
    transitions: Mutex<Vec<ModeTransition>>,
    handler: Box<dyn PermissionHandler>,
    /// Invoked with the key string when a permanent allow must be persisted.
    persist: Option<Box<dyn Fn(&str) + Send + Sync>>,
}

impl PermissionGate {
    pub fn new(mode: PolicyMode, allow_bypass: bool, handler: Box<dyn PermissionHandler>) -> Self {
        Self {
            mode: Mutex::new(mode),
            allow_bypass,
            approved: Mutex::new(HashSet::new()),
            rejected: Mutex::new(HashSet::new()),
            turn_cache: Mutex::new(HashMap::new()),
            transitions: Mutex::new(Vec::new()),
            handler,
            persist: None,
        }
    }

    /// Seed previously persisted approvals (the project's allowed-tool list).
    pub fn with_approved(self, keys: impl IntoIterator<Item = String>) -> Self {
        self.approved.lock().unwrap().extend(keys);
        self
    }

    /// Install the persistence hook for permanent allows.
    pub fn with_persist(mut self, persist: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.persist = Some(Box::new(persist));
        self
    }

    pub fn mode(&self) -> PolicyMode {
        *self.mode.lock().unwrap()
    }

    /// Switch modes, recording the transition.
    pub fn set_mode(&self, to: PolicyMode) {
        let mut mode = self.mode.lock().unwrap();
        let from = *mode;
        if from == to {
            return;
        }
        *mode = to;
        let mut transitions = self.transitions.lock().unwrap();
        let seq = transitions.len() as u64 + 1;
        info!(%from, %to, seq, "permission mode changed");
        transitions.push(ModeTransition {
            from,
            to,
            at: Utc::now(),
            seq,
        });
    }

    /// Advance along the `default → accept_edits → plan → bypass_permissions
    /// → default` cycle (bypass skipped when disallowed).
    pub fn cycle_mode(&self) -> PolicyMode {
        let next = self.mode().cycle_next(self.allow_bypass);
        self.set_mode(next);
        next
    }

    pub fn transitions(&self) -> Vec<ModeTransition> {
        self.transitions.lock().unwrap().clone()
    }

    /// Forget per-turn outcomes.  Called by the driver at the start of each
    /// turn.
    pub fn begin_turn(&self) {
        self.turn_cache.lock().unwrap().clear();
    }

    pub fn approved_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.approved.lock().unwrap().iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Decide whether this invocation may run.  Follows the fixed order:
    /// bypass → plan restriction → key computation (injection always denied)
    /// → rejected set → approved set / accept_edits → user prompt.
    pub async fn can_use_tool(
        &self,
        tool: &dyn Tool,
        input: &Value,
        _ctx: &ToolUseContext,
    ) -> PermissionDecision {
        let mode = self.mode();

        if mode == PolicyMode::BypassPermissions {
            return PermissionDecision::Allow;
        }

        if mode == PolicyMode::Plan && !READ_ONLY_ALLOWLIST.contains(&tool.name()) {
            return PermissionDecision::deny(format!(
                "Kode is in plan mode and may only use read-only tools. \
                 The '{}' tool is unavailable until plan mode is exited.",
                tool.name()
            ));
        }

        if tool.is_read_only() {
            return PermissionDecision::Allow;
        }

        let key = match tool.prefix(input) {
            Some(PrefixResult::InjectionDetected) => {
                return PermissionDecision::deny(
                    "Command contains shell substitution or chaining; it cannot be \
                     authorized by prefix and was denied.",
                );
            }
            Some(PrefixResult::Safe(prefix)) => PermissionKey::with_prefix(tool.name(), prefix),
            None => PermissionKey::tool_only(tool.name()),
        };
        let key_str = key.to_string();

        if self.rejected.lock().unwrap().contains(&key_str) {
            return PermissionDecision::deny(REJECT_MESSAGE);
        }

        if self.approved.lock().unwrap().contains(&key_str)
            || (mode == PolicyMode::AcceptEdits && EDIT_TOOLS.contains(&tool.name()))
        {
            return PermissionDecision::Allow;
        }

        if let Some(prior) = self.turn_cache.lock().unwrap().get(&key_str) {
            debug!(key = %key_str, "reusing permission outcome from this turn");
            return prior.clone();
        }

        let request = PermissionRequest {
            tool_name: tool.name().to_string(),
            description: describe(tool, input),
            risk: RiskCategory::from_score(risk_score(tool)),
            input: input.clone(),
            key,
        };
        let outcome = self.handler.request(request).await;

        let decision = match outcome {
            PermissionOutcome::AllowPermanent => {
                self.approved.lock().unwrap().insert(key_str.clone());
                if let Some(persist) = &self.persist {
                    persist(&key_str);
                }
                PermissionDecision::Allow
            }
            PermissionOutcome::AllowTemporary => PermissionDecision::Allow,
            PermissionOutcome::Reject { remember } => {
                if remember {
                    self.rejected.lock().unwrap().insert(key_str.clone());
                }
                PermissionDecision::deny(REJECT_MESSAGE)
            }
            PermissionOutcome::Abort => PermissionDecision::Deny {
                message: REJECT_MESSAGE.to_string(),
                abort: true,
            },
        };
        self.turn_cache
            .lock()
            .unwrap()
            .insert(key_str, decision.clone());
        decision
    }
}

fn describe(tool: &dyn Tool, input: &Value) -> String {
    let detail = input
        .get("command")
        .or_else(|| input.get("file_path"))
        .or_else(|| input.get("path"))
        .and_then(Value::as_str)
        .unwrap_or("");
    if detail.is_empty() {
        format!("Use the {} tool", tool.name())
    } else {
        format!("Use the {} tool: {detail}", tool.name())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
