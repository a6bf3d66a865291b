// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Serde default helper that returns `true`.
///
/// `#[serde(default)]` on a `bool` always falls back to `bool::default()`
/// (i.e. `false`), so fields that should be enabled unless explicitly
/// disabled need a named function.
fn default_true() -> bool {
    true
}

fn default_theme() -> String {
    "dark".into()
}

fn default_notif_channel() -> String {
    "iterm2".into()
}

/// The global configuration document, stored as JSON in the user's home
/// (`~/.config/kode/config.json`).  Every field is optional on disk; missing
/// fields fall back to the struct defaults so old config files keep loading
/// after upgrades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Number of times the application has been started.  Incremented by the
    /// binary on startup and written back.
    #[serde(default)]
    pub num_startups: u32,
    /// Anonymous stable user identifier.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub has_completed_onboarding: bool,
    /// Named model profiles the pointers below may reference.
    #[serde(default)]
    pub model_profiles: Vec<ModelProfile>,
    /// Role → model name indirection used when picking a model for a task.
    #[serde(default)]
    pub model_pointers: ModelPointers,
    #[serde(default = "default_notif_channel")]
    pub preferred_notif_channel: String,
    /// OAuth account info captured by the login flow.  Opaque to the agent
    /// loop; carried so `logout` can clear it.
    #[serde(default)]
    pub oauth_account: Option<OauthAccount>,
    /// Last-4 tails of API keys the user has approved / rejected for use.
    #[serde(default)]
    pub custom_api_key_responses: ApiKeyResponses,
    #[serde(default)]
    pub proxy: Option<String>,
    /// When true, a config parse error is surfaced to the user instead of
    /// silently falling back to defaults.
    #[serde(default)]
    pub strict_config: bool,
    /// Permission policy mode used for new sessions.
    #[serde(default)]
    pub default_permission_mode: PolicyMode,
    /// Whether `bypass_permissions` is a legal mode in this deployment.
    /// Disabled for managed installs; the mode cycle then skips it.
    #[serde(default = "default_true")]
    pub bypass_permissions_allowed: bool,
    #[serde(default)]
    pub compaction: CompactionConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Global-scope MCP servers, available in every project.
    #[serde(default)]
    pub mcp_servers: HashMap<String, McpServerConfig>,
    /// Per-project state, keyed by absolute project path.
    #[serde(default)]
    pub projects: HashMap<String, ProjectConfig>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            num_startups: 0,
            user_id: None,
            theme: default_theme(),
            verbose: false,
            has_completed_onboarding: false,
            model_profiles: Vec::new(),
            model_pointers: ModelPointers::default(),
            preferred_notif_channel: default_notif_channel(),
            oauth_account: None,
            custom_api_key_responses: ApiKeyResponses::default(),
            proxy: None,
            strict_config: false,
            default_permission_mode: PolicyMode::default(),
            bypass_permissions_allowed: true,
            compaction: CompactionConfig::default(),
            tools: ToolsConfig::default(),
            mcp_servers: HashMap::new(),
            projects: HashMap::new(),
        }
    }
}

impl GlobalConfig {
    /// Project entry for `path`, creating a default one if absent.
    pub fn project_mut(&mut self, path: &str) -> &mut ProjectConfig {
        self.projects.entry(path.to_string()).or_default()
    }

    /// Project entry for `path`, or a default value when the project has
    /// never been opened.
    pub fn project(&self, path: &str) -> ProjectConfig {
        self.projects.get(path).cloned().unwrap_or_default()
    }
}

/// A named model configuration referenced by [`ModelPointers`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProfile {
    pub name: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

/// Role-based model selection: each pointer names the model used for that
/// class of request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPointers {
    pub main: String,
    pub task: String,
    pub reasoning: String,
    pub quick: String,
}

impl Default for ModelPointers {
    fn default() -> Self {
        Self {
            main: "mock".into(),
            task: "mock".into(),
            reasoning: "mock".into(),
            quick: "mock".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OauthAccount {
    pub account_uuid: String,
    pub email_address: String,
    pub organization_uuid: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeyResponses {
    #[serde(default)]
    pub approved: Vec<String>,
    #[serde(default)]
    pub rejected: Vec<String>,
}

fn default_max_context_tokens() -> usize {
    180_000
}

/// User preference driving which retention strategy the auto-compactor tries
/// first when the session approaches the token budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CompactionPreference {
    /// Drop oldest messages outright (`preserve_recent`).
    Aggressive,
    /// Keep recent messages plus important older ones (`preserve_important`).
    #[default]
    Balanced,
    /// Summarise the older half locally (`smart_compression`).
    Conservative,
}

impl std::fmt::Display for CompactionPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompactionPreference::Aggressive => write!(f, "aggressive"),
            CompactionPreference::Balanced => write!(f, "balanced"),
            CompactionPreference::Conservative => write!(f, "conservative"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    #[serde(default)]
    pub preference: CompactionPreference,
    /// Token budget for the conversation history sent to the model.
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
    /// When false the compactor never escalates to an LLM summarisation call;
    /// the deterministic strategies are still applied.
    #[serde(default = "default_true")]
    pub auto_compact_enabled: bool,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            preference: CompactionPreference::default(),
            max_context_tokens: default_max_context_tokens(),
            auto_compact_enabled: true,
        }
    }
}

fn default_bash_timeout_ms() -> u64 {
    30 * 60 * 1000
}
fn default_bash_max_timeout_ms() -> u64 {
    10 * 60 * 1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Default wall-clock timeout for a `bash` invocation.
    #[serde(default = "default_bash_timeout_ms")]
    pub bash_default_timeout_ms: u64,
    /// Ceiling applied to a per-call `timeout` override from tool input.
    #[serde(default = "default_bash_max_timeout_ms")]
    pub bash_max_timeout_ms: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            bash_default_timeout_ms: default_bash_timeout_ms(),
            bash_max_timeout_ms: default_bash_max_timeout_ms(),
        }
    }
}

/// Per-project state stored inside the global config's `projects` map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Permission keys approved permanently for this project
    /// (e.g. `"read"`, `"bash(git)"`).
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    /// Key/value context entries appended to the system prompt.
    #[serde(default)]
    pub context: HashMap<String, String>,
    /// Prompt history for the input line.
    #[serde(default)]
    pub history: Vec<String>,
    #[serde(default)]
    pub has_trust_dialog_accepted: bool,
    #[serde(default)]
    pub has_completed_project_onboarding: bool,
    /// Project-scope MCP servers (highest precedence).
    #[serde(default)]
    pub mcp_servers: HashMap<String, McpServerConfig>,
    /// `.mcprc` server names the user approved / rejected.
    #[serde(default)]
    pub approved_mcprc_servers: Vec<String>,
    #[serde(default)]
    pub rejected_mcprc_servers: Vec<String>,
    #[serde(default)]
    pub last_cost_usd: f64,
    #[serde(default)]
    pub last_duration_ms: u64,
    #[serde(default)]
    pub dont_crawl_directory: bool,
    #[serde(default)]
    pub enable_architect_tool: bool,
}

/// One MCP server entry.  Keyed by name within its scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpServerConfig {
    /// Child process speaking MCP over stdin/stdout.
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// Remote server speaking MCP over server-sent events.
    Sse { url: String },
}

/// Permission policy mode, controlling how the gate treats write/exec tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// Read-only tools run freely; write/exec tools prompt per invocation.
    #[default]
    Default,
    /// Edit tools run without prompting; everything else as `default`.
    AcceptEdits,
    /// Only the read-only allowlist is usable; writes are denied outright.
    Plan,
    /// Everything runs without prompting.
    BypassPermissions,
}

impl PolicyMode {
    /// The next mode in the user-visible cycle.  When `allow_bypass` is
    /// false the cycle is `default → accept_edits → plan → default`.
    pub fn cycle_next(self, allow_bypass: bool) -> Self {
        match self {
            PolicyMode::Default => PolicyMode::AcceptEdits,
            PolicyMode::AcceptEdits => PolicyMode::Plan,
            PolicyMode::Plan => {
                if allow_bypass {
                    PolicyMode::BypassPermissions
                } else {
                    PolicyMode::Default
                }
            }
            PolicyMode::BypassPermissions => PolicyMode::Default,
        }
    }
}

impl std::fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyMode::Default => write!(f, "default"),
            PolicyMode::AcceptEdits => write!(f, "accept_edits"),
            PolicyMode::Plan => write!(f, "plan"),
            PolicyMode::BypassPermissions => write!(f, "bypass_permissions"),
        }
    }
}

/// The shape of a `.kode.json` project file (project MCP scope) and of a
/// `.mcprc` file.  Both are plain maps of server entries; `.kode.json` nests
/// them under a key so the file can grow other project settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectFile {
    #[serde(default)]
    pub mcp_servers: HashMap<String, McpServerConfig>,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Defaults ─────────────────────────────────────────────────────────────

    #[test]
    fn global_default_theme_is_dark() {
        let c = GlobalConfig::default();
        assert_eq!(c.theme, "dark");
    }

    #[test]
    fn global_default_mode_is_default() {
        let c = GlobalConfig::default();
        assert_eq!(c.default_permission_mode, PolicyMode::Default);
    }

    #[test]
    fn global_default_allows_bypass() {
        let c = GlobalConfig::default();
        assert!(c.bypass_permissions_allowed);
    }

    #[test]
    fn compaction_default_preference_is_balanced() {
        let c = CompactionConfig::default();
        assert_eq!(c.preference, CompactionPreference::Balanced);
        assert!(c.auto_compact_enabled);
    }

    #[test]
    fn tools_default_timeouts() {
        let t = ToolsConfig::default();
        assert_eq!(t.bash_default_timeout_ms, 30 * 60 * 1000);
        assert_eq!(t.bash_max_timeout_ms, 10 * 60 * 1000);
    }

    #[test]
    fn project_default_is_empty() {
        let p = ProjectConfig::default();
        assert!(p.allowed_tools.is_empty());
        assert!(p.mcp_servers.is_empty());
        assert!(!p.has_trust_dialog_accepted);
    }

    // ── Policy mode cycle ─────────────────────────────────────────────────────

    #[test]
    fn mode_cycle_with_bypass() {
        assert_eq!(
            PolicyMode::Default.cycle_next(true),
            PolicyMode::AcceptEdits
        );
        assert_eq!(PolicyMode::AcceptEdits.cycle_next(true), PolicyMode::Plan);
        assert_eq!(
            PolicyMode::Plan.cycle_next(true),
            PolicyMode::BypassPermissions
        );
        assert_eq!(
            PolicyMode::BypassPermissions.cycle_next(true),
            PolicyMode::Default
        );
    }

    #[test]
    fn mode_cycle_without_bypass_skips_it() {
        assert_eq!(PolicyMode::Plan.cycle_next(false), PolicyMode::Default);
    }

    #[test]
    fn mode_display_names_are_snake_case() {
        assert_eq!(PolicyMode::AcceptEdits.to_string(), "accept_edits");
        assert_eq!(
            PolicyMode::BypassPermissions.to_string(),
            "bypass_permissions"
        );
    }

    // ── JSON round-trips ──────────────────────────────────────────────────────

    #[test]
    fn mcp_server_stdio_round_trip() {
        let json = r#"{"type":"stdio","command":"npx","args":["-y","server"],"env":{"K":"v"}}"#;
        let s: McpServerConfig = serde_json::from_str(json).unwrap();
        match &s {
            McpServerConfig::Stdio { command, args, env } => {
                assert_eq!(command, "npx");
                assert_eq!(args, &["-y".to_string(), "server".to_string()]);
                assert_eq!(env.get("K").map(String::as_str), Some("v"));
            }
            _ => panic!("wrong variant"),
        }
        let back = serde_json::to_string(&s).unwrap();
        let again: McpServerConfig = serde_json::from_str(&back).unwrap();
        assert_eq!(again, s);
    }

    #[test]
    fn mcp_server_sse_round_trip() {
        let json = r#"{"type":"sse","url":"https://mcp.example.com/sse"}"#;
        let s: McpServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            s,
            McpServerConfig::Sse {
                url: "https://mcp.example.com/sse".into()
            }
        );
    }

    #[test]
    fn mcp_server_stdio_args_default_empty() {
        let json = r#"{"type":"stdio","command":"server"}"#;
        let s: McpServerConfig = serde_json::from_str(json).unwrap();
        match s {
            McpServerConfig::Stdio { args, env, .. } => {
                assert!(args.is_empty());
                assert!(env.is_empty());
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn global_config_partial_json_fills_defaults() {
        let json = r#"{"theme":"light","num_startups":7}"#;
        let c: GlobalConfig = serde_json::from_str(json).unwrap();
        assert_eq!(c.theme, "light");
        assert_eq!(c.num_startups, 7);
        assert_eq!(c.default_permission_mode, PolicyMode::Default);
        assert_eq!(c.compaction.max_context_tokens, 180_000);
    }

    #[test]
    fn global_config_round_trip_preserves_projects() {
        let mut c = GlobalConfig::default();
        c.project_mut("/home/me/proj").allowed_tools.push("bash(git)".into());
        let json = serde_json::to_string(&c).unwrap();
        let back: GlobalConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back.project("/home/me/proj").allowed_tools,
            vec!["bash(git)".to_string()]
        );
    }

    #[test]
    fn policy_mode_serde_is_snake_case() {
        let json = serde_json::to_string(&PolicyMode::AcceptEdits).unwrap();
        assert_eq!(json, r#""accept_edits""#);
        let back: PolicyMode = serde_json::from_str(r#""bypass_permissions""#).unwrap();
        assert_eq!(back, PolicyMode::BypassPermissions);
    }

    #[test]
    fn project_file_parses_mcp_servers() {
        let json = r#"{"mcp_servers":{"fs":{"type":"stdio","command":"mcp-fs"}}}"#;
        let f: ProjectFile = serde_json::from_str(json).unwrap();
        assert!(f.mcp_servers.contains_key("fs"));
    }
}
