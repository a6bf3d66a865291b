// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: MIT
//! Slash-command dispatch.
//!
//! Commands come from three sources (built-ins, user-defined entries, and
//! MCP-discovered prompts) and are one of three kinds: `local` (synchronous
//! function producing a string), `local_jsx` (renders UI, may deliver a
//! string), and `prompt` (produces user messages for the model).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use kode_config::PolicyMode;
use kode_model::{Message, NO_RESPONSE_REQUESTED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Local,
    LocalJsx,
    Prompt,
}

/// Read-only environment handed to local command handlers.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub cwd: PathBuf,
    pub mode: PolicyMode,
    pub model_name: String,
    /// (server name, connected) pairs for `/mcp`.
    pub mcp_status: Vec<(String, bool)>,
}

type LocalFn = Arc<dyn Fn(&str, &CommandContext) -> Result<String, String> + Send + Sync>;
type JsxFn = Arc<dyn Fn(&str, &CommandContext) -> Option<String> + Send + Sync>;
type PromptFn = Arc<dyn Fn(&str) -> Vec<Message> + Send + Sync>;

enum Handler {
    Local(LocalFn),
    LocalJsx(JsxFn),
    Prompt(PromptFn),
    Control(ControlAction),
}

/// Actions the dispatcher cannot perform itself because they mutate the
/// conversation; the embedding loop applies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    /// Reset history and caches.
    Clear,
    /// Summarise history via the compression prompt.
    Compact,
}

pub struct Command {
    pub name: String,
    pub description: String,
    handler: Handler,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match &self.handler {
            Handler::Local(_) | Handler::Control(_) => CommandKind::Local,
            Handler::LocalJsx(_) => CommandKind::LocalJsx,
            Handler::Prompt(_) => CommandKind::Prompt,
        }
    }
}

/// What a dispatched input line turned into.
#[derive(Debug, Clone)]
pub enum Dispatched {
    /// The line was not a slash command; treat it as a user prompt.
    NotACommand,
    /// `/name` did not resolve.
    Unknown(String),
    /// Local command output, wrapped as an assistant message.
    Assistant(Message),
    /// A local-jsx command completed, optionally delivering a string.
    Jsx(Option<String>),
    /// Prompt-kind command: user messages to feed the model.
    Prompt(Vec<Message>),
    /// A control action for the embedding loop.
    Control(ControlAction),
}

pub struct CommandRegistry {
    commands: HashMap<String, Command>,
    order: Vec<String>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Registry pre-populated with the built-in command set.
    pub fn builtin() -> Self {
        let mut reg = Self::new();
        reg.register_control("clear", "Reset conversation history", ControlAction::Clear);
        reg.register_control(
            "compact",
            "Summarise history to free context space",
            ControlAction::Compact,
        );
        reg.register_local("config", "Show the current configuration", |_, ctx| {
            Ok(format!(
                "mode: {}\nmodel: {}\ncwd: {}",
                ctx.mode,
                ctx.model_name,
                ctx.cwd.display()
            ))
        });
        reg.register_local("cost", "Show session cost", |_, _| {
            Ok("Cost is tracked per assistant message; see the session log.".into())
        });
        reg.register_local("doctor", "Check the local environment", |_, ctx| {
            let mut lines = Vec::new();
            lines.push(format!(
                "working directory: {} ({})",
                ctx.cwd.display(),
                if ctx.cwd.is_dir() { "ok" } else { "missing" }
            ));
            lines.push(format!(
                "shell: {}",
                if which_bash() { "bash found" } else { "bash NOT found" }
            ));
            Ok(lines.join("\n"))
        });
        reg.register_local("model", "Show the active model", |_, ctx| {
            Ok(ctx.model_name.clone())
        });
        reg.register_local("mcp", "Show MCP server status", |_, ctx| {
            if ctx.mcp_status.is_empty() {
                return Ok("No MCP servers configured.".into());
            }
            Ok(ctx
                .mcp_status
                .iter()
                .map(|(name, ok)| {
                    format!("{name}: {}", if *ok { "connected" } else { "failed" })
                })
                .collect::<Vec<_>>()
                .join("\n"))
        });
        reg.register_prompt(
            "init",
            "Analyse this project and write a KODE.md guide",
            Vec::new(),
        );
        reg.register_prompt(
            "review",
            "Review a pull request",
            vec!["pr-number".to_string()],
        );
        reg.register_local("resume", "Resume a previous conversation", |_, _| {
            Err("No saved conversations found.".into())
        });
        reg.register_local("bug", "File a bug report", |args, _| {
            Ok(format!("Bug report noted: {args}"))
        });
        reg.register_local("terminal-setup", "Install terminal key bindings", |_, _| {
            Ok("Terminal setup is only available in the interactive UI.".into())
        });
        reg
    }

    pub fn register_local(
        &mut self,
        name: &str,
        description: &str,
        f: impl Fn(&str, &CommandContext) -> Result<String, String> + Send + Sync + 'static,
    ) {
        self.insert(Command {
            name: name.into(),
            description: description.into(),
            handler: Handler::Local(Arc::new(f)),
        });
    }

    pub fn register_jsx(
        &mut self,
        name: &str,
        description: &str,
        f: impl Fn(&str, &CommandContext) -> Option<String> + Send + Sync + 'static,
    ) {
        self.insert(Command {
            name: name.into(),
            description: description.into(),
            handler: Handler::LocalJsx(Arc::new(f)),
        });
    }

    fn register_control(&mut self, name: &str, description: &str, action: ControlAction) {
        self.insert(Command {
            name: name.into(),
            description: description.into(),
            handler: Handler::Control(action),
        });
    }

    /// Register a prompt-kind command (built-in or MCP-discovered).  When
    /// invoked it produces one user message naming the command and its
    /// arguments; the resulting turn is processed normally.
    pub fn register_prompt(&mut self, name: &str, description: &str, arg_names: Vec<String>) {
        let command_name = name.to_string();
        self.insert(Command {
            name: name.into(),
            description: description.into(),
            handler: Handler::Prompt(Arc::new(move |args| {
                let rendered = if args.is_empty() {
                    format!("Run the {command_name} command.")
                } else {
                    format!(
                        "Run the {command_name} command with arguments: {args} \
                         (expected: {})",
                        if arg_names.is_empty() {
                            "none".to_string()
                        } else {
                            arg_names.join(", ")
                        }
                    )
                };
                vec![Message::user_text(rendered)]
            })),
        });
    }

    fn insert(&mut self, command: Command) {
        let name = command.name.clone();
        if self.commands.insert(name.clone(), command).is_none() {
            self.order.push(name);
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    fn help_text(&self) -> String {
        let mut lines = vec!["Available commands:".to_string()];
        for name in &self.order {
            if let Some(cmd) = self.commands.get(name) {
                lines.push(format!("  /{name}  {}", cmd.description));
            }
        }
        lines.push("  /help  Show this list".into());
        lines.join("\n")
    }

    /// Dispatch one input line.  Lines not starting with `/` pass through.
    pub fn dispatch(&self, line: &str, ctx: &CommandContext) -> Dispatched {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Dispatched::NotACommand;
        };
        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((n, a)) => (n, a.trim()),
            None => (rest, ""),
        };
        if name.is_empty() {
            return Dispatched::NotACommand;
        }
        if name == "help" {
            return Dispatched::Assistant(wrap_stdout(&self.help_text()));
        }
        let Some(command) = self.commands.get(name) else {
            return Dispatched::Unknown(format!("Unknown command: /{name}"));
        };
        match &command.handler {
            Handler::Control(action) => Dispatched::Control(*action),
            Handler::Local(f) => match f(args, ctx) {
                Ok(output) => Dispatched::Assistant(wrap_stdout(&output)),
                Err(output) => Dispatched::Assistant(wrap_stderr(&output)),
            },
            Handler::LocalJsx(f) => Dispatched::Jsx(f(args, ctx)),
            Handler::Prompt(f) => Dispatched::Prompt(f(args)),
        }
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn wrap_stdout(output: &str) -> Message {
    let body = if output.trim().is_empty() {
        NO_RESPONSE_REQUESTED.to_string()
    } else {
        format!("<local-command-stdout>{output}</local-command-stdout>")
    };
    Message::assistant_text(body, "local")
}

fn wrap_stderr(output: &str) -> Message {
    Message::assistant_text(
        format!("<local-command-stderr>{output}</local-command-stderr>"),
        "local",
    )
}

fn which_bash() -> bool {
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| dir.join("bash").is_file())
        })
        .unwrap_or(false)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
