// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use kode_config::GlobalConfig;
use kode_core::{
    AgentEvent, CommandContext, CommandRegistry, ControlAction, Conversation,
    ConversationOptions, Dispatched, RequestContext, RequestType,
};
use kode_mcp_client::McpRegistry;
use kode_model::{ContentBlock, Message, MockProvider, ModelProvider};
use kode_tools::{
    registry::builtin_registry, PermissionGate, PermissionHandler, PermissionOutcome,
    PermissionRequest,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(cmd) = &cli.command {
        match cmd {
            Commands::Completions { shell } => {
                cli::print_completions(*shell);
                return Ok(());
            }
            Commands::ShowConfig => {
                let config = load_config(&cli)?;
                println!("{}", serde_json::to_string_pretty(&config)?);
                return Ok(());
            }
            Commands::Mcp => {
                let config = load_config(&cli)?;
                let cwd = resolve_cwd(&cli)?;
                let registry = McpRegistry::startup(&config, &cwd).await;
                if registry.list_clients().is_empty() {
                    println!("No MCP servers configured.");
                }
                for client in registry.list_clients() {
                    println!(
                        "{}: {}",
                        client.name(),
                        if client.is_failed() { "failed" } else { "connected" }
                    );
                }
                return Ok(());
            }
        }
    }

    run_repl(cli).await
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "info" } else { "warn" })
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<GlobalConfig> {
    // A malformed config falls back to defaults unless strict mode was
    // persisted in a previous (valid) config.
    let explicit = cli.config.as_deref();
    match kode_config::load_strict_from(explicit) {
        Ok(config) => Ok(config),
        Err(e) => {
            let fallback = kode_config::load_global_config_from(explicit);
            if fallback.strict_config {
                anyhow::bail!("{e}");
            }
            Ok(fallback)
        }
    }
}

fn resolve_cwd(cli: &Cli) -> anyhow::Result<PathBuf> {
    match &cli.cwd {
        Some(dir) => Ok(dir.clone()),
        None => std::env::current_dir().context("resolving working directory"),
    }
}

/// Interactive permission prompt on stdin.  Runs while the driver awaits the
/// gate, so it never competes with the REPL's own line reading.
struct TerminalPermissionHandler;

#[async_trait]
impl PermissionHandler for TerminalPermissionHandler {
    async fn request(&self, req: PermissionRequest) -> PermissionOutcome {
        let prompt = format!(
            "\n[permission] {} (risk: {:?})\n  input: {}\n  [y] allow once  [a] always allow  [n] reject  [q] abort > ",
            req.description, req.risk, req.input
        );
        let answer = tokio::task::spawn_blocking(move || {
            print!("{prompt}");
            let _ = std::io::stdout().flush();
            let mut line = String::new();
            let _ = std::io::stdin().read_line(&mut line);
            line.trim().to_lowercase()
        })
        .await
        .unwrap_or_default();
        match answer.as_str() {
            "y" | "yes" => PermissionOutcome::AllowTemporary,
            "a" | "always" => PermissionOutcome::AllowPermanent,
            "q" | "abort" => PermissionOutcome::Abort,
            _ => PermissionOutcome::Reject { remember: false },
        }
    }
}

async fn run_repl(cli: Cli) -> anyhow::Result<()> {
    let mut config = load_config(&cli)?;
    let config_path = cli.config.clone();
    let cwd = resolve_cwd(&cli)?;
    let project_key = cwd.display().to_string();

    config.num_startups += 1;
    if let Err(e) = kode_config::save_global_config_to(config_path.as_deref(), &config) {
        tracing::warn!(error = %e, "could not persist startup count");
    }

    // Model selection is pointer-based; only the mock provider ships with
    // the CLI, real drivers plug in through the ModelProvider seam.
    let model: Arc<dyn ModelProvider> = Arc::new(MockProvider);
    if config.model_pointers.main != "mock" {
        tracing::warn!(
            model = %config.model_pointers.main,
            "no driver for the configured model; using the mock provider"
        );
    }

    // Tools: built-ins plus everything the connected MCP servers export.
    let mcp = McpRegistry::startup(&config, &cwd).await;
    let mut tools = builtin_registry();
    for tool in mcp.list_tools().await {
        tools.register_arc(tool);
    }
    let tools = Arc::new(tools);

    let mode = cli
        .permission_mode
        .unwrap_or(config.default_permission_mode);
    let persist_key = project_key.clone();
    let persist_path = config_path.clone();
    let gate = Arc::new(
        PermissionGate::new(mode, config.bypass_permissions_allowed, Box::new(TerminalPermissionHandler))
            .with_approved(config.project(&project_key).allowed_tools.clone())
            .with_persist(move |key| {
                let mut cfg = kode_config::load_global_config_from(persist_path.as_deref());
                let project = cfg.project_mut(&persist_key);
                if !project.allowed_tools.iter().any(|k| k == key) {
                    project.allowed_tools.push(key.to_string());
                }
                if let Err(e) = kode_config::save_global_config_to(persist_path.as_deref(), &cfg)
                {
                    tracing::warn!(error = %e, "could not persist permission");
                }
            }),
    );

    let mut context_vars = BTreeMap::new();
    context_vars.insert("cwd".to_string(), project_key.clone());
    for (key, value) in config.project(&project_key).context {
        context_vars.insert(key, value);
    }

    let options = ConversationOptions {
        context_vars,
        compaction: config.compaction.clone(),
        tools_config: config.tools.clone(),
        cwd: cwd.clone(),
        ..Default::default()
    };
    let mut conversation = Conversation::new(model.clone(), tools, Arc::clone(&gate), options);

    let mut commands = CommandRegistry::builtin();
    for prompt in mcp.list_prompts().await {
        commands.register_prompt(&prompt.name, &prompt.description, prompt.arguments);
    }

    let mcp_status: Vec<(String, bool)> = mcp
        .list_clients()
        .iter()
        .map(|c| (c.name().to_string(), !c.is_failed()))
        .collect();

    println!("kode: type a prompt, /help for commands, ctrl-d to exit.");
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = read_line().await? else {
            break;
        };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        record_history(config_path.as_deref(), &project_key, &line);

        let command_ctx = CommandContext {
            cwd: cwd.clone(),
            mode: gate.mode(),
            model_name: model.model_name().to_string(),
            mcp_status: mcp_status.clone(),
        };
        match commands.dispatch(&line, &command_ctx) {
            Dispatched::NotACommand => {
                submit(&mut conversation, vec![Message::user_text(&line)]).await?;
            }
            Dispatched::Unknown(message) => println!("{message}"),
            Dispatched::Assistant(msg) => println!("{}", msg.text()),
            Dispatched::Jsx(output) => {
                if let Some(text) = output {
                    println!("{text}");
                }
            }
            Dispatched::Prompt(messages) => {
                submit(&mut conversation, messages).await?;
            }
            Dispatched::Control(ControlAction::Clear) => {
                conversation.clear();
                println!("History cleared.");
            }
            Dispatched::Control(ControlAction::Compact) => {
                let outcome = conversation.compact().await;
                println!(
                    "Compacted: {} → {} tokens ({})",
                    outcome.tokens_before, outcome.tokens_after, outcome.strategy
                );
            }
        }
    }
    Ok(())
}

/// Append the prompt to the project's command history, keeping the last 100.
fn record_history(config_path: Option<&Path>, project_key: &str, line: &str) {
    let mut cfg = kode_config::load_global_config_from(config_path);
    let project = cfg.project_mut(project_key);
    project.history.push(line.to_string());
    let excess = project.history.len().saturating_sub(100);
    if excess > 0 {
        project.history.drain(..excess);
    }
    if let Err(e) = kode_config::save_global_config_to(config_path, &cfg) {
        tracing::warn!(error = %e, "could not persist command history");
    }
}

async fn read_line() -> anyhow::Result<Option<String>> {
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(line)),
            Err(e) => Err(e.into()),
        }
    })
    .await?
}

/// Drive one request to completion, printing streamed events.  Ctrl-C maps
/// to request abort; cancellation is a successful exit.
async fn submit(conversation: &mut Conversation, messages: Vec<Message>) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel(256);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(event);
        }
    });

    let request = RequestContext::new(RequestType::Query);
    let aborter = request.clone();
    let submit_fut = conversation.submit_messages(messages, tx, request);
    tokio::pin!(submit_fut);
    loop {
        tokio::select! {
            result = &mut submit_fut => {
                result?;
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                aborter.abort();
            }
        }
    }
    let _ = printer.await;
    Ok(())
}

fn print_event(event: AgentEvent) {
    match event {
        AgentEvent::Message(Message::Assistant(a)) => {
            for block in &a.content {
                match block {
                    ContentBlock::Text { text } => println!("{text}"),
                    ContentBlock::ToolUse { name, input, .. } => {
                        println!("[tool use] {name} {input}");
                    }
                    _ => {}
                }
            }
        }
        AgentEvent::Message(Message::Progress(p)) => {
            for block in &p.content.content {
                if let ContentBlock::Text { text } = block {
                    eprintln!("  … {text}");
                }
            }
        }
        AgentEvent::Message(Message::User(u)) => {
            for block in &u.content {
                if let ContentBlock::ToolResult {
                    content, is_error, ..
                } = block
                {
                    let text = content.as_text();
                    let first = text.lines().next().unwrap_or("");
                    if *is_error {
                        eprintln!("  [tool error] {first}");
                    } else {
                        eprintln!("  [tool result] {first}");
                    }
                }
            }
        }
        AgentEvent::ContextCompacted {
            tokens_before,
            tokens_after,
            strategy,
        } => {
            eprintln!("[context compacted: {tokens_before} → {tokens_after} tokens, {strategy}]");
        }
        AgentEvent::TurnStart { .. } | AgentEvent::TurnComplete => {}
        AgentEvent::Error(e) => eprintln!("[error] {e}"),
    }
}
