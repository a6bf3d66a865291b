// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use kode_config::PolicyMode;

#[derive(Parser, Debug)]
#[command(name = "kode", version, about = "An interactive terminal AI coding assistant")]
pub struct Cli {
    /// Path to the config file (default: ~/.config/kode/config.json).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Working directory for tools and project-scoped config.
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Initial permission policy mode.
    #[arg(long, value_enum)]
    pub permission_mode: Option<PolicyMode>,

    /// Log to stderr (RUST_LOG still applies).
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the merged configuration as JSON.
    ShowConfig,
    /// Show configured MCP servers and their connection status.
    Mcp,
    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
}
