use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

mod cli;
mod config;
mod indexer;
mod mcp;
mod output;
mod query;
mod server;
mod storage;
mod watcher;

use cli::config_cmd::ConfigArgs;
use cli::repos::ReposCommands;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CTXHELPR_BUILD_TARGET"),
    ", built ",
    env!("CTXHELPR_BUILD_DATE"),
    ")",
);

#[derive(Parser)]
#[command(name = "ctxhelpr", about = "Semantic code indexing for Claude Code", long_version = LONG_VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Internal: MCP server started automatically by Claude Code (not for manual use)
    Serve,
    /// One-shot manual index of a repository (the MCP server otherwise indexes lazily)
    Index {
        /// Repository path (defaults to the current directory)
        path: Option<std::path::PathBuf>,
    },
    /// Manage project configuration (.ctxhelpr.json)
    Config(ConfigArgs),
    /// Manage indexed repositories
    Repos {
        #[command(subcommand)]
        command: ReposCommands,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Serve) => server::run().await,
        Some(Commands::Index { path }) => cli::index::run(path),
        Some(Commands::Config(args)) => cli::config_cmd::run(args),
        Some(Commands::Repos { command }) => cli::repos::run(command),
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}
