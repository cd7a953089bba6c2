//! Operator CLI
//!
//! Every subcommand loads the configuration, opens the store inside a
//! [`Database::scoped`](crate::infrastructure::database::Database::scoped) block
//! and closes it before exiting:
//! - `provision`: create both containers
//! - `history` / `record`: read and append conversation turns
//! - `lookup` / `remember`: query and fill the semantic cache
//! - `sweep`: purge expired documents once

pub mod cache;
pub mod context;
pub mod history;
pub mod maintenance;

use clap::{Parser, Subcommand};

/// Conversation history and semantic response cache
#[derive(Parser)]
#[command(name = "convo-cache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the history and cache containers if they are missing
    Provision,

    /// Print the stored turns of a user
    History(history::HistoryArgs),

    /// Append one turn to a user's history
    Record(history::RecordArgs),

    /// Look a query up in the semantic cache
    Lookup(cache::LookupArgs),

    /// Cache a JSON result for a query
    Remember(cache::RememberArgs),

    /// Purge expired documents from both containers
    Sweep,
}

/// Dispatch a parsed command line
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let context = context::CliContext::load()?;

    match cli.command {
        Command::Provision => maintenance::provision(&context).await,
        Command::History(args) => history::show(&context, args).await,
        Command::Record(args) => history::record(&context, args).await,
        Command::Lookup(args) => cache::lookup(&context, args).await,
        Command::Remember(args) => cache::remember(&context, args).await,
        Command::Sweep => maintenance::sweep(&context).await,
    }
}
