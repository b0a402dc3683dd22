//! CLI argument structs for all subcommands.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Branch to index (default: the repository's default branch)
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Index only history after this ref (its dependency set seeds the
    /// state)
    #[arg(long, value_name = "REF")]
    pub from: Option<String>,

    /// Drop any existing index and rebuild from scratch
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct UpdateArgs {
    /// Branch to update (default: the repository's default branch)
    #[arg(short, long)]
    pub branch: Option<String>,
}

#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Commit to reconstruct at (any ref-ish; default: the branch tip)
    #[arg(long, value_name = "REF")]
    pub at: Option<String>,

    /// Branch whose history to query (default: the repository's default
    /// branch)
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Emit JSON instead of columns
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct LogArgs {
    /// Package name to show the change history for
    pub package: String,

    /// Restrict to one branch's history (default: all indexed history)
    #[arg(short, long)]
    pub branch: Option<String>,
}

#[derive(Parser, Debug)]
pub struct DiffArgs {
    /// Older ref
    pub from: String,

    /// Newer ref
    pub to: String,

    /// Branch whose history to query (default: the repository's default
    /// branch)
    #[arg(short, long)]
    pub branch: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum BranchCommand {
    /// Track a branch and run a full index over it
    Add {
        /// Branch name
        name: String,
    },

    /// Stop tracking a branch (indexed commits shared with other branches
    /// are kept)
    Remove {
        /// Branch name
        name: String,
    },

    /// List tracked branches
    List,
}
