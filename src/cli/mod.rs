//! CLI layer: argument parsing, command dispatch, and subcommand
//! implementations. Results go to stdout, diagnostics to stderr.

pub mod args;

pub use args::*;

use std::collections::HashMap;
use std::path::Path;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use git_pkgs::{ChangeType, Dependency};

use crate::branches::BranchManager;
use crate::config::Config;
use crate::error::PkgsError;
use crate::git::{Git2Reader, GitReader};
use crate::indexer::{IndexOutcome, Indexer};
use crate::parsers::ParserRegistry;
use crate::reconstruct::{self, Reconstructor};
use crate::store::{BranchRow, Store};

// ─── CLI ─────────────────────────────────────────────────────────────

/// Index a repository's package dependency history and run time-travel
/// queries over it
#[derive(Parser, Debug)]
#[command(name = "git-pkgs", version, about, after_help = "\
Run 'git-pkgs <COMMAND> --help' for detailed options.\n\
Start with 'git-pkgs init', then query with 'show', 'log', and 'diff'.")]
pub(crate) struct Cli {
    /// Log filter (overrides RUST_LOG), e.g. "info" or "git_pkgs=debug"
    #[arg(long, global = true, value_name = "FILTER")]
    pub log: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Build the dependency history index for a branch
    Init(InitArgs),

    /// Bring a branch's index up to date with its tip
    Update(UpdateArgs),

    /// Manage tracked branches
    #[command(subcommand)]
    Branch(BranchCommand),

    /// Show the dependency set at a commit
    Show(ShowArgs),

    /// Show the change history of one package
    Log(LogArgs),

    /// Compare the dependency sets at two commits
    Diff(DiffArgs),

    /// Show index totals
    Stats,
}

// ─── Main entry point ───────────────────────────────────────────────

pub fn run() {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref());

    if let Err(e) = dispatch(cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(filter: Option<&str>) {
    let filter = match filter {
        Some(f) => EnvFilter::new(f),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Per-process context: reader, config, registry, resolved store path.
struct Context {
    reader: Git2Reader,
    config: Config,
    registry: ParserRegistry,
    store_path: std::path::PathBuf,
}

impl Context {
    fn open() -> Result<Self, PkgsError> {
        let reader = Git2Reader::open(Path::new("."))?;
        let config = Config::from_repo(reader.repo());
        let registry = ParserRegistry::new(&config);
        let store_path = config.store_path(reader.git_dir());
        Ok(Self { reader, config, registry, store_path })
    }

    fn branch_or_default(&self, branch: Option<String>) -> Result<String, PkgsError> {
        match branch {
            Some(b) => Ok(b),
            None => self.reader.default_branch(),
        }
    }

    fn open_store(&self) -> Result<Store, PkgsError> {
        Store::open(&self.store_path)
    }

    fn tracked_branch(&self, store: &Store, name: &str) -> Result<BranchRow, PkgsError> {
        store
            .branch_by_name(name)?
            .ok_or_else(|| PkgsError::BranchNotTracked(name.to_string()))
    }
}

fn dispatch(command: Commands) -> Result<(), PkgsError> {
    let ctx = Context::open()?;
    match command {
        Commands::Init(args) => cmd_init(&ctx, args),
        Commands::Update(args) => cmd_update(&ctx, args),
        Commands::Branch(cmd) => cmd_branch(&ctx, cmd),
        Commands::Show(args) => cmd_show(&ctx, args),
        Commands::Log(args) => cmd_log(&ctx, args),
        Commands::Diff(args) => cmd_diff(&ctx, args),
        Commands::Stats => cmd_stats(&ctx),
    }
}

// ─── Index commands ─────────────────────────────────────────────────

fn cmd_init(ctx: &Context, args: InitArgs) -> Result<(), PkgsError> {
    if args.force {
        Store::destroy(&ctx.store_path)?;
    }
    let mut store = Store::create(&ctx.store_path)?;
    let branch = ctx.branch_or_default(args.branch)?;

    let indexer = Indexer::new(&ctx.reader, &ctx.registry, &ctx.config);
    let outcome = indexer.init(&mut store, &branch, args.from.as_deref())?;
    print_outcome(&outcome);
    Ok(())
}

fn cmd_update(ctx: &Context, args: UpdateArgs) -> Result<(), PkgsError> {
    let mut store = ctx.open_store()?;
    let branch = ctx.branch_or_default(args.branch)?;

    let indexer = Indexer::new(&ctx.reader, &ctx.registry, &ctx.config);
    let outcome = indexer.update(&mut store, &branch)?;
    if outcome.commits == 0 {
        eprintln!("Branch '{}' is already up to date.", outcome.branch);
    } else {
        print_outcome(&outcome);
    }
    Ok(())
}

fn print_outcome(outcome: &IndexOutcome) {
    eprintln!(
        "Indexed {} commit(s) on '{}': {} with dependency changes, {} change row(s), {} snapshot(s).",
        outcome.commits, outcome.branch, outcome.dep_commits, outcome.changes, outcome.snapshots
    );
}

fn cmd_branch(ctx: &Context, cmd: BranchCommand) -> Result<(), PkgsError> {
    let manager = BranchManager::new(&ctx.reader, &ctx.registry, &ctx.config);
    match cmd {
        BranchCommand::Add { name } => {
            let mut store = Store::create(&ctx.store_path)?;
            let outcome = manager.add(&mut store, &name)?;
            print_outcome(&outcome);
        }
        BranchCommand::Remove { name } => {
            let mut store = ctx.open_store()?;
            if manager.remove(&mut store, &name)? {
                eprintln!("Branch '{}' removed from tracking.", name);
            } else {
                eprintln!("Branch '{}' was not tracked.", name);
            }
        }
        BranchCommand::List => {
            let store = ctx.open_store()?;
            let stats = manager.list(&store)?;
            if stats.is_empty() {
                println!("No tracked branches.");
            }
            for branch in stats {
                let cursor = branch
                    .last_indexed_hash
                    .as_deref()
                    .map(|h| h[..8.min(h.len())].to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<24} {:>8} commits {:>8} with deps  @ {}",
                    branch.name, branch.commit_count, branch.dep_commit_count, cursor
                );
            }
        }
    }
    Ok(())
}

// ─── Query commands ─────────────────────────────────────────────────

fn cmd_show(ctx: &Context, args: ShowArgs) -> Result<(), PkgsError> {
    let branch = ctx.branch_or_default(args.branch)?;
    let at = match &args.at {
        Some(refish) => ctx
            .reader
            .resolve_ref(refish)?
            .ok_or_else(|| PkgsError::RefUnresolvable(refish.clone()))?,
        None => ctx.reader.branch_tip(&branch)?,
    };

    let deps = if ctx.store_path.exists() {
        let store = ctx.open_store()?;
        let branch_row = ctx.tracked_branch(&store, &branch)?;
        Reconstructor::new(&store).at_commit(&branch_row, &at)?
    } else {
        eprintln!("No index found; parsing the tree at {} directly.", &at[..8]);
        reconstruct::stateless(&ctx.reader, &ctx.registry, &at)?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&deps).expect("serializable"));
        return Ok(());
    }
    for dep in &deps {
        println!(
            "{:<32} {:<20} {:<12} {:<10} {}",
            dep.name,
            dep.requirement,
            dep.ecosystem,
            dep.kind.as_str(),
            dep.manifest_path
        );
    }
    eprintln!("{} dependencies at {}.", deps.len(), &at[..8]);
    Ok(())
}

fn cmd_log(ctx: &Context, args: LogArgs) -> Result<(), PkgsError> {
    let store = ctx.open_store()?;
    let branch_id = match &args.branch {
        Some(name) => Some(ctx.tracked_branch(&store, name)?.id),
        None => None,
    };

    let entries = store.changes_for_package(&args.package, branch_id)?;
    if entries.is_empty() {
        eprintln!("No recorded changes for '{}'.", args.package);
        return Ok(());
    }
    for entry in entries {
        let date = chrono::DateTime::from_timestamp(entry.committed_at, 0)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "?".to_string());
        let transition = match (&entry.change_type, &entry.previous_requirement) {
            (ChangeType::Modified, Some(prev)) => {
                format!("{} -> {}", prev, entry.requirement)
            }
            _ => entry.requirement.clone(),
        };
        println!(
            "{} {} {:<9} {:<24} {:<28} {} <{}> {}/{} ({})",
            date,
            &entry.commit_hash[..8],
            entry.change_type.as_str(),
            entry.name,
            transition,
            entry.author_name,
            entry.author_email,
            entry.ecosystem,
            entry.dependency_type,
            entry.manifest_path
        );
    }
    Ok(())
}

fn cmd_diff(ctx: &Context, args: DiffArgs) -> Result<(), PkgsError> {
    let store = ctx.open_store()?;
    let branch = ctx.branch_or_default(args.branch)?;
    let branch_row = ctx.tracked_branch(&store, &branch)?;

    let resolve = |refish: &str| -> Result<String, PkgsError> {
        ctx.reader
            .resolve_ref(refish)?
            .ok_or_else(|| PkgsError::RefUnresolvable(refish.to_string()))
    };
    let reconstructor = Reconstructor::new(&store);
    let from = reconstructor.at_commit(&branch_row, &resolve(&args.from)?)?;
    let to = reconstructor.at_commit(&branch_row, &resolve(&args.to)?)?;

    let from_map: HashMap<(String, String), &Dependency> =
        from.iter().map(|d| ((d.manifest_path.clone(), d.name.clone()), d)).collect();
    let to_map: HashMap<(String, String), &Dependency> =
        to.iter().map(|d| ((d.manifest_path.clone(), d.name.clone()), d)).collect();

    for dep in &to {
        let key = (dep.manifest_path.clone(), dep.name.clone());
        match from_map.get(&key) {
            None => println!("+ {:<32} {} ({})", dep.name, dep.requirement, dep.manifest_path),
            Some(old) if old.requirement != dep.requirement => println!(
                "~ {:<32} {} -> {} ({})",
                dep.name, old.requirement, dep.requirement, dep.manifest_path
            ),
            Some(_) => (),
        }
    }
    for dep in &from {
        let key = (dep.manifest_path.clone(), dep.name.clone());
        if !to_map.contains_key(&key) {
            println!("- {:<32} {} ({})", dep.name, dep.requirement, dep.manifest_path);
        }
    }
    Ok(())
}

fn cmd_stats(ctx: &Context) -> Result<(), PkgsError> {
    let store = ctx.open_store()?;
    let totals = store.totals()?;
    println!("commits        {}", totals.commits);
    println!("  with deps    {}", totals.dep_commits);
    println!("branches       {}", totals.branches);
    println!("manifests      {}", totals.manifests);
    println!("changes        {}", totals.changes);
    println!("snapshot rows  {}", totals.snapshot_rows);
    Ok(())
}
