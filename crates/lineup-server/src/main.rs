//! lineup CLI: inspect and reorder scopes in a SQLite order store.
//!
//! Usage:
//!   lineup --db lineup.db insert profile-42/buttons
//!   lineup insert profile-42/buttons --before <item> --after <item>
//!   lineup move profile-42/buttons <item> --before <item>
//!   lineup list profile-42/buttons
//!   lineup check profile-42/buttons
//!
//! Scopes are UUIDs or labels; a label always names the same scope.
//! Results print as JSON on stdout, logs go to stderr.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt};

use lineup_server::{Host, LineupConfig, parse_scope};
use lineup_types::ItemId;

#[derive(Parser, Debug)]
#[command(name = "lineup")]
#[command(about = "Rank-keyed ordering for user-arranged lists")]
struct Args {
    /// SQLite database holding the order table
    #[arg(long, default_value = "lineup.db")]
    db: PathBuf,

    /// RON config file
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a scope's items in order
    List { scope: String },
    /// List every scope with items
    Scopes,
    /// Add an item (a fresh id unless --item is given)
    Insert {
        scope: String,
        #[arg(long)]
        item: Option<ItemId>,
        /// Item that should end up right before the new one
        #[arg(long)]
        before: Option<ItemId>,
        /// Item that should end up right after the new one
        #[arg(long)]
        after: Option<ItemId>,
    },
    /// Reposition an existing item
    Move {
        scope: String,
        item: ItemId,
        #[arg(long)]
        before: Option<ItemId>,
        #[arg(long)]
        after: Option<ItemId>,
    },
    /// Delete an item's row
    Remove { scope: String, item: ItemId },
    /// Respace every rank in a scope
    Rebalance { scope: String },
    /// Report spacing health for a scope
    Check { scope: String },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Inserted {
    item_id: ItemId,
    rank: String,
}

#[derive(Serialize)]
struct Removed {
    removed: bool,
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = LineupConfig::load_or_default(args.config.as_deref())
        .with_context(|| format!("loading config {:?}", args.config))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let host = Host::open(&args.db, config)
        .with_context(|| format!("opening {}", args.db.display()))?;

    match args.command {
        Command::List { scope } => print_json(&host.list(parse_scope(&scope))?),
        Command::Scopes => print_json(&host.scopes()?),
        Command::Insert {
            scope,
            item,
            before,
            after,
        } => {
            let item = item.unwrap_or_default();
            let committed = host.insert(parse_scope(&scope), item, before, after).await?;
            print_json(&Inserted {
                item_id: item,
                rank: committed.rank.to_string(),
            })
        }
        Command::Move {
            scope,
            item,
            before,
            after,
        } => print_json(&host.move_item(parse_scope(&scope), item, before, after).await?),
        Command::Remove { scope, item } => print_json(&Removed {
            removed: host.remove(parse_scope(&scope), item)?,
        }),
        Command::Rebalance { scope } => print_json(&host.rebalance(parse_scope(&scope))?),
        Command::Check { scope } => print_json(&host.check(parse_scope(&scope))?),
    }
}
