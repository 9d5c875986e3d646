use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};
use remitrec::application::engine::ReconciliationEngine;
use remitrec::application::ledger::MatchGroup;
use remitrec::application::policy::MatchPolicy;
use remitrec::domain::actor::Actor;
use remitrec::domain::ports::ReconciliationStoreRef;
use remitrec::domain::status::ReconciliationStatus;
use remitrec::infrastructure::in_memory::InMemoryStore;
#[cfg(feature = "storage-rocksdb")]
use remitrec::infrastructure::rocksdb::RocksDBStore;
use remitrec::interfaces::csv::record_reader::RecordReader;
use remitrec::interfaces::csv::record_writer::RecordWriter;
use serde::Serialize;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Bank transactions CSV to register before running the command
    #[arg(long, global = true)]
    transactions: Option<PathBuf>,

    /// Orders CSV to upsert before running the command
    #[arg(long, global = true)]
    orders: Option<PathBuf>,

    /// Identity recorded on every change
    #[arg(long, global = true, default_value = "cli")]
    actor: String,

    /// Allows amount-mismatch overrides
    #[arg(long, global = true)]
    privileged: bool,

    /// JSON file with matching thresholds; missing fields keep their defaults
    #[arg(long, global = true)]
    policy: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Regenerate match suggestions for every unmatched record
    Suggest,
    /// Temporarily match transactions to an order
    Approve {
        #[arg(long)]
        order: String,
        #[arg(long = "tx", required = true)]
        hashes: Vec<String>,
        #[arg(long)]
        override_reason: Option<String>,
    },
    /// Reject a suggested match
    Reject {
        #[arg(long)]
        order: String,
        #[arg(long = "tx")]
        transaction: String,
    },
    /// Undo a temporary match
    Unmatch {
        #[arg(long = "tx")]
        transaction: String,
    },
    /// Reconcile one group from flags, or many from a JSON file
    Reconcile {
        #[arg(long, requires = "hashes")]
        order: Option<String>,
        #[arg(long = "tx")]
        hashes: Vec<String>,
        #[arg(long, conflicts_with = "order")]
        matches: Option<PathBuf>,
    },
    /// Undo reconciliation for transactions of one order
    Unconciliate {
        #[arg(long)]
        order: String,
        #[arg(long = "tx", required = true)]
        hashes: Vec<String>,
    },
    /// Undo every group of a batch
    UndoBatch { batch_id: u64 },
    /// Delete a transaction that is not reconciled
    Remove {
        #[arg(long = "tx")]
        transaction: String,
    },
    /// List bank transactions as CSV
    ListTransactions {
        #[arg(long)]
        status: Option<ReconciliationStatus>,
    },
    /// List orders as CSV
    ListOrders {
        #[arg(long)]
        status: Option<ReconciliationStatus>,
    },
    /// Show reconciled batches as JSON
    Batches,
    /// Audit the links between transactions and orders
    Check,
}

fn open_store(db_path: Option<PathBuf>) -> Result<ReconciliationStoreRef> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = RocksDBStore::open(path).into_diagnostic()?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Arc::new(InMemoryStore::new()))
        }
        None => Ok(Arc::new(InMemoryStore::new())),
    }
}

fn load_policy(path: Option<PathBuf>) -> Result<MatchPolicy> {
    match path {
        Some(path) => {
            let file = File::open(path).into_diagnostic()?;
            serde_json::from_reader(file).into_diagnostic()
        }
        None => Ok(MatchPolicy::default()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{text}");
    Ok(())
}

async fn intake(engine: &ReconciliationEngine, cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.transactions {
        let file = File::open(path).into_diagnostic()?;
        let mut records = Vec::new();
        for row in RecordReader::new(file).transactions() {
            match row {
                Ok(tx) => records.push(tx),
                Err(e) => warn!(error = %e, "Skipping malformed transaction row"),
            }
        }
        let summary = engine
            .register_transactions(records)
            .await
            .into_diagnostic()?;
        info!(inserted = summary.inserted, skipped = summary.skipped, "Transactions loaded");
    }
    if let Some(path) = &cli.orders {
        let file = File::open(path).into_diagnostic()?;
        let mut records = Vec::new();
        for row in RecordReader::new(file).orders() {
            match row {
                Ok(order) => records.push(order),
                Err(e) => warn!(error = %e, "Skipping malformed order row"),
            }
        }
        let summary = engine.upsert_orders(records).await.into_diagnostic()?;
        info!(
            inserted = summary.inserted,
            updated = summary.updated,
            skipped = summary.skipped,
            "Orders loaded"
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();

    let policy = load_policy(cli.policy.clone())?;
    let store = open_store(cli.db_path.clone())?;
    let engine = ReconciliationEngine::new(store, policy);
    let actor = Actor {
        id: cli.actor.clone(),
        privileged: cli.privileged,
    };

    intake(&engine, &cli).await?;

    match cli.command {
        Command::Suggest => {
            let report = engine.run_suggestions().await.into_diagnostic()?;
            print_json(&report)?;
        }
        Command::Approve {
            order,
            hashes,
            override_reason,
        } => {
            engine
                .approve_match(&actor, &hashes, &order, override_reason.as_deref())
                .await
                .into_diagnostic()?;
            println!("approved {} transaction(s) for order {}", hashes.len(), order);
        }
        Command::Reject { order, transaction } => {
            engine
                .reject_suggestion(&actor, &transaction, &order)
                .await
                .into_diagnostic()?;
            println!("rejected suggestion {} -> {}", transaction, order);
        }
        Command::Unmatch { transaction } => {
            engine.unmatch(&actor, &transaction).await.into_diagnostic()?;
            println!("unmatched {}", transaction);
        }
        Command::Reconcile {
            order,
            hashes,
            matches,
        } => {
            let groups = match (order, matches) {
                (Some(order), None) => vec![MatchGroup::new(order, hashes)],
                (None, Some(path)) => {
                    let file = File::open(path).into_diagnostic()?;
                    serde_json::from_reader(file).into_diagnostic()?
                }
                _ => return Err(miette!("reconcile needs either --order with --tx, or --matches")),
            };
            let receipt = engine
                .reconcile_batch(&actor, &groups)
                .await
                .into_diagnostic()?;
            print_json(&receipt)?;
        }
        Command::Unconciliate { order, hashes } => {
            engine
                .unconciliate(&actor, &hashes, &order)
                .await
                .into_diagnostic()?;
            println!("unconciliated {} transaction(s) from order {}", hashes.len(), order);
        }
        Command::UndoBatch { batch_id } => {
            let orders = engine.undo_batch(&actor, batch_id).await.into_diagnostic()?;
            println!("undid batch {} ({} order(s))", batch_id, orders);
        }
        Command::Remove { transaction } => {
            engine
                .remove_transaction(&actor, &transaction)
                .await
                .into_diagnostic()?;
            println!("removed {}", transaction);
        }
        Command::ListTransactions { status } => {
            let transactions = engine.list_transactions(status).await.into_diagnostic()?;
            let stdout = io::stdout();
            RecordWriter::new(stdout.lock())
                .write_transactions(&transactions)
                .into_diagnostic()?;
        }
        Command::ListOrders { status } => {
            let orders = engine.list_orders(status).await.into_diagnostic()?;
            let stdout = io::stdout();
            RecordWriter::new(stdout.lock())
                .write_orders(&orders)
                .into_diagnostic()?;
        }
        Command::Batches => {
            let batches = engine.reconciled_batches().await.into_diagnostic()?;
            print_json(&batches)?;
        }
        Command::Check => {
            let violations = engine.check_consistency().await.into_diagnostic()?;
            print_json(&violations)?;
            if !violations.is_empty() {
                return Err(miette!("{} consistency violation(s) found", violations.len()));
            }
        }
    }

    Ok(())
}
