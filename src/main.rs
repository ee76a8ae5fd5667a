//! `feedshape`: migrate, verify, and audit the BharathVA feed database.

#![deny(missing_debug_implementations, unsafe_code, unused_import_braces, unused_qualifications)]

use std::path::PathBuf;
use std::process;
use clap::{ Parser, Subcommand, ValueEnum };
use tracing_subscriber::EnvFilter;
use mongodb::{ Client, ThreadedClient };
use feedshape::{
    bootstrap::BootstrapStrategy,
    config::{ Config, Overrides },
    event::TracingSink,
    runner::{ Runner, ExitStatus },
    verify::{ verify, Verdict },
    model::{ audit::audit_collection, seed },
    ledger,
    error::{ Result, ResultExt },
};

#[derive(Debug, Parser)]
#[command(name = "feedshape", version, about = "Idempotent schema evolution for the BharathVA feed database")]
struct Cli {
    /// JSON configuration file; flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// MongoDB connection string
    #[arg(long, env = "MONGODB_URI", global = true)]
    uri: Option<String>,

    /// Target database
    #[arg(long = "db", global = true)]
    database_name: Option<String>,

    /// Collection to process (repeatable); defaults to all known collections
    #[arg(long = "collection", global = true)]
    collections: Vec<String>,

    /// Report what would change without changing anything
    #[arg(long, global = true)]
    dry_run: bool,

    /// How a missing collection is created
    #[arg(long, global = true, value_enum)]
    bootstrap: Option<BootstrapArg>,

    /// Record each run in the `_migration_runs` collection
    #[arg(long, global = true)]
    ledger: bool,

    /// Print run records as JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Bootstrap, index, backfill, and verify every configured collection
    Migrate,
    /// Only verify; never writes
    Verify,
    /// Decode every document into its typed model; never writes
    Audit,
    /// Insert sample documents, legacy shapes included
    Seed,
    /// List the runs recorded in the ledger
    History,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BootstrapArg {
    /// Explicit create, sentinel probe if unsupported
    Auto,
    /// Always the insert-then-delete sentinel probe
    Sentinel,
}

impl From<BootstrapArg> for BootstrapStrategy {
    fn from(arg: BootstrapArg) -> Self {
        match arg {
            BootstrapArg::Auto => BootstrapStrategy::Auto,
            BootstrapArg::Sentinel => BootstrapStrategy::Sentinel,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let status = match run(cli) {
        Ok(status) => status,
        Err(error) => {
            eprintln!("feedshape: {}", error);
            ExitStatus::Fatal
        }
    };

    process::exit(status.code());
}

fn run(cli: Cli) -> Result<ExitStatus> {
    let overrides = Overrides {
        uri: cli.uri,
        database_name: cli.database_name,
        collection_names: cli.collections,
        dry_run: cli.dry_run,
        bootstrap: cli.bootstrap.map(Into::into),
        ledger: cli.ledger,
    };
    let config = Config::load(cli.config.as_deref(), overrides)?;
    let json = cli.json;

    let client = Client::with_uri(&config.uri)
        .chain(|| format!("can't connect to {}", config.uri))?;
    let db = client.db(&config.database_name);

    match cli.command {
        Command::Migrate => {
            let targets = config.targets()?;
            let runner = Runner::new(&db, &config.database_name).options(config.run_options());
            let records = runner.run_all(&targets, &mut TracingSink);

            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for record in &records {
                    print!("{}", record);
                }
            }

            Ok(ExitStatus::of_all(&records))
        }
        Command::Verify => {
            let mut status = ExitStatus::Pass;

            for target in config.targets()? {
                let report = verify(&db, &target, &mut TracingSink);

                if json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    println!("{}: {} ({} indexes, {} documents)",
                             target.name, report.verdict,
                             report.final_index_count, report.final_document_count);
                    for discrepancy in &report.discrepancies {
                        println!("  {}", discrepancy);
                    }
                }

                if report.verdict == Verdict::ReportedDiscrepancy {
                    status = ExitStatus::Discrepancy;
                }
            }

            Ok(status)
        }
        Command::Audit => {
            let mut status = ExitStatus::Pass;

            for name in &config.collection_names {
                let report = audit_collection(&db, name)?;

                if json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    print!("{}", report);
                }

                if !report.is_clean() {
                    status = ExitStatus::Discrepancy;
                }
            }

            Ok(status)
        }
        Command::Seed => {
            if config.dry_run {
                let feeds = seed::sample_feeds()?.len();
                let notifications = seed::sample_notifications()?.len();
                println!("would insert {} feeds and {} notifications", feeds, notifications);
            } else {
                let report = seed::seed(&db)?;
                println!("seeded {}: {} inserted, {} already present",
                         config.database_name, report.inserted, report.skipped);
            }

            Ok(ExitStatus::Pass)
        }
        Command::History => {
            let entries = ledger::history(&db)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in &entries {
                    let verdict = entry.verdict.map_or_else(|| String::from("-"), |v| v.to_string());
                    let finished = entry.finished_at.as_ref().map_or_else(|| String::from("-"), |t| t.0.to_rfc3339());
                    println!("{}  {}  {}.{}  {} indexes created, {} documents modified, {}",
                             finished, entry.run_id, entry.database_name, entry.collection_name,
                             entry.indexes_created, entry.documents_modified, verdict);
                }
            }

            Ok(ExitStatus::Pass)
        }
    }
}
