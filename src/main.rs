use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result, WrapErr};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use strata_core::{OutputFormat, StrataConfig};
use strata_gitpulse::mining::GitBackend;
use strata_ingest::{repository_name, IngestReport, IngestionCoordinator};
use strata_store::{ChurnReport, LineageEntry, Store, YearStats};

#[derive(Parser)]
#[command(
    name = "strata",
    version,
    about = "Replay git history into a queryable record of files, renames and line changes",
    long_about = "Strata walks a branch oldest-first and records every commit, file identity,\n\
                   rename chain, file size and changed line in a SQLite database.\n\
                   Runs are resumable: commits already stored are skipped.\n\n\
                   Examples:\n  \
                     strata init                          Create a .strata.toml config file\n  \
                     strata ingest --repo . --workers 4   Mine the current repository\n  \
                     strata stats                         Per-year activity summary\n  \
                     strata lineage src/lib.rs            Rename chain of a file\n  \
                     strata churn --since 2024-01-01      Lines changed since a date"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: .strata.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text  Human-readable summaries (default)\n  \
                         json  Machine-readable JSON with camelCase keys"
    )]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Database file (overrides [database] path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Repository path (default: current directory)
    #[arg(long, global = true, default_value = ".")]
    repo: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Create a default .strata.toml in the current directory
    Init,
    /// Ingest every commit of a branch not yet in the database
    #[command(long_about = "Ingest every commit of a branch not yet in the database.\n\n\
        Commits are prepared by a pool of workers and written in branch order by a\n\
        single writer. A failed commit stops the run; it and every later commit are\n\
        retried on the next run.\n\n\
        Examples:\n  strata ingest --repo ../linux --branch master\n  strata ingest --workers 8 --format json")]
    Ingest {
        /// Branch to replay (overrides [mining] branch)
        #[arg(long)]
        branch: Option<String>,

        /// Number of diff workers (overrides [mining] workers)
        #[arg(long)]
        workers: Option<usize>,

        /// Do not store individual changed lines
        #[arg(long)]
        no_lines: bool,
    },
    /// Per-year activity of the ingested history
    Stats {
        /// Largest commits listed per year (default: 5)
        #[arg(long, default_value = "5")]
        top: usize,
    },
    /// Show the rename chain of a file
    Lineage {
        /// Path of the file
        path: String,

        /// Resolve the path as of this date (YYYY-MM-DD, default: now)
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Lines added and deleted over a time window
    Churn {
        /// Window start (YYYY-MM-DD, inclusive; default: beginning of history)
        #[arg(long)]
        since: Option<String>,

        /// Window end (YYYY-MM-DD, exclusive; default: now)
        #[arg(long)]
        until: Option<String>,
    },
}

const DEFAULT_CONFIG: &str = r##"# Strata Configuration

[mining]
# branch = "master"
# workers = 1
# queue_capacity = 64
# write_lines = true
# first_parent = true
# skip_merges = true

[database]
# path = "strata.db"

[repository]
# name = "my-project"

[issues]
# pattern = "#([0-9]+)"

# Extension to language map. Files with unmapped extensions are tracked
# without line rows. Setting this table replaces the built-in map.
# [languages]
# rs = "rust"
# py = "python"
"##;

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<StrataConfig> {
    match path {
        Some(path) => StrataConfig::from_file(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("loading {}", path.display())),
        None => {
            let default_path = Path::new(".strata.toml");
            if default_path.exists() {
                StrataConfig::from_file(default_path)
                    .into_diagnostic()
                    .wrap_err("loading .strata.toml")
            } else {
                Ok(StrataConfig::default())
            }
        }
    }
}

fn open_store(path: &Path) -> Result<Store> {
    Store::open(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("opening database {}", path.display()))
}

/// Id of the repository the read-only commands report on.
fn lookup_repository(store: &Store, config: &StrataConfig, repo: &Path) -> Result<(String, i64)> {
    let name = config
        .repository
        .name
        .clone()
        .unwrap_or_else(|| repository_name(&repo.display().to_string()));
    match store.repository_id(&name).into_diagnostic()? {
        Some(id) => Ok((name, id)),
        None => miette::bail!(miette::miette!(
            help = "Run `strata ingest` first",
            "repository '{name}' has not been ingested"
        )),
    }
}

/// Midnight UTC of a `YYYY-MM-DD` date, as unix seconds.
fn parse_date(text: &str) -> Result<i64> {
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .into_diagnostic()
        .wrap_err_with(|| format!("invalid date '{text}', expected YYYY-MM-DD"))?;
    match date.and_hms_opt(0, 0, 0) {
        Some(midnight) => Ok(midnight.and_utc().timestamp()),
        None => miette::bail!("invalid date '{text}'"),
    }
}

fn format_timestamp(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

fn print_report(report: &IngestReport) {
    println!("Repository: {} (id {})", report.repository, report.repository_id);
    println!("Commits on branch: {}", report.total_commits);
    println!("  already ingested: {}", report.skipped);
    if report.skipped_merges > 0 {
        println!("  merges skipped:   {}", report.skipped_merges);
    }
    println!("  applied:          {}", report.applied);
    println!("  deferred:         {}", report.deferred);
    for failure in &report.failed {
        println!("  failed:           {} ({})", failure.commit, failure.reason);
    }
    println!(
        "Project size: {} bytes in {} files",
        report.totals.project_size, report.totals.file_count
    );
}

fn print_stats(name: &str, stats: &[YearStats]) {
    if stats.is_empty() {
        println!("No commits ingested for {name}.");
        return;
    }
    println!("{:<6} {:>8} {:>13} {:>12}", "Year", "Commits", "File changes", "Per commit");
    for year in stats {
        println!(
            "{:<6} {:>8} {:>13} {:>12.2}",
            year.year, year.commits, year.file_changes, year.changes_per_commit
        );
        for commit in &year.top_commits {
            let short = &commit.hash[..commit.hash.len().min(10)];
            println!("         {short} {:>5}  {}", commit.file_changes, commit.summary);
        }
    }
}

fn print_lineage(path: &str, chain: &[LineageEntry]) {
    if chain.is_empty() {
        println!("{path} is not tracked.");
        return;
    }
    for (depth, entry) in chain.iter().enumerate() {
        let marker = if depth == 0 { "" } else { "<- " };
        let short = &entry.commit[..entry.commit.len().min(10)];
        println!(
            "{:indent$}{marker}{} (since {}, {short})",
            "",
            entry.path,
            format_timestamp(entry.timestamp),
            indent = depth * 2
        );
    }
}

fn print_churn(report: &ChurnReport) {
    println!(
        "{} to {}: {} commits, +{} -{} ({} lines churned)",
        format_timestamp(report.from),
        format_timestamp(report.to),
        report.commits,
        report.lines_added,
        report.lines_deleted,
        report.churn()
    );
}

fn main() -> Result<()> {
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Command::Init = cli.command {
        let path = Path::new(".strata.toml");
        if path.exists() {
            miette::bail!(".strata.toml already exists");
        }
        std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
        println!("Created .strata.toml with default configuration");
        return Ok(());
    }

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(db) = &cli.db {
        config.database.path = db.clone();
    }
    tracing::debug!(
        database = %config.database.path.display(),
        branch = %config.mining.branch,
        "configuration loaded"
    );

    match cli.command {
        Command::Init => {}
        Command::Ingest {
            branch,
            workers,
            no_lines,
        } => {
            if let Some(branch) = branch {
                config.mining.branch = branch;
            }
            if let Some(workers) = workers {
                config.mining.workers = workers;
            }
            if no_lines {
                config.mining.write_lines = false;
            }

            let backend = GitBackend::new(&cli.repo);
            let mut store = open_store(&config.database.path)?;
            let report = IngestionCoordinator::new(&backend, &config)
                .into_diagnostic()?
                .ingest(&mut store)
                .into_diagnostic()
                .wrap_err_with(|| format!("ingesting {}", cli.repo.display()))?;

            match cli.format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Text => print_report(&report),
            }
        }
        Command::Stats { top } => {
            let store = open_store(&config.database.path)?;
            let (name, id) = lookup_repository(&store, &config, &cli.repo)?;
            let stats = store.yearly_stats(id, top).into_diagnostic()?;
            let totals = store.latest_totals(id).into_diagnostic()?;

            match cli.format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "repository": name,
                    "totals": totals,
                    "years": stats,
                }))?,
                OutputFormat::Text => {
                    print_stats(&name, &stats);
                    println!(
                        "\nCurrent size: {} bytes in {} files",
                        totals.project_size, totals.file_count
                    );
                }
            }
        }
        Command::Lineage { path, as_of } => {
            let as_of = match as_of {
                Some(date) => parse_date(&date)?,
                None => Utc::now().timestamp(),
            };
            let store = open_store(&config.database.path)?;
            let (_, id) = lookup_repository(&store, &config, &cli.repo)?;
            let chain = store.lineage(id, &path, as_of).into_diagnostic()?;

            match cli.format {
                OutputFormat::Json => print_json(&chain)?,
                OutputFormat::Text => print_lineage(&path, &chain),
            }
        }
        Command::Churn { since, until } => {
            let from = since.as_deref().map(parse_date).transpose()?.unwrap_or(0);
            let to = match until {
                Some(date) => parse_date(&date)?,
                None => Utc::now().timestamp() + 1,
            };
            if to <= from {
                miette::bail!("--until must be after --since");
            }
            let store = open_store(&config.database.path)?;
            let (_, id) = lookup_repository(&store, &config, &cli.repo)?;
            let report = store.churn(id, from, to).into_diagnostic()?;

            match cli.format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Text => print_churn(&report),
            }
        }
    }

    Ok(())
}
