//! # imgdb
//!
//! A content-addressed image catalog.
//!
//! ## Usage
//!
//! ```bash
//! imgdb add photos/2024
//! imgdb info
//! imgdb del --query "maker-model = Unknown"
//! imgdb gallery --filter "iso > 800" --output web/
//! imgdb export --format json > catalog.json
//! ```
//!
//! Every subcommand operates against the archive document in the current
//! directory (`imgdb.toml`'s `dbname`, default `archive.htm`) unless
//! `--root` points elsewhere.

use clap::{Parser, Subcommand};
use imgdb::{archive, config, ops, output};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup — trivial, called exactly once
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "imgdb")]
#[command(about = "A content-addressed image catalog")]
#[command(version = version_string())]
struct Cli {
    /// Content root directory (holds imgdb.toml and the archive document).
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Suppress non-error output.
    #[arg(long, short, global = true)]
    silent: bool,

    /// Skip every filesystem mutation (writes, renames, links, deletes);
    /// logging and reports still happen as if the run were real.
    #[arg(long, global = true)]
    dry_run: bool,

    /// Raise log verbosity (repeatable: -v = debug, -vv = trace).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Lower log verbosity (repeatable: -q = error only, -qq = silent).
    #[arg(short = 'q', long = "quiet", action = clap::ArgAction::Count, global = true)]
    quiet: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Walk one or more directories, extract metadata, and merge into the archive.
    Add {
        /// Directories or files to ingest.
        paths: Vec<PathBuf>,
    },
    /// Remove records by id or query expression.
    Del {
        /// Explicit record ids to remove.
        #[arg(long)]
        id: Vec<String>,
        /// Remove every record matching this query expression instead.
        #[arg(long)]
        query: Option<String>,
        /// Also delete the underlying image file.
        #[arg(long)]
        unlink: bool,
    },
    /// Re-derive filenames from a template and rename files in place.
    Rename {
        #[arg(long)]
        tmpl: String,
    },
    /// Filter and export the catalog as json, jsonl, csv, or html.
    Export {
        #[arg(long, default_value = "json")]
        format: String,
        #[arg(long)]
        filter: Option<String>,
    },
    /// Materialize a filtered, paginated HTML gallery.
    Gallery {
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        filter: Option<String>,
    },
    /// Materialize link paths for every matched record.
    Links {
        #[arg(long)]
        tmpl: String,
        #[arg(long)]
        filter: Option<String>,
    },
    /// Summarize the archive: record count, size, date range, cameras.
    Info,
    /// Print a stock imgdb.toml with all options documented.
    GenConfig,
    /// Maintenance operations against the archive document itself.
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    /// Document the HTTP server contract this build stubs out.
    Server,
}

#[derive(Subcommand)]
enum DbAction {
    /// Purge records whose path no longer resolves, and report files on disk
    /// that aren't imported yet (without importing them).
    Sync {
        /// Directories or files to check against. Defaults to `--root`.
        paths: Vec<PathBuf>,
    },
    /// Report how many records match vs. don't match a query expression.
    Split {
        #[arg(long)]
        query: String,
    },
    /// Merge one or more sibling archive documents into this one.
    Merge {
        /// Archive document paths to merge in (newer wins on non-blank attrs).
        paths: Vec<PathBuf>,
    },
}

/// Errors `run` can return, tagged with the exit code they map to: `1` for
/// user error (bad config/flags/query), `2` for everything else (I/O,
/// archive corruption, internal failure).
#[derive(thiserror::Error, Debug)]
enum AppError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Op(#[from] ops::OpError),
    #[error("rendering default config: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl AppError {
    fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(config::ConfigError::Toml(_)) => 1,
            AppError::Config(config::ConfigError::Io(_)) => 2,
            AppError::Op(ops::OpError::Query(_)) => 1,
            AppError::Op(ops::OpError::Template(_)) => 1,
            AppError::Op(ops::OpError::Archive(archive::ArchiveError::Query(_))) => 1,
            AppError::Op(ops::OpError::Archive(_)) => 2,
            AppError::Op(ops::OpError::Io(_)) => 2,
            AppError::TomlSer(_) => 2,
        }
    }
}

/// Resolve the `env_logger` filter level: `-v`/`-q` override `imgdb.toml`'s
/// `log_level`, which is itself overridden by `RUST_LOG` if set.
fn log_level_from_flags(verbose: u8, quiet: u8, configured: &str) -> String {
    if quiet > 0 {
        return if quiet == 1 { "error".to_string() } else { "off".to_string() };
    }
    if verbose > 0 {
        return if verbose == 1 { "debug".to_string() } else { "trace".to_string() };
    }
    configured.to_string()
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let configured_level = config::load_config(&cli.root).map(|c| c.log_level).unwrap_or_else(|_| "info".to_string());
    let level = log_level_from_flags(cli.verbose, cli.quiet, &configured_level);
    let env = env_logger::Env::default().default_filter_or(level);
    env_logger::Builder::from_env(env).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    let mut loaded = config::load_config(&cli.root)?;
    loaded.dry_run = cli.dry_run;

    match cli.command {
        Command::Add { paths } => {
            let roots = if paths.is_empty() { vec![cli.root.clone()] } else { paths };
            let cancel = AtomicBool::new(false);
            let report = ops::add(&cli.root, &roots, &loaded, &cancel)?;
            if !cli.silent {
                output::print_add_report(&report);
            }
        }
        Command::Del { id, query, unlink } => {
            let removed = ops::delete(&cli.root, &loaded, &id, query.as_deref(), unlink)?;
            if !cli.silent {
                output::print_count_report("Deleted", removed);
            }
        }
        Command::Rename { tmpl } => {
            loaded.tmpl = Some(tmpl);
            let renamed = ops::rename(&cli.root, &loaded)?;
            if !cli.silent {
                output::print_count_report("Renamed", renamed);
            }
        }
        Command::Export { format, filter } => {
            loaded.filter = filter;
            let body = ops::export(&cli.root, &loaded, &format)?;
            print!("{body}");
        }
        Command::Gallery { output: out, filter } => {
            loaded.filter = filter;
            let pages = ops::gallery(&cli.root, &loaded, &out)?;
            if !cli.silent {
                output::print_count_report("Gallery pages", pages);
            }
        }
        Command::Links { tmpl, filter } => {
            loaded.links = Some(tmpl);
            loaded.filter = filter;
            let linked = ops::links(&cli.root, &loaded)?;
            if !cli.silent {
                output::print_count_report("Linked", linked);
            }
        }
        Command::Info => {
            let report = ops::info(&cli.root, &loaded)?;
            output::print_info_report(&report);
        }
        Command::GenConfig => {
            let stock = config::Config::default();
            print!("{}", toml::to_string_pretty(&stock)?);
        }
        Command::Db { action } => match action {
            DbAction::Sync { paths } => {
                let roots = if paths.is_empty() { vec![cli.root.clone()] } else { paths };
                let (working, broken, not_imported) = ops::db_sync(&cli.root, &roots, &loaded)?;
                if !cli.silent {
                    println!("Working: {working}, broken (purged): {broken}, not imported: {not_imported}");
                }
            }
            DbAction::Split { query } => {
                let (matching, not_matching) = ops::db_split(&cli.root, &loaded, &query)?;
                if !cli.silent {
                    println!("Matching: {matching}, not matching: {not_matching}");
                }
            }
            DbAction::Merge { paths } => {
                let total = ops::db_merge(&cli.root, &loaded, &paths)?;
                if !cli.silent {
                    output::print_count_report("Merged, total records", total);
                }
            }
        },
        Command::Server => {
            println!("{}", ops::server_contract(&cli.root, &loaded));
        }
    }

    Ok(())
}
