//! Pathmend CLI - reconcile catalog image references with the object store.
//!
//! Exit codes: 0 when every run finished clean, 2 when a report needs manual
//! review, 1 on failure (3 and 4 for version conflicts and missing catalogs).

mod commands;

use clap::{Args as ClapArgs, Parser, Subcommand};
use pathmend_core::{Category, Environment, PathmendError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pathmend")]
#[command(about = "Reconcile catalog image references with their storage albums")]
#[command(version)]
struct Args {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true, env = "PATHMEND_SETTINGS")]
    settings: Option<PathBuf>,

    /// Serve the bucket from a local mirror directory
    #[arg(long, global = true)]
    local_root: Option<PathBuf>,

    /// Correction table file
    #[arg(long, global = true)]
    corrections: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List an album's folders, non-canonical names and duplicate groups
    Scan {
        album: String,
        /// Print the CDN URL of each folder
        #[arg(long)]
        urls: bool,
    },
    /// Print the canonical form of paths, URLs or names
    Normalize {
        #[arg(required = true)]
        raw: Vec<String>,
    },
    /// Resolve, rewrite and verify catalog references
    Reconcile(ReconcileArgs),
    /// Promote a catalog and its images to another environment
    Promote {
        #[arg(long, value_parser = parse_category)]
        category: Category,
        #[arg(long, value_parser = parse_environment, default_value = "dev")]
        from: Environment,
        #[arg(long, value_parser = parse_environment, default_value = "prod")]
        to: Environment,
        /// Copy images and commit the destination catalog
        #[arg(long)]
        apply: bool,
    },
}

#[derive(ClapArgs, Debug)]
pub struct ReconcileArgs {
    #[arg(long, value_parser = parse_category, required_unless_present = "all")]
    category: Option<Category>,

    #[arg(long = "env", value_parser = parse_environment, required_unless_present = "all")]
    environment: Option<Environment>,

    /// Album to reconcile against instead of the conventional one
    #[arg(long, conflicts_with = "all")]
    album: Option<String>,

    /// Catalog file name instead of the conventional one
    #[arg(long, conflicts_with = "all")]
    catalog: Option<String>,

    /// Every category in every environment
    #[arg(long)]
    all: bool,

    /// Write changes (default is a dry run)
    #[arg(long)]
    apply: bool,

    /// Rename non-canonical folders whose canonical name is free
    #[arg(long)]
    consolidate: bool,

    /// Upload the catalog even if some records failed verification
    #[arg(long)]
    accept_mismatches: bool,

    /// Write the full report(s) as JSON
    #[arg(long)]
    report_out: Option<PathBuf>,
}

fn parse_category(s: &str) -> Result<Category, String> {
    Category::from_str(s).ok_or_else(|| format!("unknown category {:?} (cafe, bar, dining, cowork)", s))
}

fn parse_environment(s: &str) -> Result<Environment, String> {
    Environment::from_str(s).ok_or_else(|| format!("unknown environment {:?} (dev, prod)", s))
}

fn init_logging(debug: bool, json: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.debug, args.json_logs);

    match commands::dispatch(args).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            let code = e
                .downcast_ref::<PathmendError>()
                .map(PathmendError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}
