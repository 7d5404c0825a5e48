mod ai;
mod config;
mod db;
mod filters;
mod marks;
mod models;
mod provider;
mod search;
mod tui;
mod views;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use db::Database;
use filters::{dedup_selection, SearchFilters};
use marks::Marks;
use models::LoadingState;
use search::SearchController;
use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
use tui::truncate;
use views::JobViews;

#[derive(Parser)]
#[command(name = "jobhub")]
#[command(about = "Taiwan job search hub - AI-sourced listings with saved/applied tracking")]
struct Cli {
    /// Model used to source listings
    #[arg(long, global = true, env = "JOBHUB_MODEL", default_value = ai::DEFAULT_MODEL)]
    model: String,

    /// Seconds to wait for the provider before giving up
    #[arg(long, global = true, env = "JOBHUB_TIMEOUT", default_value = "90")]
    timeout: u64,

    /// Directory holding the marks database and log file
    #[arg(long, global = true, env = "JOBHUB_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Serve listings from a local JSON file instead of a model
    #[arg(long, global = true, env = "JOBHUB_FIXTURE")]
    fixture: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive browser (default)
    Browse,

    /// Run one search and print the visible jobs
    Search {
        /// Job title scope
        #[arg(short, long, default_value = "")]
        title: String,

        /// Industry constraint (repeatable)
        #[arg(short, long)]
        industry: Vec<String>,

        /// Location constraint (repeatable)
        #[arg(short, long)]
        location: Vec<String>,

        /// Experience level constraint (repeatable)
        #[arg(short, long)]
        experience: Vec<String>,

        /// Print the raw result set as JSON
        #[arg(long)]
        json: bool,
    },

    /// Toggle a job's saved mark
    Save {
        /// Job ID
        id: String,
    },

    /// Toggle a job's applied mark
    Apply {
        /// Job ID
        id: String,
    },

    /// Show saved and applied job IDs
    Marks,

    /// List available models
    Models,
}

fn init_logging(config: &Config, verbose: bool) -> Result<()> {
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create data directory: {}", config.data_dir.display()))?;
    let log_path = config.log_path();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file: {}", log_path.display()))?;

    let default_directive = if verbose { "jobhub=debug" } else { "jobhub=info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(file).with_ansi(false))
        .with(filter)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::new(cli.model, cli.timeout, cli.data_dir, cli.fixture)?;
    init_logging(&config, cli.verbose)?;

    let command = cli.command.unwrap_or(Commands::Browse);

    match command {
        Commands::Browse => {
            let source = config.job_source()?;
            let marks = Marks::load(Database::open(&config.db_path())?);
            let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
            tui::run_browse(marks, source, config.timeout, runtime.handle().clone())?;
            // Abandon any search still in flight
            runtime.shutdown_background();
        }

        Commands::Search {
            title,
            industry,
            location,
            experience,
            json,
        } => {
            let filters = SearchFilters::default()
                .with_job_title(title.trim())
                .with_industries(dedup_selection(industry))
                .with_locations(dedup_selection(location))
                .with_experience_levels(dedup_selection(experience));

            let source = config.job_source()?;
            let marks = Marks::load(Database::open(&config.db_path())?);
            let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

            if filters.is_unconstrained() {
                eprintln!("No filters given; browsing the latest openings.");
            }
            eprintln!("Searching: {} (via {})", filters.summary(), source.name());
            let mut controller = SearchController::new();
            runtime.block_on(controller.search(&source, &filters, config.timeout));
            runtime.shutdown_background();

            if controller.state() == LoadingState::Error {
                eprintln!("{}", controller.error().unwrap_or_default());
                eprintln!("Retry with the same command.");
                std::process::exit(1);
            }

            let views = JobViews::build(controller.jobs(), marks.saved(), marks.applied());
            if json {
                println!("{}", serde_json::to_string_pretty(&views.visible)?);
            } else if views.visible.is_empty() {
                println!("目前沒有匹配的職缺。");
            } else {
                println!(
                    "{:<3} {:<14} {:<30} {:<18} {:<10} {:<20}",
                    "", "ID", "TITLE", "COMPANY", "SOURCE", "SALARY"
                );
                println!("{}", "-".repeat(98));
                for job in &views.visible {
                    let mark = if marks.is_saved(&job.id) { "*" } else { "" };
                    println!(
                        "{:<3} {:<14} {:<30} {:<18} {:<10} {:<20}",
                        mark,
                        truncate(&job.id, 14),
                        truncate(&job.title, 28),
                        truncate(&job.company, 16),
                        job.source,
                        truncate(&job.salary, 20)
                    );
                }
            }

            eprintln!(
                "\n{} visible, {} saved, {} applied (of {} returned)",
                views.visible.len(),
                views.saved.len(),
                views.applied.len(),
                controller.jobs().len()
            );
        }

        Commands::Save { id } => {
            let mut marks = Marks::load(Database::open(&config.db_path())?);
            if marks.toggle_saved(&id) {
                println!("Saved job '{}'.", id);
            } else {
                println!("Removed job '{}' from saved.", id);
            }
        }

        Commands::Apply { id } => {
            let mut marks = Marks::load(Database::open(&config.db_path())?);
            if marks.toggle_applied(&id) {
                println!("Marked job '{}' as applied.", id);
            } else {
                println!("Job '{}' is no longer marked as applied.", id);
            }
        }

        Commands::Marks => {
            let db = Database::open(&config.db_path())?;
            println!("Marks stored at {}", db.path().display());
            let marks = Marks::load(db);
            println!("Saved ({}):", marks.saved().len());
            for id in marks.saved() {
                println!("  {}", id);
            }
            println!("Applied ({}):", marks.applied().len());
            for id in marks.applied() {
                println!("  {}", id);
            }
        }

        Commands::Models => {
            for name in ai::MODEL_NAMES {
                let spec = ai::resolve_model(name)?;
                let default = if *name == ai::DEFAULT_MODEL { " (default)" } else { "" };
                println!(
                    "{:<15} {:<10} {}{}",
                    spec.short_name,
                    format!("{:?}", spec.provider),
                    spec.model_id,
                    default
                );
            }
        }
    }

    Ok(())
}
