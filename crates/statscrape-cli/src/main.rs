use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use statscrape_sync::{
    open_store, plan_once, run_once, run_scheduler_until_ctrl_c, PlanDecision, RunMode,
    RunSummary, ScrapeConfig, DEFAULT_CONFIG_PATH, DEFAULT_JOBS_PATH,
};

#[derive(Debug, Parser)]
#[command(name = "statscrape")]
#[command(about = "Incremental stats API scraper backed by SQLite")]
struct Cli {
    /// Settings file; defaults apply when it does not exist.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Job registry file.
    #[arg(long, global = true, default_value = DEFAULT_JOBS_PATH)]
    jobs: PathBuf,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the database and the scrape log table.
    Init,
    /// Scrape every configured job.
    Run,
    /// Scrape yesterday's data for jobs marked `daily`.
    Daily,
    /// Run the daily scrape on the configured cron schedule until Ctrl-C.
    Schedule,
    /// Print what a run would do without fetching anything.
    Plan {
        #[arg(long)]
        daily: bool,
    },
    /// List stored tables.
    Tables {
        /// Include the scrape log and reference tables.
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ScrapeConfig::load_with_env(&cli.config).await?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Init => {
            open_store(&config).await?;
            println!("initialized {}", config.database_url);
        }
        Commands::Run => print_summary(&run_once(&config, &cli.jobs, RunMode::Full).await?),
        Commands::Daily => print_summary(&run_once(&config, &cli.jobs, RunMode::Daily).await?),
        Commands::Schedule => run_scheduler_until_ctrl_c(config, cli.jobs).await?,
        Commands::Plan { daily } => {
            let mode = if daily { RunMode::Daily } else { RunMode::Full };
            let planned = plan_once(&config, &cli.jobs, mode).await?;
            for entry in &planned {
                match &entry.decision {
                    PlanDecision::Skip { identity } => {
                        println!("skip     {:<24} {}", entry.table, identity)
                    }
                    PlanDecision::Narrowed { request, since } => {
                        println!("narrow   {:<24} {} (since {since})", entry.table, request.url)
                    }
                    other => {
                        if let Some(request) = other.request() {
                            println!("{:<8} {:<24} {}", other.label(), entry.table, request.url);
                        }
                    }
                }
            }
            let issued = planned.iter().filter(|p| p.decision.request().is_some()).count();
            println!("{} requests, {issued} to issue", planned.len());
        }
        Commands::Tables { all } => {
            let store = open_store(&config).await?;
            for name in store.table_names(!all).await? {
                println!("{name}");
            }
        }
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{:?} run complete: run_id={} jobs={} generated={} issued={} narrowed={} skipped={} rows={}",
        summary.mode,
        summary.run_id,
        summary.jobs,
        summary.generated,
        summary.issued,
        summary.narrowed,
        summary.skipped,
        summary.stored_rows
    );
}
