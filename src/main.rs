mod analysis;
mod comfy_table;
mod compare;
mod error;
mod export;
mod fetch;
mod kpi;
mod request;
mod resolver;
mod storage_utils;
mod table;
mod transform;
mod tui;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::Parser;
use request::TickerRequest;
use storage_utils::{AppConfig, AsyncStorageManager};
use tracing_subscriber::EnvFilter;

/// Moving averages, daily returns and volatility for one stock, or a
/// side-by-side return comparison of two.
#[derive(Parser, Debug)]
#[command(name = "stock-analyzer", version, about)]
struct Cli {
    /// First stock symbol (e.g. AAPL)
    #[arg(default_value = "AAPL")]
    ticker: String,

    /// Optional second symbol to compare against
    second_ticker: Option<String>,

    /// First session to include (YYYY-MM-DD)
    #[arg(long, default_value = "2023-01-01")]
    start: NaiveDate,

    /// Last session to include (YYYY-MM-DD), defaults to today
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Open the interactive chart viewer instead of printing tables
    #[arg(long)]
    tui: bool,

    /// Write the enriched table as CSV under the export directory
    #[arg(long)]
    export: bool,
}

fn init_tracing(tui: bool) {
    let default = if tui { "warn" } else { "stock_analyzer=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.tui);

    // Step 1: Load configuration
    let storage = AsyncStorageManager::new_relative("storage").await?;
    let config: AppConfig = storage
        .load_or_init("config")
        .await
        .context("could not load storage/config.json")?;

    // Step 2: Validate the request
    let end = cli.end.unwrap_or_else(|| Local::now().date_naive());
    let request = TickerRequest::new(&cli.ticker, cli.second_ticker.as_deref(), cli.start, end)?;

    // Step 3: Fetch and analyze
    let report = analysis::run_analysis_pipeline(&request, &config).await?;

    // Step 4: Export
    if cli.export {
        match (report.export_name(), report.table()) {
            (Some(name), Some(table)) => {
                let path = export::export_table(&storage, &config.export, &name, table).await?;
                println!("Saved {}", path.display());
            }
            _ => eprintln!("Nothing to export."),
        }
    }

    // Step 5: Display results
    if cli.tui {
        tui::run_tui(request, config, report).await?;
    } else {
        comfy_table::run(&report, &config.report)?;
    }

    Ok(())
}
