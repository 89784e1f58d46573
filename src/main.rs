use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use wealth_scraper::cli::{scrape, setup};
use wealth_scraper::config::AppConfig;
use wealth_scraper::core::log::init_logging;

#[derive(Parser)]
#[command(version, about = "Scrape wealth/fund product data.")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Scrape all link files and write the JSON snapshots (default)
    Scrape(ScrapeArgs),
}

#[derive(Args, Default)]
struct ScrapeArgs {
    /// Path to wealth_links.txt
    #[arg(long)]
    wealth_links: Option<PathBuf>,

    /// Output JSON path for wealth products
    #[arg(long)]
    wealth_output: Option<PathBuf>,

    /// Path to fund_links.txt
    #[arg(long)]
    fund_links: Option<PathBuf>,

    /// Output JSON path for fund products
    #[arg(long)]
    fund_output: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

impl From<ScrapeArgs> for scrape::ScrapeOptions {
    fn from(args: ScrapeArgs) -> Self {
        scrape::ScrapeOptions {
            wealth_links: args.wealth_links,
            wealth_output: args.wealth_output,
            fund_links: args.fund_links,
            fund_output: args.fund_output,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup::setup(),
        Some(Commands::Scrape(args)) => run_scrape(cli.config_path.as_deref(), args).await,
        None => run_scrape(cli.config_path.as_deref(), ScrapeArgs::default()).await,
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

async fn run_scrape(config_path: Option<&str>, args: ScrapeArgs) -> Result<()> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    let json = args.json;
    scrape::run(&config, &args.into(), json).await
}
