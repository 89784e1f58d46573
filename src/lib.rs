pub mod cli;
pub mod core;
pub mod handler;
pub mod providers;
pub mod store;

pub use crate::core::config;

use crate::core::batch::{self, BatchOutcome};
use crate::core::config::{AppConfig, PathsConfig};
use crate::core::links::load_links;
use crate::providers::{Dispatcher, HttpClient};
use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Outcome of one link file: how many products were written where, and what failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub count: usize,
    pub failed: usize,
    pub failures: Vec<(String, String)>,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub wealth: CategorySummary,
    pub fund: CategorySummary,
}

/// Adapters wired to one shared HTTP client.
pub struct Scraper {
    dispatcher: Dispatcher,
    concurrency: usize,
}

impl Scraper {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let http = Arc::new(HttpClient::new(&config.http)?);
        Ok(Self {
            dispatcher: Dispatcher::new(http, &config.providers),
            concurrency: config.http.concurrency,
        })
    }

    pub async fn scrape(&self, urls: &[String], on_progress: &(dyn Fn() + Sync)) -> BatchOutcome {
        batch::scrape_all(&self.dispatcher, urls, self.concurrency, on_progress).await
    }
}

/// Scrapes `urls` and writes the successful records to `output`.
pub async fn scrape_to_file(
    scraper: &Scraper,
    urls: &[String],
    output: &Path,
    on_progress: &(dyn Fn() + Sync),
) -> Result<CategorySummary> {
    let outcome = scraper.scrape(urls, on_progress).await;
    store::write_json(output, &outcome.records)?;
    info!(
        "Wrote {} products to {} ({} failed)",
        outcome.records.len(),
        output.display(),
        outcome.failures.len()
    );
    Ok(CategorySummary {
        count: outcome.records.len(),
        failed: outcome.failures.len(),
        failures: outcome.failures,
        output: output.display().to_string(),
    })
}

/// Scrapes both link files and writes both snapshots. Either link file missing is an error
/// raised before any request is made.
pub async fn run_scrape(paths: &PathsConfig, config: &AppConfig) -> Result<RunSummary> {
    let wealth_urls = load_links(&paths.wealth_links)?;
    let fund_urls = load_links(&paths.fund_links)?;
    info!(
        wealth = wealth_urls.len(),
        fund = fund_urls.len(),
        "Starting scrape"
    );

    let scraper = Scraper::new(config)?;
    let wealth = scrape_to_file(&scraper, &wealth_urls, &paths.wealth_output, &|| ()).await?;
    let fund = scrape_to_file(&scraper, &fund_urls, &paths.fund_output, &|| ()).await?;
    Ok(RunSummary { wealth, fund })
}
