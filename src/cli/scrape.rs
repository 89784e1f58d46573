use super::ui::{self, StyleType};
use crate::core::config::{AppConfig, PathsConfig};
use crate::core::links::load_links;
use crate::{CategorySummary, Scraper, run_scrape, scrape_to_file};
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Path overrides given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ScrapeOptions {
    pub wealth_links: Option<PathBuf>,
    pub wealth_output: Option<PathBuf>,
    pub fund_links: Option<PathBuf>,
    pub fund_output: Option<PathBuf>,
}

impl ScrapeOptions {
    pub fn resolve(&self, defaults: &PathsConfig) -> PathsConfig {
        PathsConfig {
            wealth_links: self
                .wealth_links
                .clone()
                .unwrap_or_else(|| defaults.wealth_links.clone()),
            wealth_output: self
                .wealth_output
                .clone()
                .unwrap_or_else(|| defaults.wealth_output.clone()),
            fund_links: self
                .fund_links
                .clone()
                .unwrap_or_else(|| defaults.fund_links.clone()),
            fund_output: self
                .fund_output
                .clone()
                .unwrap_or_else(|| defaults.fund_output.clone()),
        }
    }
}

/// Scrapes both categories. With `json`, prints the run summary as JSON; otherwise prints
/// per-category lines and skips categories whose link file lists no URLs.
pub async fn run(config: &AppConfig, options: &ScrapeOptions, json: bool) -> Result<()> {
    let paths = options.resolve(&config.paths);

    if json {
        let summary = run_scrape(&paths, config).await?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let scraper = Scraper::new(config)?;
    scrape_category(&scraper, "wealth", &paths.wealth_links, &paths.wealth_output).await?;
    scrape_category(&scraper, "fund", &paths.fund_links, &paths.fund_output).await?;
    Ok(())
}

async fn scrape_category(
    scraper: &Scraper,
    label: &str,
    links: &Path,
    output: &Path,
) -> Result<()> {
    let urls = load_links(links)?;
    let tag = ui::style_text(&format!("[{label}]"), StyleType::Label);
    if urls.is_empty() {
        println!(
            "{tag} {}",
            ui::style_text(&format!("no urls in {}, skip", links.display()), StyleType::Subtle)
        );
        return Ok(());
    }

    let pb = ui::new_progress_bar(urls.len() as u64, label);
    let summary = scrape_to_file(scraper, &urls, output, &|| pb.inc(1)).await?;
    pb.finish_and_clear();

    for line in summary_lines(urls.len(), &summary) {
        println!("{tag} {line}");
    }
    for (url, reason) in &summary.failures {
        println!(
            "{} {url} :: {reason}",
            ui::style_text("- FAIL", StyleType::Error)
        );
    }
    Ok(())
}

fn summary_lines(total: usize, summary: &CategorySummary) -> [String; 2] {
    let counts = format!(
        "{}/{} succeeded, {} failed",
        summary.count, total, summary.failed
    );
    let counts = if summary.failed == 0 {
        ui::style_text(&counts, StyleType::Success)
    } else {
        counts
    };
    [
        format!("wrote {} products to {}", summary.count, summary.output),
        format!("summary: {counts}"),
    ]
}
