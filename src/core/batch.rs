use super::product::{ProductProvider, ProductRecord};
use chrono::{SecondsFormat, Utc};
use futures::stream::{self, StreamExt};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("valid slug regex"));

/// Records in input order, plus `(url, reason)` for every URL that failed.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub records: Vec<ProductRecord>,
    pub failures: Vec<(String, String)>,
}

/// `w-<slug>` from the code (or fund code), falling back to the 1-based position.
pub fn build_product_id(record: &ProductRecord, index: usize) -> String {
    let code = [Some(&record.code), record.fund_code.as_ref()]
        .into_iter()
        .flatten()
        .find(|code| !code.is_empty())
        .cloned()
        .unwrap_or_else(|| index.to_string());
    let slug = NON_ALNUM.replace_all(&code, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        format!("w-{index}")
    } else {
        format!("w-{slug}")
    }
}

/// Runs `provider` over every URL. At most `concurrency` fetches are in flight; results keep
/// input order and one failing URL never affects the others. All records of the batch share
/// one `updatedAt` timestamp unless the adapter already set one.
pub async fn scrape_all(
    provider: &dyn ProductProvider,
    urls: &[String],
    concurrency: usize,
    on_progress: &(dyn Fn() + Sync),
) -> BatchOutcome {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false);
    debug!(urls = urls.len(), concurrency, %timestamp, "starting batch");

    let results: Vec<_> = stream::iter(urls.iter().enumerate())
        .map(|(position, url)| async move {
            let result = provider.fetch(url).await;
            on_progress();
            (position + 1, url, result)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut outcome = BatchOutcome::default();
    for (index, url, result) in results {
        match result {
            Ok(mut record) => {
                record.id = build_product_id(&record, index);
                record.updated_at.get_or_insert_with(|| timestamp.clone());
                outcome.records.push(record);
            }
            Err(e) => {
                let reason = format!("{e:#}");
                warn!("[scrape] failed for {}: {}", url, reason);
                outcome.failures.push((url.clone(), reason));
            }
        }
    }
    outcome
}
