use super::http::HttpClient;
use super::util::{
    array_at, fill_from_nav, first_text, nav_series, parse_number, require_query_param,
};
use crate::core::config::SpdbConfig;
use crate::core::product::{ProductProvider, ProductRecord, ReturnWindow, WEALTH_TYPE, WindowReturns};
use crate::core::text::{GRADE_TIERS, bucket_risk};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Search channel holding product details.
const DETAIL_CHANNEL: u32 = 1002;
/// Search channel holding NAV history.
const NAV_CHANNEL: u32 = 1003;

/// 浦银理财 site search API.
pub struct SpdbProvider {
    http: Arc<HttpClient>,
    config: SpdbConfig,
}

impl SpdbProvider {
    pub fn new(http: Arc<HttpClient>, config: SpdbConfig) -> Self {
        Self { http, config }
    }

    async fn search(&self, chlid: u32, searchword: &str, page: u32) -> Result<Value> {
        let url = format!("{}/api/search", self.config.base_url.trim_end_matches('/'));
        let payload = json!({
            "page": page,
            "channel": 0,
            "sort_type": 0,
            "maxline": self.config.page_size,
            "chlid": chlid,
            "pageflag": "true",
            "searchword": searchword,
        });
        self.http.post_json(&url, &payload, &[]).await
    }

    /// Collects NAV rows page by page. Stops at the last reported page, on an empty page, once
    /// `max_records` rows were seen, or after the pages needed to hold `max_records` rows.
    async fn nav_rows(&self, real_code: &str) -> Result<Vec<Value>> {
        let searchword = format!("(REAL_PRD_CODE = '{real_code}')");
        let max_pages = self
            .config
            .max_records
            .div_ceil(self.config.page_size.max(1) as usize)
            .max(1);
        let mut rows = Vec::new();
        let mut page: u32 = 1;
        loop {
            let response = self.search(NAV_CHANNEL, &searchword, page).await?;
            let page_rows = array_at(&response, "/data/content");
            rows.extend_from_slice(page_rows);
            let total_pages = response
                .pointer("/data/totalPages")
                .and_then(parse_number)
                .filter(|total| *total >= 1.0)
                .map_or(1, |total| total as usize);
            debug!(page, total_pages, rows = rows.len(), "NAV page");
            let page_count = page as usize;
            if page_rows.is_empty()
                || page_count >= total_pages
                || page_count >= max_pages
                || rows.len() >= self.config.max_records
            {
                break;
            }
            page += 1;
        }
        Ok(rows)
    }
}

#[async_trait]
impl ProductProvider for SpdbProvider {
    #[instrument(name = "SpdbFetch", skip(self))]
    async fn fetch(&self, url: &str) -> Result<ProductRecord> {
        let real_code = require_query_param(url, "REAL_PRD_CODE")?;

        let detail = self
            .search(DETAIL_CHANNEL, &format!("(PRDC_CD = '{real_code}')"), 1)
            .await?;
        let item = array_at(&detail, "/data/content")
            .first()
            .cloned()
            .unwrap_or(Value::Null);

        let rows = self.nav_rows(&real_code).await?;
        let series = nav_series(&rows, &["ISS_DATE"], &["NAV", "TOT_NAV"]);
        let mut returns = WindowReturns::default();
        fill_from_nav(&mut returns, &series, &ReturnWindow::ALL, "spdb", &real_code);

        let currency = match first_text(&item, &["RS_CRRN"]) {
            currency if currency.is_empty() => "人民币".to_string(),
            currency => currency,
        };
        Ok(ProductRecord {
            name: first_text(&item, &["PRDC_NM"]),
            code: first_text(&item, &["PRDC_RGST_CD"]),
            issuer: self.config.issuer.clone(),
            banks: self.config.banks.clone(),
            currency,
            min_hold_days: self.config.min_hold_days,
            risk_level: bucket_risk(&first_text(&item, &["RISK_GRADE"]), GRADE_TIERS),
            returns: returns.normalize(),
            url: url.to_string(),
            product_type: WEALTH_TYPE.to_string(),
            real_product_code: Some(real_code),
            ..Default::default()
        })
    }
}
