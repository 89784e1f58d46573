use super::http::HttpClient;
use super::util::{array_at, fill_from_nav, first_text, nav_series, parse_number};
use crate::core::config::CibwmConfig;
use crate::core::product::{ProductProvider, ProductRecord, ReturnWindow, WEALTH_TYPE, WindowReturns};
use crate::core::text::{parse_min_hold_days, strip_company_suffix};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, instrument};

/// 兴银理财 public product API.
pub struct CibwmProvider {
    http: Arc<HttpClient>,
    config: CibwmConfig,
}

impl CibwmProvider {
    pub fn new(http: Arc<HttpClient>, config: CibwmConfig) -> Self {
        Self { http, config }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/public/pc/{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn detail(&self, product_id: &str) -> Result<Value> {
        let url = self.endpoint(&format!(
            "productInfo/getProductDetailByProductId/{product_id}"
        ));
        self.http.fetch_json(&url, Method::GET, None, &[]).await
    }

    async fn price_change(&self, product_code: &str) -> Result<Value> {
        let payload = json!({"intervalType": "阶段", "productCode": product_code});
        self.http
            .post_json(
                &self.endpoint("productInfoPriceChange/productPriceChange"),
                &payload,
                &[],
            )
            .await
    }

    async fn nav_page(&self, product_id: &str, product_code: &str) -> Result<Value> {
        let payload = json!({
            "productId": product_id,
            "productCode": product_code,
            "pageNum": 1,
            "pageSize": self.config.nav_page_size,
        });
        self.http
            .post_json(&self.endpoint("productVal/page"), &payload, &[])
            .await
    }

    /// Distribution banks from the comma-separated channel list.
    fn banks(&self, channels: &str) -> Vec<String> {
        let banks: Vec<String> = channels
            .split(',')
            .map(str::trim)
            .filter(|c| c.contains("银行"))
            .map(str::to_string)
            .collect();
        if banks.is_empty() || banks.contains(&self.config.default_bank) {
            vec![self.config.default_bank.clone()]
        } else {
            banks
        }
    }
}

fn window_for_range(time_range: &str) -> Option<ReturnWindow> {
    match time_range {
        "近1月" => Some(ReturnWindow::OneMonth),
        "近3月" => Some(ReturnWindow::ThreeMonths),
        "近6月" => Some(ReturnWindow::SixMonths),
        _ => None,
    }
}

#[async_trait]
impl ProductProvider for CibwmProvider {
    #[instrument(name = "CibwmFetch", skip(self))]
    async fn fetch(&self, url: &str) -> Result<ProductRecord> {
        let product_id = url.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
        let detail = self
            .detail(product_id)
            .await
            .with_context(|| format!("Failed to fetch product detail {product_id}"))?;
        let data = detail.get("data").cloned().unwrap_or(Value::Null);
        let product_code = first_text(&data, &["productCode"]);

        let changes = self.price_change(&product_code).await?;
        let mut returns = WindowReturns::default();
        for item in array_at(&changes, "/data") {
            let Some(window) = item
                .get("timeRange")
                .and_then(Value::as_str)
                .and_then(window_for_range)
            else {
                continue;
            };
            let value = item.get("yarOfIncAndDcr").and_then(parse_number);
            debug!(
                provider = "cibwm",
                product = %product_code,
                window = window.key(),
                value = ?value,
                base = %first_text(item, &["baseDt"]),
                effect = %first_text(item, &["effectDt"]),
                "return from price change"
            );
            returns.set(window, value);
        }

        let missing = returns.missing();
        if !missing.is_empty() {
            let navs = self.nav_page(product_id, &product_code).await?;
            let series = nav_series(
                array_at(&navs, "/data/list"),
                &["netvalDt", "dataDt"],
                &["effIopv", "effTotNetVal", "adjustedValue"],
            );
            fill_from_nav(&mut returns, &series, &missing, "cibwm", &product_code);
        }

        let name = first_text(&data, &["productName"]);
        let issuer = strip_company_suffix(&first_text(&data, &["issuer"]));
        Ok(ProductRecord {
            name,
            code: product_code,
            issuer: if issuer.is_empty() {
                self.config.default_issuer.clone()
            } else {
                issuer
            },
            banks: self.banks(&first_text(&data, &["distributionChannel"])),
            currency: first_text(&data, &["saleCurrency"]),
            min_hold_days: parse_min_hold_days(&first_text(&data, &["productDate"])),
            risk_level: first_text(&data, &["riskLevelOri", "riskLevel"]),
            returns: returns.normalize(),
            url: url.to_string(),
            product_type: WEALTH_TYPE.to_string(),
            ..Default::default()
        })
    }
}
