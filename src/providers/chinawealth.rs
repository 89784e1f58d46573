use super::http::HttpClient;
use super::signing::{sign_sha256_rsa_base64, to_pem_key};
use super::util::{array_at, fill_from_nav, first_text, nav_series, require_query_param};
use crate::core::config::ChinaWealthConfig;
use crate::core::product::{ProductProvider, ProductRecord, ReturnWindow, WEALTH_TYPE, WindowReturns};
use crate::core::text::{REGISTRY_TIERS, parse_min_hold_days, parse_risk_level, strip_company_suffix};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, instrument};

const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

/// 中国理财网 disclosure platform. Every query is RSA-signed with a key handed out by
/// `getInitData`.
pub struct ChinaWealthProvider {
    http: Arc<HttpClient>,
    config: ChinaWealthConfig,
}

impl ChinaWealthProvider {
    pub fn new(http: Arc<HttpClient>, config: ChinaWealthConfig) -> Self {
        Self { http, config }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn signing_key(&self) -> Result<String> {
        let init = self
            .http
            .fetch_json(
                &self.endpoint("/product/getInitData"),
                Method::POST,
                Some("{}"),
                &[("Content-Type", JSON_CONTENT_TYPE)],
            )
            .await
            .context("Failed to obtain signing key")?;
        let raw = init.get("data").and_then(Value::as_str).unwrap_or_default();
        Ok(to_pem_key(raw.trim())?)
    }

    async fn signed_post(&self, path: &str, payload: &Value) -> Result<Value> {
        let pem = self.signing_key().await?;
        let body = serde_json::to_string(payload)?;
        let signature = sign_sha256_rsa_base64(body.as_bytes(), &pem)?;
        debug!(path, "signed request");
        self.http
            .fetch_json(
                &self.endpoint(path),
                Method::POST,
                Some(&body),
                &[("Content-Type", JSON_CONTENT_TYPE), ("signature", signature.as_str())],
            )
            .await
    }
}

#[async_trait]
impl ProductProvider for ChinaWealthProvider {
    #[instrument(name = "ChinaWealthFetch", skip(self))]
    async fn fetch(&self, url: &str) -> Result<ProductRecord> {
        let reg_code = require_query_param(url, "prodRegCode")?;

        let listing = self
            .signed_post(
                "/product/getProductList",
                &json!({
                    "orgName": "",
                    "prodName": "",
                    "prodRegCode": reg_code,
                    "pageNum": 1,
                    "pageSize": 1,
                }),
            )
            .await?;
        let list_item = array_at(&listing, "/data/list")
            .first()
            .cloned()
            .unwrap_or(Value::Null);
        let prod_id = first_text(&list_item, &["prodId"]).trim().to_string();

        let mut payload = json!({
            "prodRegCode": reg_code,
            "pageNum": 1,
            "pageSize": self.config.nav_page_size,
        });
        if !prod_id.is_empty() {
            payload["prodId"] = Value::String(prod_id);
        }
        let detail = self
            .signed_post("/product/getProductDetail", &payload)
            .await?;
        let basic = detail
            .pointer("/data/prodBasicInfoVo")
            .cloned()
            .unwrap_or(Value::Null);
        let net = detail
            .pointer("/data/productTypeNetValueVo")
            .cloned()
            .unwrap_or(Value::Null);

        let series = nav_series(
            array_at(&net, "/netValueLine"),
            &["netValueDate"],
            &["acumltNetVal", "shareNetVal", "priceBuy", "priceRedeem"],
        );
        let mut returns = WindowReturns::default();
        fill_from_nav(&mut returns, &series, &ReturnWindow::ALL, "chinawealth", &reg_code);

        let pick = |key: &str| match first_text(&basic, &[key]) {
            text if text.is_empty() => first_text(&list_item, &[key]),
            text => text,
        };
        let name = pick("prodName");
        let banks = match self.config.bank_overrides.get(&reg_code) {
            Some(banks) if !banks.is_empty() => banks.clone(),
            _ => self.config.default_banks.clone(),
        };

        Ok(ProductRecord {
            min_hold_days: parse_min_hold_days(&name),
            name,
            code: reg_code.clone(),
            issuer: strip_company_suffix(&pick("orgName")),
            banks,
            currency: first_text(&basic, &["collCcyName"]),
            risk_level: parse_risk_level(&pick("prodRiskLevelName"), REGISTRY_TIERS),
            returns: returns.normalize(),
            url: url.to_string(),
            product_type: WEALTH_TYPE.to_string(),
            registration_code: Some(reg_code),
            sub_share_code: Some(first_text(&net, &["defaultSubShareCode"])),
            ..Default::default()
        })
    }
}
