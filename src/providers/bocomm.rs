use super::http::HttpClient;
use super::util::{array_at, fill_from_nav, first_text, nav_series, parse_number, query_param};
use crate::core::config::BocommConfig;
use crate::core::product::{ProductProvider, ProductRecord, ReturnWindow, WEALTH_TYPE, WindowReturns};
use crate::core::text::{GRADE_TIERS, parse_min_hold_days, parse_risk_level};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// 交银理财 site API; requests are a JSON envelope sent as the `REQ_MESSAGE` form field.
pub struct BocommProvider {
    http: Arc<HttpClient>,
    config: BocommConfig,
}

impl BocommProvider {
    pub fn new(http: Arc<HttpClient>, config: BocommConfig) -> Self {
        Self { http, config }
    }

    async fn post(&self, endpoint: &str, body: Value) -> Result<Value> {
        let url = format!("{}/SITE/{endpoint}", self.config.base_url.trim_end_matches('/'));
        let envelope = json!({
            "REQ_HEAD": {"TRAN_PROCESS": "", "TRAN_ID": ""},
            "REQ_BODY": body,
        });
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("REQ_MESSAGE", &serde_json::to_string(&envelope)?)
            .finish();
        self.http
            .fetch_json(
                &url,
                Method::POST,
                Some(&form),
                &[("Content-Type", FORM_CONTENT_TYPE)],
            )
            .await
    }
}

fn window_for_interval(interval: &str) -> Option<ReturnWindow> {
    match interval {
        "3" => Some(ReturnWindow::OneMonth),
        "4" => Some(ReturnWindow::ThreeMonths),
        _ => None,
    }
}

#[async_trait]
impl ProductProvider for BocommProvider {
    #[instrument(name = "BocommFetch", skip(self))]
    async fn fetch(&self, url: &str) -> Result<ProductRecord> {
        let fund_code = query_param(url, "c_fundcode")
            .unwrap_or_else(|| self.config.default_fund_code.clone());

        let detail = self
            .post("queryJylcProductDetail.do", json!({"c_fundcode": fund_code}))
            .await?;
        let product = detail
            .pointer("/RSP_BODY/result/jylcProductBo")
            .cloned()
            .unwrap_or(Value::Null);

        let yields = self
            .post(
                "queryAllHistoricalYieldByFundcode.do",
                json!({"c_fundcode": fund_code}),
            )
            .await?;
        let mut returns = WindowReturns::default();
        for item in array_at(&yields, "/RSP_BODY/result") {
            let Some(window) = item
                .get("yieldtimeinterval")
                .and_then(Value::as_str)
                .and_then(window_for_interval)
            else {
                continue;
            };
            let ratio = first_text(item, &["yieldratio"]);
            if ratio.is_empty() {
                continue;
            }
            let Some(value) = parse_number(&Value::String(ratio.clone())) else {
                warn!(product = %fund_code, ratio = %ratio, "unparseable yield ratio");
                continue;
            };
            debug!(
                provider = "bocomm",
                product = %fund_code,
                window = window.key(),
                value,
                start = %first_text(item, &["yieldstartdate"]),
                end = %first_text(item, &["yieldexpiredate"]),
                "return from yield table"
            );
            returns.set(window, Some(value));
        }

        let interest_way = match first_text(&product, &["c_interestway"]) {
            way if way.is_empty() => "0".to_string(),
            way => way,
        };
        let breakdown = self
            .post(
                "queryJylcBreakDetail.do",
                json!({"c_fundcode": fund_code, "c_interestway": interest_way, "type": "max"}),
            )
            .await?;
        let series = nav_series(
            array_at(&breakdown, "/RSP_BODY/result/profitList"),
            &["d_cdate"],
            &["f_netvalue", "f_totalnetvalue"],
        );
        let missing = returns.missing();
        fill_from_nav(&mut returns, &series, &missing, "bocomm", &fund_code);

        let name = first_text(&product, &["c_fundname"]);
        let registration_code = first_text(&product, &["c_productcode"]);
        let banks = match self.config.bank_overrides.get(&fund_code) {
            Some(banks) if !banks.is_empty() => banks.clone(),
            _ => match first_text(&product, &["c_agencyno"]) {
                agency if agency.is_empty() => vec![self.config.default_bank.clone()],
                agency => vec![agency],
            },
        };
        let min_hold_days = self
            .config
            .min_hold_overrides
            .get(&fund_code)
            .copied()
            .filter(|days| *days > 0)
            .or_else(|| parse_min_hold_days(&name));
        let code = self
            .config
            .code_overrides
            .get(&fund_code)
            .filter(|code| !code.is_empty())
            .cloned()
            .or_else(|| (!registration_code.is_empty()).then(|| registration_code.clone()))
            .unwrap_or_else(|| fund_code.clone());
        let currency = match first_text(&product, &["c_moneytype"]) {
            currency if currency.is_empty() => "人民币".to_string(),
            currency => currency,
        };

        Ok(ProductRecord {
            min_hold_days,
            name,
            code,
            issuer: self.config.issuer.clone(),
            banks,
            currency,
            risk_level: parse_risk_level(&first_text(&product, &["c_level"]), GRADE_TIERS),
            returns: returns.normalize(),
            url: url.to_string(),
            product_type: WEALTH_TYPE.to_string(),
            fund_code: Some(fund_code),
            registration_code: Some(registration_code),
            ..Default::default()
        })
    }
}
