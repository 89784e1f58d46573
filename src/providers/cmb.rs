use super::http::HttpClient;
use super::signing::sm4_ecb_signature;
use super::util::{array_at, fill_from_nav, first_text, nav_series, parse_number, query_param};
use crate::core::ScrapeError;
use crate::core::config::CmbConfig;
use crate::core::product::{ProductProvider, ProductRecord, ReturnWindow, WEALTH_TYPE, WindowReturns};
use crate::core::text::{CMB_TIERS, parse_min_hold_days, parse_risk_level, strip_company_suffix};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// 招商银行 agency-product API. Each request carries an SM4 signature of `appId|timestamp`.
pub struct CmbProvider {
    http: Arc<HttpClient>,
    config: CmbConfig,
}

impl CmbProvider {
    pub fn new(http: Arc<HttpClient>, config: CmbConfig) -> Self {
        Self { http, config }
    }

    async fn post(&self, endpoint: &str, query: &[(&str, &str)], payload: &Value) -> Result<Value> {
        let mut url = reqwest::Url::parse(&format!(
            "{}/{endpoint}",
            self.config.base_url.trim_end_matches('/')
        ))
        .map_err(|e| ScrapeError::Domain(format!("Invalid endpoint {endpoint}: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let timestamp = Utc::now().timestamp_millis().to_string();
        let signature = sm4_ecb_signature(
            &self.config.auth_key,
            &format!("{}|{timestamp}", self.config.app_id),
        )?;
        let business_id = Uuid::new_v4().simple().to_string();
        self.http
            .post_json(
                url.as_str(),
                payload,
                &[
                    ("appId", self.config.app_id.as_str()),
                    ("timespan", timestamp.as_str()),
                    ("signature", signature.as_str()),
                    ("X-B3-BusinessId", business_id.as_str()),
                ],
            )
            .await
    }

    async fn value_page(&self, saa_code: &str, fun_code: &str, page: u32) -> Result<Value> {
        let payload = json!({
            "funCod": fun_code,
            "saaCod": saa_code,
            "pageNum": page,
            "pageSize": self.config.page_size,
        });
        self.post("ProductValue/getSAValueByPage", &[], &payload)
            .await
    }

    /// NAV rows across pages, until `totalRecord` rows were seen, a page comes back empty
    /// or the page cap is hit.
    async fn value_rows(&self, saa_code: &str, fun_code: &str) -> Result<Vec<Value>> {
        let first = self.value_page(saa_code, fun_code, 1).await?;
        let mut rows = array_at(&first, "/body/data").to_vec();
        let total = first
            .pointer("/body/totalRecord")
            .and_then(parse_number)
            .filter(|total| *total > 0.0)
            .map_or(rows.len(), |total| total as usize);

        let mut page = 2;
        while rows.len() < total && page <= self.config.max_pages {
            let response = self.value_page(saa_code, fun_code, page).await?;
            let page_rows = array_at(&response, "/body/data");
            if page_rows.is_empty() {
                break;
            }
            rows.extend_from_slice(page_rows);
            page += 1;
        }
        debug!(rows = rows.len(), total, "NAV rows collected");
        Ok(rows)
    }
}

#[async_trait]
impl ProductProvider for CmbProvider {
    #[instrument(name = "CmbFetch", skip(self))]
    async fn fetch(&self, url: &str) -> Result<ProductRecord> {
        let (Some(saa_code), Some(fun_code)) = (query_param(url, "saaCod"), query_param(url, "funCod"))
        else {
            return Err(ScrapeError::MissingParameter {
                parameter: "saaCod/funCod".to_string(),
                url: url.to_string(),
            }
            .into());
        };

        let detail = self
            .post(
                "ProductInfo/getSAProductDetail",
                &[("funCod", fun_code.as_str()), ("saaCod", saa_code.as_str())],
                &json!({}),
            )
            .await?;
        let info = self
            .post(
                "ProductInfo/getSAProductDetailInfo",
                &[("saaCod", saa_code.as_str()), ("funCod", fun_code.as_str())],
                &json!({}),
            )
            .await?;
        let detail = detail.get("body").cloned().unwrap_or(Value::Null);
        let info = info.get("body").cloned().unwrap_or(Value::Null);

        let rows = self.value_rows(&saa_code, &fun_code).await?;
        let series = nav_series(&rows, &["znavDat"], &["znavVal", "znavCtl"]);
        let product = format!("{fun_code}/{saa_code}");
        let mut returns = WindowReturns::default();
        fill_from_nav(&mut returns, &series, &ReturnWindow::ALL, "cmb", &product);

        let prefer = |primary: String, fallback: String| {
            if primary.is_empty() { fallback } else { primary }
        };
        let name = prefer(
            first_text(&info, &["prdName"]),
            first_text(&detail, &["prdBrief"]),
        );
        let registration_code = prefer(
            first_text(&info, &["regCode"]),
            first_text(&detail, &["regcode"]),
        );
        let real_product_code = prefer(first_text(&detail, &["prdCode"]), fun_code.clone());
        let code = prefer(registration_code.clone(), real_product_code.clone());
        let min_hold_days = parse_min_hold_days(&prefer(
            first_text(&info, &["term"]),
            name.clone(),
        ));
        let banks = match self
            .config
            .bank_overrides
            .get(&format!("{saa_code}|{fun_code}"))
        {
            Some(banks) if !banks.is_empty() => banks.clone(),
            _ => self.config.default_banks.clone(),
        };

        Ok(ProductRecord {
            name,
            code,
            issuer: strip_company_suffix(&prefer(
                first_text(&info, &["comNam"]),
                first_text(&detail, &["defMaaCod"]),
            )),
            banks,
            currency: first_text(&info, &["currency"]),
            min_hold_days,
            risk_level: parse_risk_level(&first_text(&info, &["risk"]), CMB_TIERS),
            returns: returns.normalize(),
            url: url.to_string(),
            product_type: WEALTH_TYPE.to_string(),
            registration_code: Some(registration_code),
            real_product_code: Some(real_product_code),
            saa_code: Some(saa_code),
            fun_code: Some(fun_code),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::HttpConfig;
    use wiremock::matchers::{body_partial_json, header, header_exists, method, path, query_param as query};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const URL: &str =
        "https://cfweb.paas.cmbchina.com/wealth/product?saaCod=D07&funCod=GD010101A";

    fn provider(base_url: String) -> CmbProvider {
        let http = Arc::new(
            HttpClient::new(&HttpConfig {
                retries: 0,
                ..HttpConfig::default()
            })
            .unwrap(),
        );
        CmbProvider::new(
            http,
            CmbConfig {
                base_url,
                page_size: 2,
                ..CmbConfig::default()
            },
        )
    }

    async fn mount_product(server: &MockServer, info: Value) {
        Mock::given(method("POST"))
            .and(path("/ProductInfo/getSAProductDetail"))
            .and(query("funCod", "GD010101A"))
            .and(query("saaCod", "D07"))
            .and(header("appId", "LB50.22_CFWebUI"))
            .and(header_exists("signature"))
            .and(header_exists("timespan"))
            .and(header_exists("X-B3-BusinessId"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"body": {
                "prdBrief": "光大阳光金日添利",
                "defMaaCod": "光大理财有限责任公司",
                "prdCode": "EB1234",
            }})))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ProductInfo/getSAProductDetailInfo"))
            .and(query("saaCod", "D07"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "body": info })))
            .mount(server)
            .await;
    }

    async fn mount_values(server: &MockServer, page: u32, rows: Value, total: Value) {
        Mock::given(method("POST"))
            .and(path("/ProductValue/getSAValueByPage"))
            .and(body_partial_json(json!({"pageNum": page, "pageSize": 2, "saaCod": "D07"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"body": {
                "data": rows,
                "totalRecord": total,
            }})))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_fetch_pages_values_until_total() {
        let server = MockServer::start().await;
        mount_product(
            &server,
            json!({
                "prdName": "光大阳光金日添利（最短持有14天）",
                "comNam": "光大理财有限责任公司",
                "regCode": "Z7002219000111",
                "risk": "中低风险",
                "currency": "人民币",
                "term": "",
            }),
        )
        .await;
        mount_values(
            &server,
            1,
            json!([
                {"znavDat": "20240630", "znavVal": "1.0300"},
                {"znavDat": "20240531", "znavVal": "1.0250"},
            ]),
            json!("3"),
        )
        .await;
        mount_values(
            &server,
            2,
            json!([{"znavDat": "20231231", "znavVal": "", "znavCtl": "1.0000"}]),
            json!("3"),
        )
        .await;

        let record = provider(server.uri()).fetch(URL).await.unwrap();
        assert_eq!(record.name, "光大阳光金日添利（最短持有14天）");
        assert_eq!(record.code, "Z7002219000111");
        assert_eq!(record.registration_code.as_deref(), Some("Z7002219000111"));
        assert_eq!(record.real_product_code.as_deref(), Some("EB1234"));
        assert_eq!(record.saa_code.as_deref(), Some("D07"));
        assert_eq!(record.fun_code.as_deref(), Some("GD010101A"));
        assert_eq!(record.issuer, "光大理财");
        assert_eq!(record.banks, vec!["招商银行"]);
        assert_eq!(record.currency, "人民币");
        assert_eq!(record.min_hold_days, Some(14));
        // "低" is checked before "中低"
        assert_eq!(record.risk_level, "R1");
        assert!(record.returns.one_month > 0.0);
        assert!(record.returns.six_months > 0.0);
    }

    #[tokio::test]
    async fn test_fetch_falls_back_to_detail_fields() {
        let server = MockServer::start().await;
        mount_product(&server, json!({"risk": "R3", "term": "90天"})).await;
        mount_values(&server, 1, json!([]), json!(0)).await;

        let record = provider(server.uri()).fetch(URL).await.unwrap();
        assert_eq!(record.name, "光大阳光金日添利");
        assert_eq!(record.issuer, "光大理财");
        assert_eq!(record.code, "EB1234");
        assert_eq!(record.registration_code.as_deref(), Some(""));
        assert_eq!(record.min_hold_days, Some(90));
        assert_eq!(record.risk_level, "R3");
        assert_eq!(record.returns, WindowReturns::default().normalize());
    }

    #[tokio::test]
    async fn test_fetch_requires_both_codes() {
        let err = provider("http://unused".to_string())
            .fetch("https://cfweb.paas.cmbchina.com/wealth/product?saaCod=D07")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing saaCod/funCod in https://cfweb.paas.cmbchina.com/wealth/product?saaCod=D07"
        );
    }
}
