use super::http::HttpClient;
use super::util::rebase_url;
use crate::core::config::WealthCcbConfig;
use crate::core::product::{ProductProvider, ProductRecord, ReturnWindow, WEALTH_TYPE, WindowReturns};
use crate::core::series::{NavPoint, compute_return_from_series, parse_date};
use crate::core::text::{find_risk_token, parse_min_hold_days};
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::{Arc, LazyLock};
use tracing::{debug, instrument, warn};

static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h4.cp-title").expect("valid title selector"));
static RISK_PARAGRAPH: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p.firtst").expect("valid risk selector"));
static PAREN_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^)]+)\)").expect("valid code regex"));
static CHART_BRANCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"if\(time\s*==\s*'").expect("valid branch regex"));
static X_DATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"xData\s*=\s*\[([^\]]*)\]").expect("valid xData regex"));
static S_DATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"sData\s*=\s*\[([^\]]*)\]").expect("valid sData regex"));
static DATE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{8}").expect("valid date regex"));
static NUMBER_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("valid number regex"));

/// Chart branch keys on the product page and the window each one covers.
const CHART_KEYS: [(&str, ReturnWindow); 3] = [
    ("week", ReturnWindow::OneMonth),
    ("month", ReturnWindow::ThreeMonths),
    ("byear", ReturnWindow::SixMonths),
];

/// 建信理财 product pages: HTML with NAV charts embedded as inline JS.
pub struct WealthCcbProvider {
    http: Arc<HttpClient>,
    config: WealthCcbConfig,
}

impl WealthCcbProvider {
    pub fn new(http: Arc<HttpClient>, config: WealthCcbConfig) -> Self {
        Self { http, config }
    }

    pub fn parse_html(&self, html: &str, url: &str) -> ProductRecord {
        let document = Html::parse_document(html);

        let title = document
            .select(&TITLE)
            .next()
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default();
        let code = PAREN_CODE
            .captures(&title)
            .map(|caps| caps[1].trim().to_string())
            .unwrap_or_default();
        let name_raw = if code.is_empty() {
            title.clone()
        } else {
            title.replace(&format!("({code})"), "")
        };
        let name = name_raw.split_whitespace().collect::<Vec<_>>().join(" ");

        let risk_level = find_risk_paragraph(&document)
            .and_then(|text| find_risk_token(&text))
            .unwrap_or_default();

        let mut returns = WindowReturns::default();
        for (key, window) in CHART_KEYS {
            let series = extract_series(html, key);
            let value = compute_return_from_series(&series);
            debug!(
                provider = "wealthccb",
                product = %code,
                window = window.key(),
                points = series.len(),
                value = ?value,
                "return from chart block"
            );
            returns.set(window, value);
        }

        ProductRecord {
            min_hold_days: parse_min_hold_days(&name),
            name,
            code,
            issuer: self.config.issuer.clone(),
            banks: self.config.banks.clone(),
            currency: "人民币".to_string(),
            risk_level,
            returns: returns.normalize(),
            url: url.to_string(),
            product_type: WEALTH_TYPE.to_string(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ProductProvider for WealthCcbProvider {
    #[instrument(name = "WealthCcbFetch", skip(self))]
    async fn fetch(&self, url: &str) -> Result<ProductRecord> {
        let page_url = match &self.config.base_url {
            Some(base) => rebase_url(url, base)?,
            None => url.to_string(),
        };
        let html = self
            .http
            .get_text(&page_url)
            .await
            .with_context(|| format!("Failed to fetch product page {page_url}"))?;

        let record = self.parse_html(&html, url);
        if (record.name.is_empty() || record.code.is_empty())
            && let Some(fallback) = self.config.fallbacks.get(url)
        {
            warn!("Title missing on {}, using stored record", url);
            return Ok(ProductRecord {
                url: url.to_string(),
                ..fallback.clone()
            });
        }
        Ok(record)
    }
}

/// Text of the `p.firtst` paragraph that carries an `R<n>` token and is directly followed by
/// the `风险等级` label paragraph.
fn find_risk_paragraph(document: &Html) -> Option<String> {
    document.select(&RISK_PARAGRAPH).find_map(|el| {
        let text = el.text().collect::<String>().trim().to_string();
        find_risk_token(&text)?;
        let label = el.next_siblings().find_map(ElementRef::wrap)?;
        let is_label = label.value().name() == "p"
            && label.value().classes().any(|c| c == "second")
            && label.text().collect::<String>().trim().starts_with("风险等级");
        is_label.then_some(text)
    })
}

/// Pairs of (date, NAV) from the `if(time == '<key>')` branch of the chart script.
fn extract_series(html: &str, time_key: &str) -> Vec<NavPoint> {
    let Some(block) = chart_block(html, time_key) else {
        return Vec::new();
    };
    let dates = pick_values(&X_DATA, &DATE_TOKEN, block);
    let values = pick_values(&S_DATA, &NUMBER_TOKEN, block);

    dates
        .iter()
        .zip(values.iter())
        .filter_map(|(date, value)| Some((parse_date(date)?, value.parse::<f64>().ok()?)))
        .collect()
}

fn chart_block<'a>(html: &'a str, time_key: &str) -> Option<&'a str> {
    let opening = format!("{time_key}')");
    let start = CHART_BRANCH
        .find_iter(html)
        .find(|m| html[m.end()..].starts_with(&opening))
        .map(|m| m.end() + opening.len())?;
    let rest = &html[start..];
    let end = CHART_BRANCH.find(rest).map_or(rest.len(), |m| m.start());
    Some(&rest[..end])
}

/// Among all `name = [...]` arrays in the block, the token list of the one with most tokens.
fn pick_values<'a>(array: &Regex, token: &Regex, block: &'a str) -> Vec<&'a str> {
    array
        .captures_iter(block)
        .filter_map(|caps| caps.get(1))
        .map(|m| {
            token
                .find_iter(m.as_str())
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
        })
        .fold(Vec::new(), |best, candidate| {
            if candidate.len() > best.len() {
                candidate
            } else {
                best
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::HttpConfig;
    use crate::core::series::annualized_return;
    use chrono::NaiveDate;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PRODUCT_HTML: &str = r#"<html><body>
<div class="cp-head">
  <h4 class="cp-title">建信理财“安鑫”（最低持有360天）按日开放固定收益类净值型人民币理财产品
     <span>(JXQYAX360D2018202)</span></h4>
</div>
<div class="cp-risk">
  <p class="firtst"> 二级（中低）R2 </p>
  <p class="second">风险等级</p>
</div>
<script>
function drawChart(time) {
  var xData = [];
  var sData = [];
  if(time == 'week'){
    xData = ['20240601','20240602','20240608'];
    sData = [1.0000, 1.0003, 1.0010];
  }
  if(time == 'month'){
    xData = ['20240310','20240608'];
    sData = [1.0000,1.0100];
  }
  if(time == 'byear'){
    xData = ['20231211','20240608'];
    sData = [1.0000,1.0200];
  }
  render(xData, sData);
}
</script>
</body></html>"#;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn provider(base_url: Option<String>) -> WealthCcbProvider {
        let http = Arc::new(HttpClient::new(&HttpConfig::default()).unwrap());
        WealthCcbProvider::new(
            http,
            WealthCcbConfig {
                base_url,
                ..WealthCcbConfig::default()
            },
        )
    }

    #[test]
    fn test_parse_html() {
        let url = "https://www.wealthccb.com/product/12.html";
        let record = provider(None).parse_html(PRODUCT_HTML, url);

        assert_eq!(
            record.name,
            "建信理财“安鑫”（最低持有360天）按日开放固定收益类净值型人民币理财产品"
        );
        assert_eq!(record.code, "JXQYAX360D2018202");
        assert_eq!(record.issuer, "建信理财");
        assert_eq!(record.banks, vec!["建设银行"]);
        assert_eq!(record.currency, "人民币");
        assert_eq!(record.min_hold_days, Some(360));
        assert_eq!(record.risk_level, "R2");
        assert_eq!(record.url, url);
        assert_eq!(record.product_type, "wealth");

        let expected = WindowReturns {
            one_month: annualized_return(1.0, 1.001, d(2024, 6, 1), d(2024, 6, 8)),
            three_months: annualized_return(1.0, 1.01, d(2024, 3, 10), d(2024, 6, 8)),
            six_months: annualized_return(1.0, 1.02, d(2023, 12, 11), d(2024, 6, 8)),
        };
        assert_eq!(record.returns, expected.normalize());
    }

    #[test]
    fn test_extract_series_prefers_largest_array() {
        let series = extract_series(PRODUCT_HTML, "week");
        assert_eq!(series.len(), 3);
        assert_eq!(series[2], (d(2024, 6, 8), 1.001));
        assert!(extract_series(PRODUCT_HTML, "year").is_empty());
    }

    #[test]
    fn test_parse_html_without_chart_or_risk() {
        let html = r#"<h4 class="cp-title">稳健 产品(ABC123)</h4><p class="firtst">R3</p><p>其他</p>"#;
        let record = provider(None).parse_html(html, "https://www.wealthccb.com/p.html");
        assert_eq!(record.name, "稳健 产品");
        assert_eq!(record.code, "ABC123");
        assert_eq!(record.risk_level, "");
        assert_eq!(record.min_hold_days, None);
        assert_eq!(record.returns, WindowReturns::default().normalize());
    }

    #[tokio::test]
    async fn test_fetch_through_mirror() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/product/12.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PRODUCT_HTML))
            .mount(&mock_server)
            .await;

        let url = "https://www.wealthccb.com/product/12.html";
        let record = provider(Some(mock_server.uri())).fetch(url).await.unwrap();
        assert_eq!(record.code, "JXQYAX360D2018202");
        assert_eq!(record.url, url);
    }

    #[tokio::test]
    async fn test_fetch_uses_fallback_when_title_missing() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/product/11.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>维护中</html>"))
            .mount(&mock_server)
            .await;

        let url = "https://www.wealthccb.com/product/11.html";
        let record = provider(Some(mock_server.uri())).fetch(url).await.unwrap();
        assert_eq!(record.code, "JXQYAX360D2018202");
        assert_eq!(record.min_hold_days, Some(360));
        assert_eq!(record.notes.as_deref(), Some("source_missing"));
        assert_eq!(record.url, url);
    }

    #[tokio::test]
    async fn test_fetch_without_fallback_returns_parsed_record() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&mock_server)
            .await;

        let url = "https://www.wealthccb.com/product/99.html";
        let record = provider(Some(mock_server.uri())).fetch(url).await.unwrap();
        assert!(record.name.is_empty());
        assert!(record.code.is_empty());
    }
}
