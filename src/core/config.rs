use crate::core::product::ProductRecord;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fs, path::PathBuf};
use tracing::debug;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    pub wealth_links: PathBuf,
    pub fund_links: PathBuf,
    pub wealth_output: PathBuf,
    pub fund_output: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            wealth_links: PathBuf::from("data/wealth_links.txt"),
            fund_links: PathBuf::from("data/fund_links.txt"),
            wealth_output: PathBuf::from("public/data/wealth.json"),
            fund_output: PathBuf::from("public/data/fund.json"),
        }
    }
}

impl PathsConfig {
    /// Overrides paths from `WEALTH_LINKS_PATH`, `FUND_LINKS_PATH`, `WEALTH_OUTPUT_PATH` and
    /// `FUND_OUTPUT_PATH`.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for (var, slot) in [
            ("WEALTH_LINKS_PATH", &mut self.wealth_links),
            ("FUND_LINKS_PATH", &mut self.fund_links),
            ("WEALTH_OUTPUT_PATH", &mut self.wealth_output),
            ("FUND_OUTPUT_PATH", &mut self.fund_output),
        ] {
            if let Some(value) = lookup(var).filter(|v| !v.is_empty()) {
                *slot = PathBuf::from(value);
            }
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub retries: u32,
    pub retry_backoff_secs: f64,
    pub user_agent: String,
    pub ssl_no_verify: bool,
    pub ca_bundle: Option<PathBuf>,
    /// Number of URLs scraped at the same time; 1 keeps the batch strictly sequential.
    pub concurrency: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            timeout_secs: 30,
            retries: 3,
            retry_backoff_secs: 0.8,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            ssl_no_verify: false,
            ca_bundle: None,
            concurrency: 1,
        }
    }
}

impl HttpConfig {
    /// Applies the `WEALTH_*` transport overrides.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if lookup("WEALTH_SSL_NO_VERIFY").as_deref() == Some("1") {
            self.ssl_no_verify = true;
        }
        if let Some(bundle) = lookup("WEALTH_CA_BUNDLE").filter(|v| !v.is_empty()) {
            self.ca_bundle = Some(PathBuf::from(bundle));
        }
        if let Some(retries) = lookup("WEALTH_HTTP_RETRIES").and_then(|v| v.trim().parse().ok()) {
            self.retries = retries;
        }
        if let Some(backoff) = lookup("WEALTH_HTTP_RETRY_BACKOFF")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
        {
            self.retry_backoff_secs = backoff;
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct WealthCcbConfig {
    /// Serves product pages from this origin instead of the one in the URL.
    pub base_url: Option<String>,
    pub issuer: String,
    pub banks: Vec<String>,
    /// Records used when a known page no longer exposes its title, keyed by URL.
    pub fallbacks: BTreeMap<String, ProductRecord>,
}

impl Default for WealthCcbConfig {
    fn default() -> Self {
        let banks = vec!["建设银行".to_string()];
        let issuer = "建信理财".to_string();
        let mut fallbacks = BTreeMap::new();
        fallbacks.insert(
            "https://www.wealthccb.com/product/11.html".to_string(),
            ProductRecord {
                name: "建信理财“安鑫”（最低持有360天）按日开放固定收益类净值型人民币理财产品"
                    .to_string(),
                code: "JXQYAX360D2018202".to_string(),
                issuer: issuer.clone(),
                banks: banks.clone(),
                currency: "人民币".to_string(),
                min_hold_days: Some(360),
                risk_level: "R2".to_string(),
                product_type: crate::core::product::WEALTH_TYPE.to_string(),
                notes: Some("source_missing".to_string()),
                ..Default::default()
            },
        );
        WealthCcbConfig {
            base_url: None,
            issuer,
            banks,
            fallbacks,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CibwmConfig {
    pub base_url: String,
    pub default_bank: String,
    pub default_issuer: String,
    pub nav_page_size: u32,
}

impl Default for CibwmConfig {
    fn default() -> Self {
        CibwmConfig {
            base_url: "https://www.cibwm.com.cn".to_string(),
            default_bank: "兴业银行".to_string(),
            default_issuer: "兴银理财".to_string(),
            nav_page_size: 200,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct BocommConfig {
    pub base_url: String,
    /// Used when the URL carries no `c_fundcode`.
    pub default_fund_code: String,
    pub issuer: String,
    pub default_bank: String,
    pub min_hold_overrides: BTreeMap<String, u32>,
    pub bank_overrides: BTreeMap<String, Vec<String>>,
    pub code_overrides: BTreeMap<String, String>,
}

impl Default for BocommConfig {
    fn default() -> Self {
        BocommConfig {
            base_url: "https://www.bocommwm.cn".to_string(),
            default_fund_code: "5811225495".to_string(),
            issuer: "交银理财".to_string(),
            default_bank: "交通银行".to_string(),
            min_hold_overrides: BTreeMap::from([
                ("5811225149".to_string(), 90),
                ("5811225495".to_string(), 1),
            ]),
            bank_overrides: BTreeMap::from([
                (
                    "5811225149".to_string(),
                    vec!["建设银行".to_string(), "交通银行".to_string()],
                ),
                ("5811225495".to_string(), vec!["交通银行".to_string()]),
            ]),
            code_overrides: BTreeMap::from([(
                "5811225495".to_string(),
                "5811225495".to_string(),
            )]),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SpdbConfig {
    pub base_url: String,
    pub issuer: String,
    pub banks: Vec<String>,
    pub min_hold_days: Option<u32>,
    pub page_size: u32,
    /// Stop paging once this many NAV rows were collected.
    pub max_records: usize,
}

impl Default for SpdbConfig {
    fn default() -> Self {
        SpdbConfig {
            base_url: "https://www.spdb-wm.com".to_string(),
            issuer: "浦银理财".to_string(),
            banks: vec!["交通银行".to_string()],
            min_hold_days: Some(90),
            page_size: 200,
            max_records: 800,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ChinaWealthConfig {
    pub base_url: String,
    pub default_banks: Vec<String>,
    /// Distribution banks keyed by registration code.
    pub bank_overrides: BTreeMap<String, Vec<String>>,
    pub nav_page_size: u32,
}

impl Default for ChinaWealthConfig {
    fn default() -> Self {
        ChinaWealthConfig {
            base_url: "https://xinxipilu.chinawealth.com.cn/lcxp-platService".to_string(),
            default_banks: vec!["工商银行".to_string()],
            bank_overrides: BTreeMap::new(),
            nav_page_size: 200,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CmbConfig {
    pub base_url: String,
    pub app_id: String,
    /// Base64 of the 16-byte SM4 key used for header signatures.
    pub auth_key: String,
    pub default_banks: Vec<String>,
    /// Distribution banks keyed by `"{saaCod}|{funCod}"`.
    pub bank_overrides: BTreeMap<String, Vec<String>>,
    pub page_size: u32,
    pub max_pages: u32,
}

impl Default for CmbConfig {
    fn default() -> Self {
        CmbConfig {
            base_url: "https://cfweb.paas.cmbchina.com/api".to_string(),
            app_id: "LB50.22_CFWebUI".to_string(),
            auth_key: "NXF3QkdqdTczSkFYaWQ0RA==".to_string(),
            default_banks: vec!["招商银行".to_string()],
            bank_overrides: BTreeMap::new(),
            page_size: 200,
            max_pages: 20,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ProvidersConfig {
    pub wealthccb: WealthCcbConfig,
    pub cibwm: CibwmConfig,
    pub bocomm: BocommConfig,
    pub spdb: SpdbConfig,
    pub chinawealth: ChinaWealthConfig,
    pub cmb: CmbConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub http: HttpConfig,
    pub providers: ProvidersConfig,
}

impl AppConfig {
    /// Loads the config at the default location, or built-in defaults when there is none.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config at {}, using built-in defaults",
                config_path.display()
            );
            let mut config = Self::default();
            config.http.apply_env_from(|k| std::env::var(k).ok());
            return Ok(config);
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("", "", "wealth-scraper")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config.http.apply_env_from(|k| std::env::var(k).ok());
        debug!("Successfully loaded config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").expect("Failed to deserialize");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.http.retries, 3);
        assert_eq!(config.http.concurrency, 1);
        assert_eq!(config.providers.spdb.min_hold_days, Some(90));
        assert_eq!(
            config.providers.bocomm.bank_overrides["5811225149"],
            vec!["建设银行", "交通银行"]
        );
        assert!(
            config
                .providers
                .wealthccb
                .fallbacks
                .contains_key("https://www.wealthccb.com/product/11.html")
        );
    }

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
paths:
  wealth_links: "links/wealth.txt"
  fund_output: "out/fund.json"
http:
  retries: 5
  concurrency: 4
providers:
  cibwm:
    base_url: "http://localhost:9000"
  bocomm:
    default_fund_code: "123"
    min_hold_overrides:
      "123": 14
  cmb:
    bank_overrides:
      "A|B": ["招商银行", "平安银行"]
  wealthccb:
    fallbacks:
      "https://www.wealthccb.com/product/1.html":
        name: "Fallback"
        code: "F1"
        issuer: "建信理财"
        banks: ["建设银行"]
        currency: "人民币"
        riskLevel: "R2"
        returns: { "1m": 0.0, "3m": 0.0, "6m": 0.0 }
        type: "wealth"
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.paths.wealth_links, PathBuf::from("links/wealth.txt"));
        assert_eq!(config.paths.fund_links, PathBuf::from("data/fund_links.txt"));
        assert_eq!(config.paths.fund_output, PathBuf::from("out/fund.json"));
        assert_eq!(config.http.retries, 5);
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.http.concurrency, 4);
        assert_eq!(config.providers.cibwm.base_url, "http://localhost:9000");
        assert_eq!(config.providers.cibwm.default_bank, "兴业银行");
        assert_eq!(config.providers.bocomm.default_fund_code, "123");
        assert_eq!(config.providers.bocomm.min_hold_overrides["123"], 14);
        assert_eq!(
            config.providers.cmb.bank_overrides["A|B"],
            vec!["招商银行", "平安银行"]
        );
        let fallback = &config.providers.wealthccb.fallbacks["https://www.wealthccb.com/product/1.html"];
        assert_eq!(fallback.code, "F1");
        assert_eq!(fallback.min_hold_days, None);
    }

    #[test]
    fn test_http_env_overrides() {
        let env = HashMap::from([
            ("WEALTH_SSL_NO_VERIFY", "1"),
            ("WEALTH_CA_BUNDLE", "/etc/ssl/bundle.pem"),
            ("WEALTH_HTTP_RETRIES", "7"),
            ("WEALTH_HTTP_RETRY_BACKOFF", "0.25"),
        ]);
        let mut http = HttpConfig::default();
        http.apply_env_from(|k| env.get(k).map(|v| v.to_string()));

        assert!(http.ssl_no_verify);
        assert_eq!(http.ca_bundle, Some(PathBuf::from("/etc/ssl/bundle.pem")));
        assert_eq!(http.retries, 7);
        assert_eq!(http.retry_backoff_secs, 0.25);
    }

    #[test]
    fn test_http_env_ignores_garbage() {
        let env = HashMap::from([
            ("WEALTH_HTTP_RETRIES", "many"),
            ("WEALTH_SSL_NO_VERIFY", "yes"),
            ("WEALTH_HTTP_RETRY_BACKOFF", "inf"),
        ]);
        let mut http = HttpConfig::default();
        http.apply_env_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(http, HttpConfig::default());
    }

    #[test]
    fn test_paths_env_overrides() {
        let env = HashMap::from([("FUND_OUTPUT_PATH", "/tmp/fund.json"), ("WEALTH_LINKS_PATH", "")]);
        let mut paths = PathsConfig::default();
        paths.apply_env_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(paths.fund_output, PathBuf::from("/tmp/fund.json"));
        assert_eq!(paths.wealth_links, PathBuf::from("data/wealth_links.txt"));
    }
}
