pub mod bocomm;
pub mod chinawealth;
pub mod cibwm;
pub mod cmb;
pub mod http;
pub mod signing;
pub mod spdb;
pub mod util;
pub mod wealthccb;

use crate::core::config::ProvidersConfig;
use crate::core::{ProductProvider, ProductRecord, ScrapeError};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub use http::HttpClient;

/// Institutions with a dedicated adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    WealthCcb,
    Cibwm,
    Bocomm,
    Spdb,
    ChinaWealth,
    Cmb,
}

impl ProviderKind {
    const HOSTS: [(&'static str, ProviderKind); 6] = [
        ("wealthccb.com", ProviderKind::WealthCcb),
        ("cibwm.com.cn", ProviderKind::Cibwm),
        ("bocommwm.cn", ProviderKind::Bocomm),
        ("spdb-wm.com", ProviderKind::Spdb),
        ("xinxipilu.chinawealth.com.cn", ProviderKind::ChinaWealth),
        ("cfweb.paas.cmbchina.com", ProviderKind::Cmb),
    ];

    /// Adapter responsible for `url`, matched on the host name.
    pub fn from_url(url: &str) -> Option<ProviderKind> {
        let parsed = reqwest::Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();
        Self::HOSTS
            .iter()
            .find(|(fragment, _)| {
                host == *fragment || host.ends_with(&format!(".{fragment}"))
            })
            .map(|(_, kind)| *kind)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::WealthCcb => "wealthccb",
            ProviderKind::Cibwm => "cibwm",
            ProviderKind::Bocomm => "bocomm",
            ProviderKind::Spdb => "spdb",
            ProviderKind::ChinaWealth => "chinawealth",
            ProviderKind::Cmb => "cmb",
        }
    }
}

/// Routes each URL to the adapter of its institution.
pub struct Dispatcher {
    wealthccb: wealthccb::WealthCcbProvider,
    cibwm: cibwm::CibwmProvider,
    bocomm: bocomm::BocommProvider,
    spdb: spdb::SpdbProvider,
    chinawealth: chinawealth::ChinaWealthProvider,
    cmb: cmb::CmbProvider,
}

impl Dispatcher {
    pub fn new(http: Arc<HttpClient>, config: &ProvidersConfig) -> Self {
        Self {
            wealthccb: wealthccb::WealthCcbProvider::new(http.clone(), config.wealthccb.clone()),
            cibwm: cibwm::CibwmProvider::new(http.clone(), config.cibwm.clone()),
            bocomm: bocomm::BocommProvider::new(http.clone(), config.bocomm.clone()),
            spdb: spdb::SpdbProvider::new(http.clone(), config.spdb.clone()),
            chinawealth: chinawealth::ChinaWealthProvider::new(
                http.clone(),
                config.chinawealth.clone(),
            ),
            cmb: cmb::CmbProvider::new(http, config.cmb.clone()),
        }
    }

    fn provider(&self, kind: ProviderKind) -> &dyn ProductProvider {
        match kind {
            ProviderKind::WealthCcb => &self.wealthccb,
            ProviderKind::Cibwm => &self.cibwm,
            ProviderKind::Bocomm => &self.bocomm,
            ProviderKind::Spdb => &self.spdb,
            ProviderKind::ChinaWealth => &self.chinawealth,
            ProviderKind::Cmb => &self.cmb,
        }
    }
}

#[async_trait]
impl ProductProvider for Dispatcher {
    async fn fetch(&self, url: &str) -> Result<ProductRecord> {
        let kind =
            ProviderKind::from_url(url).ok_or_else(|| ScrapeError::UnsupportedUrl(url.to_string()))?;
        debug!("Dispatching {} to {}", url, kind.name());
        self.provider(kind).fetch(url).await
    }
}
