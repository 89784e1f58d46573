//! Unified product record and the provider abstraction

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Category discriminator written to every record.
pub const WEALTH_TYPE: &str = "wealth";

/// Trailing windows reported for every product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnWindow {
    OneMonth,
    ThreeMonths,
    SixMonths,
}

impl ReturnWindow {
    pub const ALL: [ReturnWindow; 3] = [
        ReturnWindow::OneMonth,
        ReturnWindow::ThreeMonths,
        ReturnWindow::SixMonths,
    ];

    pub fn days(&self) -> i64 {
        match self {
            ReturnWindow::OneMonth => 30,
            ReturnWindow::ThreeMonths => 90,
            ReturnWindow::SixMonths => 180,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            ReturnWindow::OneMonth => "1m",
            ReturnWindow::ThreeMonths => "3m",
            ReturnWindow::SixMonths => "6m",
        }
    }
}

/// Per-window returns before serialization; `None` means no data was found.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowReturns {
    pub one_month: Option<f64>,
    pub three_months: Option<f64>,
    pub six_months: Option<f64>,
}

impl WindowReturns {
    pub fn get(&self, window: ReturnWindow) -> Option<f64> {
        match window {
            ReturnWindow::OneMonth => self.one_month,
            ReturnWindow::ThreeMonths => self.three_months,
            ReturnWindow::SixMonths => self.six_months,
        }
    }

    pub fn set(&mut self, window: ReturnWindow, value: Option<f64>) {
        match window {
            ReturnWindow::OneMonth => self.one_month = value,
            ReturnWindow::ThreeMonths => self.three_months = value,
            ReturnWindow::SixMonths => self.six_months = value,
        }
    }

    /// Windows that still have no value.
    pub fn missing(&self) -> Vec<ReturnWindow> {
        ReturnWindow::ALL
            .into_iter()
            .filter(|w| self.get(*w).is_none())
            .collect()
    }

    /// Output form: missing values become `0.0`, present ones are rounded to 4 decimals.
    pub fn normalize(&self) -> Returns {
        let norm = |v: Option<f64>| v.map_or(0.0, |v| (v * 10_000.0).round() / 10_000.0);
        Returns {
            one_month: norm(self.one_month),
            three_months: norm(self.three_months),
            six_months: norm(self.six_months),
        }
    }
}

/// Serialized returns, always carrying all three keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Returns {
    #[serde(rename = "1m")]
    pub one_month: f64,
    #[serde(rename = "3m")]
    pub three_months: f64,
    #[serde(rename = "6m")]
    pub six_months: f64,
}

/// The unified output unit written to the JSON snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub code: String,
    pub issuer: String,
    pub banks: Vec<String>,
    pub currency: String,
    pub min_hold_days: Option<u32>,
    pub risk_level: String,
    pub returns: Returns,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "type")]
    pub product_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fund_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_product_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saa_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fun_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_share_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Fetches a single product page/API and maps it onto a [`ProductRecord`].
#[async_trait]
pub trait ProductProvider: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<ProductRecord>;
}
