//! Free-text field parsing: holding periods, issuer names and risk grades.

use regex::Regex;
use std::sync::LazyLock;

static HOLD_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(最低持有|最短持有期|持有期|持有)(\d+)(天|日)").expect("valid hold phrase regex")
});
static BARE_DAYS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)天").expect("valid bare days regex"));
static RISK_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)R\d").expect("valid risk token regex"));

/// Keyword rules mapping grading text to a risk tier; the first rule with a matching
/// keyword wins.
pub type RiskTiers = &'static [(&'static [&'static str], &'static str)];

/// Grading words used by 交银理财 and 浦银理财.
pub const GRADE_TIERS: RiskTiers = &[
    (&["较低"], "R2"),
    (&["低"], "R1"),
    (&["中"], "R3"),
    (&["较高"], "R4"),
];

/// Five-tier grading used by the 中国理财网 disclosure platform.
pub const REGISTRY_TIERS: RiskTiers = &[
    (&["一级", "低"], "R1"),
    (&["二级", "中低"], "R2"),
    (&["三级", "中"], "R3"),
    (&["四级", "中高"], "R4"),
    (&["五级", "高"], "R5"),
];

/// Five-tier grading used by 招商银行.
pub const CMB_TIERS: RiskTiers = &[
    (&["低"], "R1"),
    (&["中低"], "R2"),
    (&["中高"], "R4"),
    (&["中"], "R3"),
    (&["高"], "R5"),
];

/// Parses a minimum holding period such as `最低持有360天` or a bare `90天`.
pub fn parse_min_hold_days(text: &str) -> Option<u32> {
    if text.is_empty() {
        return None;
    }
    if let Some(caps) = HOLD_PHRASE.captures(text) {
        return caps[2].parse().ok();
    }
    BARE_DAYS
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
}

/// Removes a trailing `有限责任公司` / `有限公司` legal-entity suffix.
pub fn strip_company_suffix(name: &str) -> String {
    name.strip_suffix("有限责任公司")
        .or_else(|| name.strip_suffix("有限公司"))
        .unwrap_or(name)
        .trim()
        .to_string()
}

/// Extracts an explicit `R<digit>` token, upper-cased.
pub fn find_risk_token(text: &str) -> Option<String> {
    RISK_TOKEN.find(text).map(|m| m.as_str().to_uppercase())
}

/// Buckets grading text into a tier, or `""` when no keyword matches.
pub fn bucket_risk(text: &str, tiers: RiskTiers) -> String {
    tiers
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| text.contains(k)))
        .map(|(_, tier)| tier.to_string())
        .unwrap_or_default()
}

/// Explicit `R<digit>` token first, keyword bucketing second.
pub fn parse_risk_level(text: &str, tiers: RiskTiers) -> String {
    if text.is_empty() {
        return String::new();
    }
    find_risk_token(text).unwrap_or_else(|| bucket_risk(text, tiers))
}
