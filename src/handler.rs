//! Entry point for cloud-function invocations.

use crate::core::config::{AppConfig, PathsConfig};
use crate::{RunSummary, run_scrape};
use anyhow::Result;
use serde_json::Value;
use std::path::PathBuf;
use tracing::{debug, info};

/// Decodes the invocation payload. A JSON string is parsed as the event; anything that is
/// not an object afterwards counts as an empty event.
pub fn parse_event(event: Value) -> Value {
    let event = match event {
        Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::Null),
        other => other,
    };
    if event.is_object() {
        event
    } else {
        debug!("Ignoring non-object event payload");
        Value::Object(Default::default())
    }
}

/// Each path comes from the event key of the same name, else from the environment, else
/// from `defaults`.
pub fn resolve_paths(
    event: &Value,
    defaults: &PathsConfig,
    env: impl Fn(&str) -> Option<String>,
) -> PathsConfig {
    let mut paths = defaults.clone();
    paths.apply_env_from(env);
    for (key, slot) in [
        ("wealth_links", &mut paths.wealth_links),
        ("fund_links", &mut paths.fund_links),
        ("wealth_output", &mut paths.wealth_output),
        ("fund_output", &mut paths.fund_output),
    ] {
        if let Some(value) = event
            .get(key)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
        {
            *slot = PathBuf::from(value);
        }
    }
    paths
}

pub async fn handle_event(event: Value, config: &AppConfig) -> Result<RunSummary> {
    let event = parse_event(event);
    let paths = resolve_paths(&event, &config.paths, |k| std::env::var(k).ok());
    info!(?paths, "Handling scrape event");
    run_scrape(&paths, config).await
}
