use tracing_subscriber::{
    EnvFilter, fmt, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

/// `RUST_LOG` sets the baseline (`warn` when unset); `--verbose` or `WEALTH_DEBUG=1` adds
/// debug output for this crate on top of it.
pub fn init_logging(verbose: bool) {
    let debug = verbose || std::env::var("WEALTH_DEBUG").is_ok_and(|v| v == "1");
    let rust_log = std::env::var("RUST_LOG").ok();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).without_time())
        .with(build_filter(debug, rust_log.as_deref()))
        .init();
}

fn build_filter(debug: bool, rust_log: Option<&str>) -> EnvFilter {
    let base = rust_log
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("warn");
    if debug {
        EnvFilter::new(format!("{base},wealth_scraper=debug"))
    } else {
        EnvFilter::new(base)
    }
}
