//! Tracing subscriber setup for binaries embedding the engines.

use tracing_subscriber::EnvFilter;

/// Crate-specific filter directive; takes precedence over `RUST_LOG`.
pub const LOG_FILTER_ENV: &str = "SOF_LAND_LOG";

/// Directive used when neither variable holds a valid filter.
const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn";

/// Installs a fmt subscriber filtered by `SOF_LAND_LOG`, then `RUST_LOG`.
///
/// Returns `false` when the embedding host already installed a global subscriber.
pub fn init_tracing() -> bool {
    let filter = build_filter(|name| std::env::var(name).ok());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}

/// Picks the first parseable directive from the lookup, falling back to the default.
fn build_filter(lookup: impl Fn(&str) -> Option<String>) -> EnvFilter {
    [LOG_FILTER_ENV, EnvFilter::DEFAULT_ENV]
        .into_iter()
        .filter_map(|name| lookup(name))
        .find_map(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}
