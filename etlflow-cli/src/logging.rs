use etlflow::pipeline::{level_directive, FAILURE_TARGET};
use tracing_subscriber::EnvFilter;

/// Picks the level directive: `--log-level`, then the pipeline's
/// `settings.log_level`, then `info`. Unknown names fall through.
pub fn resolve_level(cli_level: Option<&str>, settings_level: Option<&str>) -> &'static str {
    cli_level
        .and_then(level_directive)
        .or_else(|| settings_level.and_then(level_directive))
        .unwrap_or("info")
}

/// Builds the filter. `RUST_LOG` wins over `level` when set. Tolerated
/// pipeline failures stay visible at every level.
pub fn filter(level: &str) -> EnvFilter {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    keep_failures_visible(filter)
}

fn keep_failures_visible(filter: EnvFilter) -> EnvFilter {
    match format!("{FAILURE_TARGET}=warn").parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

/// Initialize structured logging with tracing-subscriber.
pub fn init(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_target(false)
        .init();
}
