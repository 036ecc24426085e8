use std::env;

use tracing_subscriber::{EnvFilter, fmt};

use crate::use_color_stderr;

const LOG_ENV_VAR: &str = "SSO_BROKER_LOG";
const DEFAULT_LOG_FILTER: &str = "warn";

/// Diagnostics go to stderr so `credentials` output stays clean on stdout.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = env_filter(env::var(LOG_ENV_VAR).ok(), env::var("RUST_LOG").ok());
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(use_color_stderr())
        .try_init();
}

fn env_filter(broker_log: Option<String>, rust_log: Option<String>) -> EnvFilter {
    [broker_log, rust_log]
        .into_iter()
        .flatten()
        .filter(|directives| !directives.trim().is_empty())
        .find_map(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}
