use std::io;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::{
    fmt::time::UtcTime, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
    EnvFilter, Layer,
};

const LOG_LEVEL_VAR: &str = "RUSTY_WALLPAPERS_LOG_LEVEL";

pub(crate) fn init() -> Result<()> {
    let fmt_env_filter = env_filter_merge_from_environment("info", LOG_LEVEL_VAR)?;
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_timer(UtcTime::rfc_3339())
        .with_filter(fmt_env_filter);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .context("Failed to set global default tracing subscriber")?;

    Ok(())
}

fn env_filter_merge_from_environment(
    default_directives: &'static str,
    env_var: &'static str,
) -> Result<EnvFilter> {
    let value = std::env::var(env_var).ok();
    merge_directives(default_directives, value.as_deref())
}

fn merge_directives(default_directives: &'static str, extra: Option<&str>) -> Result<EnvFilter> {
    let mut filter = EnvFilter::builder()
        .parse(default_directives)
        .with_context(|| anyhow!("Default directives were invalid: {default_directives}"))?;

    for directive in extra.into_iter().flat_map(|value| value.split(',')) {
        match directive.parse() {
            Ok(parsed) => filter = filter.add_directive(parsed),
            Err(err) => eprintln!("WARN ignoring log directive: {directive:?}: {err}"),
        }
    }

    Ok(filter)
}
