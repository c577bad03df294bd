use tracing_subscriber::EnvFilter;

/// Pick the log level: `--verbose` > `--quiet` > `--log-level` > config.
pub fn resolve_level<'a>(
    verbose: bool,
    quiet: bool,
    cli_level: Option<&'a str>,
    config_level: &'a str,
) -> &'a str {
    if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        cli_level.unwrap_or(config_level)
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `level`.
pub fn init(level: &str, format: &str) {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // A second call (e.g. from tests) keeps the first subscriber.
    let _ = match format {
        "json" => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .json()
            .with_target(true)
            .try_init(),
        "compact" => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .compact()
            .with_target(false)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_target(false)
            .try_init(),
    };
}
