use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. Output goes to stderr so stdout stays free for command
/// results. Safe to call more than once; later calls are ignored.
pub fn init_logging(force_json: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if cfg!(debug_assertions) && !force_json {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .json()
            .with_target(false)
            .try_init();
    }
}
