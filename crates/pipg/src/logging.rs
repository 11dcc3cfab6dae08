use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Level {
    Quiet,
    Default,
    Verbose,
}

/// Configure the `tracing` subscriber: warnings by default, debug output for
/// the workspace crates under `--verbose`, nothing under `--quiet`. `RUST_LOG`
/// overrides either way.
pub(crate) fn setup_logging(level: Level) {
    let directive = match level {
        Level::Quiet => "off",
        Level::Default => "warn",
        Level::Verbose => "pipg=debug,pipg_client=debug,pipg_resolver=debug,pipg_fetch=debug,\
                           pipg_cache=debug,pipg_install_wheel=debug,pipg_interpreter=debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
