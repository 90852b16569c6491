use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Parse a `--log-level` value, falling back to `default` when unrecognised
pub fn parse_level(level: &str, default: Level) -> Level {
    match level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => default,
    }
}

pub fn setup_logging(level: &str, default: Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(level, default))
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}
