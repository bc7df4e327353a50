use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `RUST_LOG` wins; otherwise
/// `default_level` (the configured `log_level`) is used.
pub fn init(default_level: &str) {
    let filter = build_filter(std::env::var("RUST_LOG").ok().as_deref(), default_level);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn build_filter(rust_log: Option<&str>, default_level: &str) -> EnvFilter {
    rust_log
        .filter(|raw| !raw.trim().is_empty())
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .or_else(|| EnvFilter::try_new(default_level.trim().to_lowercase()).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_log_takes_precedence() {
        assert_eq!(build_filter(Some("warn"), "debug").to_string(), "warn");
    }

    #[test]
    fn configured_level_is_used_without_rust_log() {
        assert_eq!(build_filter(None, "DEBUG").to_string(), "debug");
        assert_eq!(build_filter(Some("  "), "trace").to_string(), "trace");
    }
}
