use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub mod formatter;

pub use formatter::*;

use crate::configs::Config;

/// Builds the filter directive from the `[logging]` section. `RUST_LOG`
/// takes precedence when set.
pub fn filter_directive(config: &Config) -> String {
    let logging = config.logging.clone().unwrap_or_default();
    match logging.filters() {
        Some(filters) => format!("{},symphonia=warn,{}", logging.level(), filters),
        None => format!("{},symphonia=warn", logging.level()),
    }
}

pub fn init(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config)));

    let stdout_layer = fmt::layer()
        .event_format(CustomFormatter::new(true))
        .with_ansi(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::LoggingConfig;

    #[test]
    fn directive_defaults_to_info() {
        let config = Config::default();
        assert_eq!(filter_directive(&config), "info,symphonia=warn");
    }

    #[test]
    fn directive_appends_extra_filters() {
        let config = Config {
            logging: Some(LoggingConfig {
                level: Some("debug".into()),
                filters: Some("tower_http=warn".into()),
            }),
            ..Config::default()
        };
        assert_eq!(
            filter_directive(&config),
            "debug,symphonia=warn,tower_http=warn"
        );
    }

    #[test]
    fn blank_filters_are_ignored() {
        let config = Config::from_toml("[logging]\nfilters = \"  \"\n").unwrap();
        assert_eq!(filter_directive(&config), "info,symphonia=warn");
    }
}
