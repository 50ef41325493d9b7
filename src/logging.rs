// 📝 Logging
// tracing subscriber setup. RUST_LOG, when set, wins over the configured level.

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{Result, UnificationError};
use tracing_subscriber::EnvFilter;

/// Filter directive for a configured level, scoped to this crate
pub fn default_directive(level: &str) -> String {
    format!("prospect_unification={0},unify={0}", level.to_lowercase())
}

/// Install the global subscriber; fails if one is already installed
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };

    installed.map_err(|e| UnificationError::Configuration(format!("logging: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(
            default_directive("DEBUG"),
            "prospect_unification=debug,unify=debug"
        );
    }
}
