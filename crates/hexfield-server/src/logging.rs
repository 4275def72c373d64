//! Tracing subscriber setup.

use hexfield_engine::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

use crate::error::ServerError;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `logging.level` when set.
pub fn init(config: &LoggingConfig) -> Result<(), ServerError> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level));
    let filter = filter.map_err(|e| ServerError::Logging {
        message: format!("invalid log filter {:?}: {e}", config.level),
    })?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| ServerError::Logging {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_filter_is_reported() {
        let config = LoggingConfig {
            level: "hexfield=loud".into(),
            json: false,
        };
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(init(&config).is_err());
        }
    }
}
