//! Tracing setup for the CLI and for applications embedding the readers.
//!
//! Reader events carry `device`, `channel` and `status` fields. The subscriber
//! installed here writes them to stderr (stdout is left for acquired data) as
//! pretty, compact or JSON lines. `RUST_LOG` directives take precedence over the
//! configured level.
//!
//! # Example
//! ```no_run
//! use daq_readers::logging::{self, OutputFormat, TracingConfig};
//! use tracing::Level;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! logging::init(TracingConfig::new(Level::DEBUG).with_format(OutputFormat::Json))?;
//! tracing::info!(device = "arduino", "Acquisition started");
//! # Ok(())
//! # }
//! ```

use crate::config::AppConfig;
use tracing::Level;
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Output format for tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Multi-line, human-oriented
    Pretty,
    /// One line per event
    Compact,
    /// One JSON object per event
    Json,
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Default level when `RUST_LOG` is unset
    pub level: Level,
    /// Output format
    pub format: OutputFormat,
    /// ANSI colors (ignored for JSON)
    pub with_ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Compact,
            with_ansi: true,
        }
    }
}

impl TracingConfig {
    /// Settings at `level` with everything else defaulted.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Settings from the `[application]` section of the run configuration.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, String> {
        parse_log_level(&config.application.log_level).map(Self::new)
    }

    /// Replace the level when an override is given (e.g. from the command line).
    pub fn with_level_override(mut self, level: Option<&str>) -> Result<Self, String> {
        if let Some(level) = level {
            self.level = parse_log_level(level)?;
        }
        Ok(self)
    }

    /// Set output format
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable ANSI colors
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }
}

/// Install the global subscriber.
///
/// A second call is a no-op, so tests and embedding applications may call it
/// freely.
pub fn init(config: TracingConfig) -> Result<(), String> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.level).into())
        .from_env_lossy();

    let base = fmt::layer().with_writer(std::io::stderr);
    let layer = match config.format {
        OutputFormat::Pretty => base.pretty().with_ansi(config.with_ansi).boxed(),
        OutputFormat::Compact => base.compact().with_ansi(config.with_ansi).boxed(),
        OutputFormat::Json => base.json().with_ansi(false).boxed(),
    };

    match tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
    {
        Ok(()) => Ok(()),
        Err(e) if e.to_string().contains("already been set") => Ok(()),
        Err(e) => Err(format!("Failed to initialize tracing: {e}")),
    }
}

/// Parse a level name (case-insensitive).
pub fn parse_log_level(level: &str) -> Result<Level, String> {
    level.parse::<Level>().map_err(|_| {
        format!("Invalid log level '{level}'. Must be one of: trace, debug, info, warn, error")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("trace"), Ok(Level::TRACE));
        assert_eq!(parse_log_level("INFO"), Ok(Level::INFO));
        assert_eq!(parse_log_level("Debug"), Ok(Level::DEBUG));
        assert!(parse_log_level("loud").is_err());
    }

    #[test]
    fn test_from_app_config_with_override() {
        let config = AppConfig::from_toml_str(
            r#"
            [application]
            log_level = "debug"

            [device]
            kind = "udp"
            addr = "127.0.0.1:0"
            array_len = 1
            samples_per_read = 1
            "#,
        )
        .unwrap();

        let from_file = TracingConfig::from_app_config(&config).unwrap();
        assert_eq!(from_file.level, Level::DEBUG);

        let overridden = from_file.clone().with_level_override(Some("warn")).unwrap();
        assert_eq!(overridden.level, Level::WARN);

        let kept = from_file.with_level_override(None).unwrap();
        assert_eq!(kept.level, Level::DEBUG);
    }

    #[test]
    fn test_bad_override_rejected() {
        let result = TracingConfig::default().with_level_override(Some("verbose"));
        assert!(result.is_err());
    }

    #[test]
    fn test_init_twice_is_ok() {
        let config = TracingConfig::new(Level::WARN)
            .with_format(OutputFormat::Json)
            .with_ansi(false);
        assert!(init(config.clone()).is_ok());
        assert!(init(config).is_ok());
    }
}
