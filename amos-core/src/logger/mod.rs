//! Process-wide tracing setup.
//!
//! ```no_run
//! use amos_core::logger::{LogFormat, LogLevel, LogRotation, Logger};
//!
//! let _guard = Logger::builder()
//!     .level(LogLevel::Debug)
//!     .format(LogFormat::Json)
//!     .both("logs/amos.log".into(), LogRotation::Daily)
//!     .build()
//!     .init()
//!     .expect("logger");
//! ```

mod config;
mod macros;

pub use config::{LogConfig, LogFormat, LogLevel, LogOutput};

pub use tracing;

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::{self, MakeWriter, format::FmtSpan};
use tracing_subscriber::layer::{Layer, Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

const DEFAULT_LOG_FILE: &str = "amos.log";

type Base = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<Base> + Send + Sync>;

pub struct Logger {
    config: LogConfig,
}

impl Logger {
    pub fn new(config: LogConfig) -> Self {
        Self { config }
    }

    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::default()
    }

    /// Install the global subscriber. Keep the guard alive for as long as
    /// file output should be flushed.
    pub fn init(self) -> Result<LoggerGuard, LogError> {
        let filter = self.build_filter();
        let format = self.config.format;
        let mut guards = Vec::new();

        let layers: Vec<BoxedLayer> = match &self.config.output {
            LogOutput::Stdout => vec![format_layer(format, std::io::stdout, true)],
            LogOutput::File { path, rotation } => {
                let (writer, guard) = tracing_appender::non_blocking(file_appender(path, *rotation)?);
                guards.push(guard);
                vec![format_layer(format, writer, false)]
            }
            LogOutput::Both { path, rotation } => {
                let (writer, guard) = tracing_appender::non_blocking(file_appender(path, *rotation)?);
                guards.push(guard);
                vec![
                    format_layer(format, std::io::stdout, true),
                    format_layer(format, writer, false),
                ]
            }
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(layers)
            .try_init()
            .map_err(|_| LogError::AlreadyInitialized)?;
        Ok(LoggerGuard { _guards: guards })
    }

    fn build_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(self.config.level.as_str()))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn format_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(writer)
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(false)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_writer(writer)
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_ansi(ansi)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(ansi)
            .boxed(),
    }
}

fn file_appender(path: &Path, rotation: LogRotation) -> Result<RollingFileAppender, LogError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        Some(_) => Path::new("."),
        None => {
            return Err(LogError::InvalidPath(path.display().to_string()));
        }
    };
    std::fs::create_dir_all(dir)?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE);

    Ok(match rotation {
        LogRotation::Hourly => tracing_appender::rolling::hourly(dir, file_name),
        LogRotation::Daily => tracing_appender::rolling::daily(dir, file_name),
        LogRotation::Never => tracing_appender::rolling::never(dir, file_name),
    })
}

pub struct LoggerGuard {
    _guards: Vec<WorkerGuard>,
}

#[derive(Default)]
pub struct LoggerBuilder {
    level: Option<LogLevel>,
    format: Option<LogFormat>,
    output: Option<LogOutput>,
}

impl LoggerBuilder {
    pub fn config(self, config: LogConfig) -> Self {
        self.level(config.level)
            .format(config.format)
            .output(config.output)
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = Some(output);
        self
    }

    pub fn stdout(self) -> Self {
        self.output(LogOutput::Stdout)
    }

    pub fn file(self, path: std::path::PathBuf, rotation: LogRotation) -> Self {
        self.output(LogOutput::File { path, rotation })
    }

    pub fn both(self, path: std::path::PathBuf, rotation: LogRotation) -> Self {
        self.output(LogOutput::Both { path, rotation })
    }

    pub fn build(self) -> Logger {
        Logger::new(LogConfig {
            level: self.level.unwrap_or(LogLevel::Info),
            format: self.format.unwrap_or(LogFormat::Compact),
            output: self.output.unwrap_or(LogOutput::Stdout),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    Hourly,
    Daily,
    Never,
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid log path: {0}")]
    InvalidPath(String),

    #[error("Invalid logging setting: {0}")]
    InvalidSetting(String),

    #[error("Logger already initialized")]
    AlreadyInitialized,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigEntity;

    #[test]
    fn levels_and_formats_parse() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!(matches!(
            "loud".parse::<LogLevel>(),
            Err(LogError::InvalidSetting(_))
        ));
    }

    #[test]
    fn config_entity_feeds_builder() {
        let mut entity = ConfigEntity::default();
        entity.log_level = "debug".to_string();
        entity.log_format = "pretty".to_string();
        let logger = Logger::builder()
            .config(LogConfig::from_entity(&entity).unwrap())
            .build();
        assert_eq!(logger.config.level, LogLevel::Debug);
        assert_eq!(logger.config.format, LogFormat::Pretty);
        assert!(matches!(logger.config.output, LogOutput::Stdout));
    }

    #[test]
    fn log_file_setting_selects_output() {
        let mut entity = ConfigEntity::default();
        entity.log_file = Some("logs/amos.log".to_string());
        entity.log_rotation = "hourly".to_string();
        match LogConfig::from_entity(&entity).unwrap().output {
            LogOutput::File { path, rotation } => {
                assert_eq!(path, std::path::PathBuf::from("logs/amos.log"));
                assert_eq!(rotation, LogRotation::Hourly);
            }
            other => panic!("unexpected output {other:?}"),
        }

        entity.log_stdout = true;
        assert!(matches!(
            LogConfig::from_entity(&entity).unwrap().output,
            LogOutput::Both { .. }
        ));

        entity.log_rotation = "weekly".to_string();
        assert!(matches!(
            LogConfig::from_entity(&entity),
            Err(LogError::InvalidSetting(_))
        ));
    }

    #[test]
    fn file_appender_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("amos.log");
        file_appender(&path, LogRotation::Never).unwrap();
        assert!(dir.path().join("logs").is_dir());
    }

    #[test]
    fn second_init_is_rejected() {
        let _first = Logger::builder().level(LogLevel::Error).build().init();
        let second = Logger::builder().build().init();
        assert!(matches!(second, Err(LogError::AlreadyInitialized)));
    }
}
