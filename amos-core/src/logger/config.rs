use std::path::PathBuf;
use std::str::FromStr;

use super::{LogError, LogRotation};
use crate::config::ConfigEntity;

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
        }
    }
}

impl LogConfig {
    /// Build from the `log_*` settings.
    pub fn from_entity(cfg: &ConfigEntity) -> Result<Self, LogError> {
        let output = match &cfg.log_file {
            None => LogOutput::Stdout,
            Some(path) => {
                let path = PathBuf::from(path);
                let rotation = cfg.log_rotation.parse()?;
                if cfg.log_stdout {
                    LogOutput::Both { path, rotation }
                } else {
                    LogOutput::File { path, rotation }
                }
            }
        };
        Ok(Self {
            level: cfg.log_level.parse()?,
            format: cfg.log_format.parse()?,
            output,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(LogError::InvalidSetting(format!("log level '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(LogError::InvalidSetting(format!("log format '{other}'"))),
        }
    }
}

impl FromStr for LogRotation {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "never" => Ok(Self::Never),
            other => Err(LogError::InvalidSetting(format!("log rotation '{other}'"))),
        }
    }
}

#[derive(Debug, Clone)]
pub enum LogOutput {
    Stdout,
    File {
        path: PathBuf,
        rotation: LogRotation,
    },
    Both {
        path: PathBuf,
        rotation: LogRotation,
    },
}
