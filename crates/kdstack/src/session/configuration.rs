use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::cache::{DEFAULT_CAPACITY, DEFAULT_MAX_DEPTH};
use crate::sink::{LogSink, Sink, WriterSink};

pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_WORKER_THREAD_NAME: &str = "kdstack-drain";
pub const DEFAULT_SINK: SinkTarget = SinkTarget::Stderr;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Configuration {
    /// Slots per ring buffer.
    pub capacity: usize,
    /// Frames kept per sample; deeper stacks are truncated.
    pub max_depth: usize,
    #[serde(rename = "drain_interval_ms", deserialize_with = "deserialize_millis")]
    pub drain_interval: Duration,
    pub worker_thread_name: String,
    pub sink: SinkTarget,
}

/// Where wire records go when the session opens its own sink.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum SinkTarget {
    Stderr,
    Log,
    File(PathBuf),
}

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("invalid sink `{0}`. Valid values are 'stderr', 'log' and 'file:<path>'.")]
    InvalidSinkTarget(String),
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            max_depth: DEFAULT_MAX_DEPTH,
            drain_interval: DEFAULT_DRAIN_INTERVAL,
            worker_thread_name: DEFAULT_WORKER_THREAD_NAME.to_owned(),
            sink: DEFAULT_SINK,
        }
    }
}

impl Configuration {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        let configuration: Configuration = serde_json::from_str(json)?;
        configuration.validate()?;
        Ok(configuration)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.capacity == 0 {
            return Err(ConfigurationError::Invalid("capacity must be at least 1"));
        }
        if self.max_depth == 0 {
            return Err(ConfigurationError::Invalid("max_depth must be at least 1"));
        }
        if self.drain_interval.is_zero() {
            return Err(ConfigurationError::Invalid(
                "drain_interval_ms must be at least 1",
            ));
        }
        if self.worker_thread_name.contains('\0') {
            return Err(ConfigurationError::Invalid(
                "worker_thread_name must not contain NUL bytes",
            ));
        }
        Ok(())
    }
}

impl SinkTarget {
    pub fn open(&self) -> io::Result<Arc<dyn Sink>> {
        let sink: Arc<dyn Sink> = match self {
            SinkTarget::Stderr => Arc::new(WriterSink::new(io::stderr())),
            SinkTarget::Log => Arc::new(LogSink),
            SinkTarget::File(path) => Arc::new(WriterSink::new(
                fs::OpenOptions::new().create(true).append(true).open(path)?,
            )),
        };
        Ok(sink)
    }
}

impl FromStr for SinkTarget {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stderr" => Ok(Self::Stderr),
            "log" => Ok(Self::Log),
            _ => match s.strip_prefix("file:") {
                Some(path) if !path.is_empty() => Ok(Self::File(PathBuf::from(path))),
                _ => Err(ConfigurationError::InvalidSinkTarget(s.to_owned())),
            },
        }
    }
}

impl TryFrom<String> for SinkTarget {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

fn deserialize_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let configuration = Configuration::from_json_str("{}").unwrap();
        assert_eq!(configuration, Configuration::default());
        assert_eq!(configuration.capacity, 4096);
        assert_eq!(configuration.max_depth, 128);
        assert_eq!(configuration.sink, SinkTarget::Stderr);
    }

    #[test]
    fn test_parse() {
        let configuration = Configuration::from_json_str(
            r#"{
                "capacity": 16,
                "max_depth": 8,
                "drain_interval_ms": 250,
                "worker_thread_name": "collector",
                "sink": "file:/tmp/kdstack.log"
            }"#,
        )
        .unwrap();
        assert_eq!(configuration.capacity, 16);
        assert_eq!(configuration.max_depth, 8);
        assert_eq!(configuration.drain_interval, Duration::from_millis(250));
        assert_eq!(configuration.worker_thread_name, "collector");
        assert_eq!(
            configuration.sink,
            SinkTarget::File(PathBuf::from("/tmp/kdstack.log"))
        );
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            Configuration::from_json_str(r#"{"capacity": 0}"#),
            Err(ConfigurationError::Invalid(_))
        ));
        assert!(matches!(
            Configuration::from_json_str(r#"{"max_depth": 0}"#),
            Err(ConfigurationError::Invalid(_))
        ));
        assert!(matches!(
            Configuration::from_json_str(r#"{"drain_interval_ms": 0}"#),
            Err(ConfigurationError::Invalid(_))
        ));
        assert!(matches!(
            Configuration::from_json_str(r#"{"worker_thread_name": "drain\u0000er"}"#),
            Err(ConfigurationError::Invalid(_))
        ));
        assert!(matches!(
            Configuration::from_json_str(r#"{"sink": "socket"}"#),
            Err(ConfigurationError::Json(_))
        ));
        assert!(matches!(
            Configuration::from_json_str(r#"{"capacity": "many"}"#),
            Err(ConfigurationError::Json(_))
        ));
    }

    #[test]
    fn test_sink_target_from_str() {
        assert_eq!("log".parse::<SinkTarget>().unwrap(), SinkTarget::Log);
        assert!(matches!(
            "file:".parse::<SinkTarget>(),
            Err(ConfigurationError::InvalidSinkTarget(_))
        ));
    }

    #[test]
    fn test_from_path_missing_file() {
        assert!(matches!(
            Configuration::from_path("/nonexistent/kdstack.json"),
            Err(ConfigurationError::Io(_))
        ));
    }
}
