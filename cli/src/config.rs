use std::{path::Path, time::Duration};

use chainprof_executors::batch::BatchConfig;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChainprofConfig {
    pub log_format: LogFormat,
    pub batch: BatchSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub max_concurrency: Option<usize>,
    pub receipt_timeout_seconds: Option<u64>,
    pub receipt_poll_interval_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            receipt_timeout_seconds: None,
            receipt_poll_interval_ms: 1000,
        }
    }
}

impl BatchSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == Some(0) {
            return Err(ConfigError::Message(
                "batch.max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_batch_config(&self) -> BatchConfig {
        BatchConfig {
            max_concurrency: self.max_concurrency,
            receipt_timeout: self.receipt_timeout_seconds.map(Duration::from_secs),
            receipt_poll_interval: Duration::from_millis(self.receipt_poll_interval_ms.max(1)),
        }
    }
}

/// Loads `path` if given, otherwise an optional `chainprof.{yaml,toml,json}` in
/// the working directory, then applies `CHAINPROF__*` environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<ChainprofConfig, ConfigError> {
    let builder = Config::builder();

    let builder = match path {
        Some(path) => builder.add_source(File::from(path)),
        None => builder.add_source(File::with_name("chainprof").required(false)),
    };

    let config: ChainprofConfig = builder
        .add_source(
            Environment::with_prefix("CHAINPROF")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    config.batch.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_are_unbounded_without_timeout() {
        let config = ChainprofConfig::default();
        assert_eq!(config.log_format, LogFormat::Pretty);

        let batch = config.batch.to_batch_config();
        assert_eq!(batch, BatchConfig::default());
    }

    #[test]
    fn file_values_are_loaded() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "log_format: json\nbatch:\n  max_concurrency: 16\n  receipt_timeout_seconds: 90\n  receipt_poll_interval_ms: 250"
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.log_format, LogFormat::Json);

        let batch = config.batch.to_batch_config();
        assert_eq!(batch.max_concurrency, Some(16));
        assert_eq!(batch.receipt_timeout, Some(Duration::from_secs(90)));
        assert_eq!(batch.receipt_poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[batch]\nmax_concurrency = 4").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.batch.max_concurrency, Some(4));
        assert_eq!(config.batch.receipt_poll_interval_ms, 1000);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[batch]\nmax_concurrency = 0").unwrap();

        let err = load_config(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("max_concurrency"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(load_config(Some(Path::new("/definitely/not/chainprof.yaml"))).is_err());
    }
}
