use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use serde::Deserialize;
use tracing::warn;

use crate::console::ConsoleSink;
use crate::error::AuditError;
use crate::format::{validate_timestamp_format, SimpleFormatter, DEFAULT_TIMESTAMP_FORMAT};
use crate::sink::{AsyncFileSink, AuditSink, DEFAULT_CAPACITY};
use crate::writer::FileSink;

/// Which sink [`build_sink`] constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkMode {
    /// Queued file sink with a background writer task.
    #[default]
    AsyncFile,
    /// Direct file sink that writes on the caller's task.
    File,
    /// Standard output.
    Console,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub mode: SinkMode,
    #[serde(default = "default_path")]
    pub path: PathBuf,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            mode: SinkMode::default(),
            path: default_path(),
            capacity: default_capacity(),
            timestamp_format: default_timestamp_format(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default-value functions used by serde
// ---------------------------------------------------------------------------

fn default_path() -> PathBuf {
    PathBuf::from("audit.log")
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_timestamp_format() -> String {
    DEFAULT_TIMESTAMP_FORMAT.to_string()
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load audit configuration from a YAML file.
///
/// If the file does not exist a default configuration is returned and a
/// warning is emitted.
pub fn load(path: &Path) -> anyhow::Result<AuditConfig> {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "audit configuration file not found; using defaults"
        );
        return Ok(AuditConfig::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read audit config file: {}", path.display()))?;
    load_from_str(&contents)
        .with_context(|| format!("failed to parse audit config file: {}", path.display()))
}

/// Parse and validate an [`AuditConfig`] from a YAML string.
pub fn load_from_str(yaml: &str) -> anyhow::Result<AuditConfig> {
    let config: AuditConfig = serde_yml::from_str(yaml).context("YAML deserialization failed")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &AuditConfig) -> anyhow::Result<()> {
    if config.capacity == 0 {
        bail!("capacity must be greater than zero");
    }
    validate_timestamp_format(&config.timestamp_format)?;
    Ok(())
}

/// Construct the sink described by `config`.
///
/// File-backed modes open their file immediately, so a bad path fails
/// here rather than on the first event.
pub async fn build_sink(config: &AuditConfig) -> Result<Arc<dyn AuditSink>, AuditError> {
    let formatter = Arc::new(SimpleFormatter::with_timestamp_format(
        config.timestamp_format.as_str(),
    )?);

    let sink: Arc<dyn AuditSink> = match config.mode {
        SinkMode::AsyncFile => Arc::new(
            AsyncFileSink::builder(&config.path)
                .formatter(formatter)
                .capacity(config.capacity)
                .open()
                .await?,
        ),
        SinkMode::File => Arc::new(FileSink::open(&config.path, formatter).await?),
        SinkMode::Console => Arc::new(ConsoleSink::with_writer(tokio::io::stdout(), formatter)),
    };

    Ok(sink)
}
