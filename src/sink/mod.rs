//! Log destinations.
//!
//! The supervisor only ever talks to a `Box<dyn Sink>`. Which sink that is
//! gets decided once, at startup, from [`SinkKind`]; nothing registers
//! itself globally.

mod file;
mod stderr;

pub use file::FileSink;
pub use stderr::StderrSink;

use crate::config::Config;
use crate::error::{ConfigError, SinkError};
use crate::record::LogRecord;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

/// A destination for finalized log records.
///
/// Lifecycle: `setup` once, any number of `emit`, then `cleanup` at most
/// once. `cleanup` must cope with a `setup` that failed part way.
#[async_trait]
pub trait Sink: Send {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    async fn setup(&mut self) -> Result<(), SinkError>;

    /// Delivers one record. Must not block indefinitely.
    async fn emit(&mut self, record: &LogRecord) -> Result<(), SinkError>;

    async fn cleanup(&mut self) -> Result<(), SinkError>;
}

/// The sinks that can be selected by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkKind {
    #[default]
    Stderr,
    File,
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkKind::Stderr => "stderr",
            SinkKind::File => "file",
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SinkKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stderr" | "console" => Ok(SinkKind::Stderr),
            "file" => Ok(SinkKind::File),
            _ => Err(ConfigError::UnknownSink(s.to_string())),
        }
    }
}

/// Builds the sink selected by `cfg`. Nothing is opened until `setup`.
pub fn build(cfg: &Config) -> Result<Box<dyn Sink>, ConfigError> {
    match cfg.sink_kind()? {
        SinkKind::Stderr => Ok(Box::new(StderrSink::new())),
        SinkKind::File => {
            let path = cfg.file_path.clone().ok_or(ConfigError::MissingFilePath)?;
            Ok(Box::new(FileSink::new(path)))
        }
    }
}
