//! Error types for the supervisor, its sinks and its configuration.
//!
//! - [`SupervisorError`]: startup-fatal failures; the process exits non-zero.
//! - [`SinkError`]: failures of a sink phase; always logged, never fatal.
//! - [`ConfigError`]: invalid configuration, rejected before anything starts.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Startup preconditions that could not be met.
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// No child command was given on the command line.
    #[error("no command given; usage: haberdasher <command> [args...]")]
    MissingCommand,

    /// The child could not be spawned (not found, not executable, ...).
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The child was spawned but its stderr pipe is unavailable.
    #[error("stderr of `{program}` could not be captured")]
    StderrUnavailable { program: String },

    /// Signal handlers could not be installed.
    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] io::Error),
}

impl SupervisorError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::MissingCommand => "missing_command",
            SupervisorError::Spawn { .. } => "spawn_failed",
            SupervisorError::StderrUnavailable { .. } => "stderr_unavailable",
            SupervisorError::Signals(_) => "signals_unavailable",
        }
    }
}

/// Failure of one sink phase.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sink i/o error: {0}")]
    Io(#[from] io::Error),

    /// `emit` was called before a successful `setup`.
    #[error("sink `{sink}` is not ready")]
    NotReady { sink: &'static str },
}

/// Configuration rejected at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown emitter `{0}` (expected one of: stderr, file)")]
    UnknownSink(String),

    #[error("emitter `file` requires a file path (HABERDASHER_FILE_PATH)")]
    MissingFilePath,

    #[error("unknown log level `{0}`")]
    InvalidLogLevel(String),

    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}
