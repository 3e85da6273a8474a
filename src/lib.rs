/* src/lib.rs */

// Re-export modules for both binary and tests
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logger;
pub mod reaper;
pub mod record;
pub mod signals;
pub mod sink;
pub mod supervisor;
pub mod tokenizer;

pub use config::{Command, Config};
pub use error::{ConfigError, SinkError, SupervisorError};
pub use lifecycle::{Lifecycle, State};
pub use record::LogRecord;
pub use signals::{ChildPid, ShutdownSignal};
pub use sink::{Sink, SinkKind};
pub use supervisor::{ExitReason, Supervisor};
pub use tokenizer::LogCodec;
