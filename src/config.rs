use crate::error::{ConfigError, SupervisorError};
use crate::sink::SinkKind;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

pub const ENV_CONFIG: &str = "HABERDASHER_CONFIG";
pub const ENV_EMITTER: &str = "HABERDASHER_EMITTER";
pub const ENV_FILE_PATH: &str = "HABERDASHER_FILE_PATH";
pub const ENV_LOG_LEVEL: &str = "HABERDASHER_LOG_LEVEL";

fn default_emitter() -> String { SinkKind::default().as_str().to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_reap_interval_ms() -> u64 { 500 }
fn default_reap_orphans() -> bool { true }


#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_emitter")]
    pub emitter: String,
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_reap_interval_ms")]
    pub reap_interval_ms: u64,
    #[serde(default = "default_reap_orphans")]
    pub reap_orphans: bool,
    #[serde(default)]
    pub max_record_len: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            emitter: default_emitter(),
            file_path: None,
            log_level: default_log_level(),
            reap_interval_ms: default_reap_interval_ms(),
            reap_orphans: default_reap_orphans(),
            max_record_len: None,
        }
    }
}

impl Config {
    pub fn sink_kind(&self) -> Result<SinkKind, ConfigError> {
        self.emitter.parse()
    }

    /// Records are echoed to the diagnostic log unless they already go to stderr.
    pub fn echo_records(&self) -> bool {
        !matches!(self.sink_kind(), Ok(SinkKind::Stderr))
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms.max(1))
    }

    pub fn level(&self) -> Result<tracing::Level, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::InvalidLogLevel(self.log_level.clone()))
    }

    /// Rejects configurations that would only fail later.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sink_kind()? == SinkKind::File && self.file_path.is_none() {
            return Err(ConfigError::MissingFilePath);
        }
        self.level()?;
        Ok(())
    }

    /// Applies `HABERDASHER_*` overrides on top of `self`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(emitter) = lookup(ENV_EMITTER) {
            self.emitter = emitter;
        }
        if let Some(path) = lookup(ENV_FILE_PATH) {
            self.file_path = Some(PathBuf::from(path));
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        self
    }
}



/*
    @@@
    @parser();
    . Reads the YAML file into a String. Any I/O error is returned as ConfigError::Read.
    . Hands the raw YAML text to serde_yaml; missing keys fall back to their defaults.
*/
pub fn parser(path: &Path) -> Result<Config, ConfigError> {
    let yaml_file = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_str(&yaml_file)
}

pub fn parse_str(yaml: &str) -> Result<Config, ConfigError> {
    if yaml.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(yaml)?)
}



/*
    @@@
    @load();
    . Starts from defaults, or from the YAML file named by HABERDASHER_CONFIG when set.
    . Environment variables override the file; the result is validated before it is returned.
*/
pub fn load() -> Result<Config, ConfigError> {
    let base = match env::var_os(ENV_CONFIG) {
        Some(path) => parser(Path::new(&path))?,
        None => Config::default(),
    };
    let cfg = base.with_overrides(|key| env::var(key).ok());
    cfg.validate()?;
    Ok(cfg)
}


/// The child command line: the program followed by its arguments, verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl Command {
    /// Builds the command from the supervisor's own arguments, without argv[0].
    pub fn from_args<I>(args: I) -> Result<Self, SupervisorError>
    where
        I: IntoIterator<Item = OsString>,
    {
        let mut args = args.into_iter();
        let program = args.next().ok_or(SupervisorError::MissingCommand)?;
        Ok(Self {
            program,
            args: args.collect(),
        })
    }

    pub fn display_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}
