//! Configuration types for the stand-in server.

mod rules;

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

pub use rules::{Rule, DEFAULT_IGNORED_HEADERS, NO_MATCH_RESPONSE};

/// Port used when none is given on the command line.
pub const DEFAULT_PORT: u16 = 8888;

/// Rule file looked up next to the executable when none is given on the command line.
pub const BASE_CONFIG_FILE: &str = "baseConfig.json";

/// Built-in copy of the base rule file, used when none sits next to the executable.
pub const BASE_CONFIG: &str = include_str!("../../baseConfig.json");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file is missing: '{0}'")]
    Missing(PathBuf),
    #[error("Failed to read configuration file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse configuration file '{path}': {message}")]
    Parse { path: PathBuf, message: String },
    #[error("Configuration must be a list of rules, found {0}")]
    NotAnArray(&'static str),
    #[error("Invalid urlFilter in rule {index}: {source}")]
    InvalidUrlFilter {
        index: usize,
        #[source]
        source: regex::Error,
    },
}

/// Runtime settings resolved by the binary before the server starts.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// `None` means the base rule file.
    pub rules_path: Option<PathBuf>,
    /// Print the listening address once bound.
    pub verbose: bool,
    /// Print `Ready!` once bound, for harnesses waiting on stdout.
    pub ready_mode: bool,
    /// Extra diagnostics: loaded rules and the rule picked for each request.
    pub trace: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            rules_path: None,
            verbose: false,
            ready_mode: false,
            trace: false,
        }
    }
}

impl ServerConfig {
    /// Rules from the configured file, or the base rules when none is configured.
    pub fn load_rules(&self) -> Result<Vec<Rule>, ConfigError> {
        match &self.rules_path {
            Some(path) => load_rules(path),
            None => load_base_rules(),
        }
    }

    /// Human-readable origin of the rules, for diagnostics.
    pub fn rules_source(&self) -> String {
        match &self.rules_path {
            Some(path) => path.display().to_string(),
            None => base_rules_path()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| format!("built-in {}", BASE_CONFIG_FILE)),
        }
    }
}

/// `baseConfig.json` in the executable's directory, if there is one.
pub fn base_rules_path() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let path = exe.parent()?.join(BASE_CONFIG_FILE);
    path.is_file().then_some(path)
}

/// The base rules: the file next to the executable, else the built-in copy.
pub fn load_base_rules() -> Result<Vec<Rule>, ConfigError> {
    match base_rules_path() {
        Some(path) => load_rules(path),
        None => {
            let document = parse_document(Path::new(BASE_CONFIG_FILE), BASE_CONFIG)?;
            rules_from_value(&document)
        }
    }
}

/// Read a rule file and normalize every entry.
///
/// JSON by default; `.yaml`/`.yml` files are read as YAML. The document must be a
/// list; the individual entries are never rejected.
pub fn load_rules<P: AsRef<Path>>(path: P) -> Result<Vec<Rule>, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ConfigError::Missing(path.to_path_buf()));
    }

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let document = parse_document(path, &contents)?;
    rules_from_value(&document)
}

/// Normalize an already parsed rule document.
pub fn rules_from_value(document: &Value) -> Result<Vec<Rule>, ConfigError> {
    match document {
        Value::Array(entries) => Ok(entries.iter().map(Rule::normalize).collect()),
        other => Err(ConfigError::NotAnArray(json_kind(other))),
    }
}

fn parse_document(path: &Path, contents: &str) -> Result<Value, ConfigError> {
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    let parsed = if is_yaml {
        serde_yaml::from_str::<Value>(contents).map_err(|e| e.to_string())
    } else {
        serde_json::from_str::<Value>(contents).map_err(|e| e.to_string())
    };

    parsed.map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
