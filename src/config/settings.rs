//! TOML-based configuration for pbimeta.
//!
//! Supports a config file (pbimeta.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [server]
//! command = "python pbixray-mcp-server/src/pbixray_server.py"
//! args = ["--max-rows", "100"]
//! request_timeout_secs = 30
//! shutdown_grace_secs = 5
//!
//! [server.env]
//! PBIXRAY_LOG = "${HOME}/pbixray.log"
//!
//! [tools]
//! tables = "get_tables"
//! data_sources = "get_power_query"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::mcp::{ClientOptions, ServerCommand};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "PBIMETA_CONFIG";

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// How to launch the extractor tool server.
    pub server: ServerSettings,

    /// Remote tool names.
    pub tools: ToolNames,
}

/// Tool server launch settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Program and leading arguments, split on whitespace
    /// (supports ${ENV_VAR} expansion).
    pub command: String,

    /// Extra arguments appended after `command`.
    pub args: Vec<String>,

    /// Environment for the server process (values support expansion).
    pub env: BTreeMap<String, String>,

    /// Working directory for the server process.
    pub working_dir: Option<String>,

    /// Default per-call deadline in seconds.
    pub request_timeout_secs: u64,

    /// Seconds to wait for a graceful exit before killing the server.
    pub shutdown_grace_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            command: "python pbixray-mcp-server/src/pbixray_server.py".to_string(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
            request_timeout_secs: 30,
            shutdown_grace_secs: 5,
        }
    }
}

impl ServerSettings {
    /// Build the launch command with environment variables expanded.
    pub fn server_command(&self) -> Result<ServerCommand, SettingsError> {
        let command = expand_env_vars(&self.command)?;
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| SettingsError::InvalidConfig("server.command is empty".to_string()))?;

        let mut server = ServerCommand::new(program).args(parts);
        for arg in &self.args {
            server = server.arg(expand_env_vars(arg)?);
        }
        for (key, value) in &self.env {
            server = server.env(key.clone(), expand_env_vars(value)?);
        }
        if let Some(dir) = &self.working_dir {
            server = server.working_dir(expand_env_vars(dir)?);
        }
        Ok(server)
    }

    /// Client tunables derived from these settings.
    pub fn client_options(&self) -> Result<ClientOptions, SettingsError> {
        if self.request_timeout_secs == 0 {
            return Err(SettingsError::InvalidConfig(
                "server.request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(ClientOptions {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            ..ClientOptions::default()
        })
    }
}

/// Names of the extractor's remote tools.
///
/// These are part of the external contract; override them here if the
/// extractor renames a tool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolNames {
    pub load: String,
    pub tables: String,
    pub schema: String,
    pub measures: String,
    pub relationships: String,
    pub data_sources: String,
    pub summary: String,
}

impl Default for ToolNames {
    fn default() -> Self {
        Self {
            load: "load_pbix_file".to_string(),
            tables: "get_tables".to_string(),
            schema: "get_schema".to_string(),
            measures: "get_dax_measures".to_string(),
            relationships: "get_relationships".to_string(),
            data_sources: "get_power_query".to_string(),
            summary: "get_model_summary".to_string(),
        }
    }
}

impl ToolNames {
    /// All configured names, in call order.
    pub fn all(&self) -> [&str; 7] {
        [
            &self.load,
            &self.tables,
            &self.schema,
            &self.measures,
            &self.relationships,
            &self.data_sources,
            &self.summary,
        ]
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `PBIMETA_CONFIG`
    /// 2. `./pbimeta.toml`
    /// 3. `~/.config/pbimeta/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var(CONFIG_ENV_VAR) {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("pbimeta.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("pbimeta").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let var_name = if chars.peek() == Some(&'{') {
            chars.next();
            let mut name = String::new();
            let mut closed = false;
            for ch in chars.by_ref() {
                if ch == '}' {
                    closed = true;
                    break;
                }
                name.push(ch);
            }
            if !closed {
                return Err(SettingsError::InvalidConfig(format!(
                    "unterminated '${{{name}' in '{s}'"
                )));
            }
            name
        } else {
            let mut name = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_alphanumeric() || ch == '_' {
                    name.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            if name.is_empty() {
                // Lone `$`
                result.push('$');
                continue;
            }
            name
        };

        let value = env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name))?;
        result.push_str(&value);
    }

    Ok(result)
}
