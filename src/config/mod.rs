//! Configuration module for pbimeta.
//!
//! Handles tool server launch settings, remote tool names and environment
//! variable expansion.

mod settings;

pub use settings::{
    expand_env_vars, ServerSettings, Settings, SettingsError, ToolNames, CONFIG_ENV_VAR,
};
