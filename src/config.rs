use serde::Deserialize;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub bot_token: BotToken,
    pub session_max_age: time::Duration,
    pub sweep_interval: std::time::Duration,
    pub auth_max_age: Option<time::Duration>,
    pub max_groups: Option<usize>,
    pub cors: bool,
}

/// Bot token wrapper that never prints its contents.
#[derive(Clone, PartialEq, Eq)]
pub struct BotToken(String);

impl BotToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BotToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BotToken(***)")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Values read from the optional TOML config file. Command line flags and
/// environment variables take precedence.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub bind: Option<String>,
    pub bot_token: Option<String>,
    pub session_max_age: Option<String>,
    pub sweep_interval: Option<String>,
    pub auth_max_age: Option<String>,
    pub max_groups: Option<usize>,
    pub cors: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            bot_token: BotToken::new("123456:TEST-token"),
            session_max_age: crate::reaper::DEFAULT_SESSION_MAX_AGE,
            sweep_interval: crate::reaper::DEFAULT_SWEEP_INTERVAL,
            auth_max_age: None,
            max_groups: None,
            cors: false,
        }
    }
}
