//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Configuration for wikichat
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend base URL
    pub server: Option<String>,
    /// Stream replies (false uses the single-response query endpoint)
    pub stream: Option<bool>,
    /// Input handling while a reply is in progress (reject, queue, cancel)
    pub busy_policy: Option<String>,
    /// Seconds without stream activity before a reply is abandoned
    pub idle_timeout_secs: Option<u64>,
    /// First agent message of every conversation
    pub greeting: Option<String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wikichat")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("WIKICHAT_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file: {}", e);
                Self::default()
            }),
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            server: Some(wikichat_api::client::DEFAULT_BASE_URL.to_string()),
            stream: Some(true),
            busy_policy: Some("reject".to_string()),
            idle_timeout_secs: Some(120),
            greeting: None,
        };

        default_config.save()?;
        Ok(path)
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# wikichat configuration file
# Place at ~/.config/wikichat/config.toml (Linux/Mac) or %APPDATA%\wikichat\config.toml (Windows)

# Backend base URL
server = "http://127.0.0.1:8000"

# Stream replies as they are generated (false asks the query endpoint instead)
stream = true

# What to do with input while a reply is in progress (reject, queue, cancel)
busy_policy = "reject"

# Give up on a reply after this many seconds without stream activity
idle_timeout_secs = 120

# First agent message of every conversation (optional)
# greeting = "Hi there, how can I help?"
"#
}
