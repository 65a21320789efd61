//! Configuration management for ragdesk
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend base URL (e.g. https://rag-backend.example.com)
    #[serde(default = "default_api_url", skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Chat configuration
    #[serde(default)]
    pub chat: ChatConfig,

    /// OAuth callback configuration
    #[serde(default)]
    pub oauth: OAuthConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Chat configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Wait before asking about a file opened from the explorer (milliseconds)
    #[serde(default = "default_file_prompt_delay")]
    pub file_prompt_delay_ms: u64,

    /// Question template for opened files; `{file}` is replaced with the file name
    #[serde(default = "default_file_prompt_template")]
    pub file_prompt_template: String,

    /// Title prefix for new conversations
    #[serde(default = "default_new_conversation_prefix")]
    pub new_conversation_prefix: String,
}

/// OAuth callback configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Address of the local completion listener
    #[serde(default = "default_oauth_callback_addr")]
    pub callback_addr: String,

    /// Route served by the completion listener
    #[serde(default = "default_oauth_callback_path")]
    pub callback_path: String,

    /// Linger after success before the listener shuts down (milliseconds)
    #[serde(default = "default_oauth_success_close")]
    pub success_close_ms: u64,

    /// Linger after failure before the listener shuts down (milliseconds)
    #[serde(default = "default_oauth_error_close")]
    pub error_close_ms: u64,

    /// Maximum wait for the provider consent (seconds)
    #[serde(default = "default_oauth_wait_timeout")]
    pub wait_timeout_secs: u64,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for ragdesk data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to the stored session (auth token and user name)
    pub session_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            request_timeout_secs: default_request_timeout(),
            chat: ChatConfig::default(),
            oauth: OAuthConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            file_prompt_delay_ms: default_file_prompt_delay(),
            file_prompt_template: default_file_prompt_template(),
            new_conversation_prefix: default_new_conversation_prefix(),
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            callback_addr: default_oauth_callback_addr(),
            callback_path: default_oauth_callback_path(),
            success_close_ms: default_oauth_success_close(),
            error_close_ms: default_oauth_error_close(),
            wait_timeout_secs: default_oauth_wait_timeout(),
        }
    }
}

impl ChatConfig {
    /// Question asked about a file opened from the explorer
    pub fn file_prompt(&self, file_name: &str) -> String {
        self.file_prompt_template.replace("{file}", file_name)
    }

    pub fn file_prompt_delay(&self) -> Duration {
        Duration::from_millis(self.file_prompt_delay_ms)
    }
}

/// Normalize a backend URL: trim, default to https, drop the trailing slash
pub fn normalize_api_url(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() {
        return String::new();
    }
    let with_scheme = if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    };
    with_scheme.trim_end_matches('/').to_string()
}

impl Config {
    /// Get the default base directory for ragdesk (~/.ragdesk)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ragdesk")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    fn paths_for(base: PathBuf, config_file: PathBuf) -> PathsConfig {
        PathsConfig {
            config_file,
            session_file: base.join("session.json"),
            base_dir: base,
        }
    }

    /// Initialize paths configuration
    fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = Self::paths_for(base.clone(), base.join("config.toml"));
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = Self::paths_for(base, config_path.to_path_buf());

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a base directory, falling back to defaults when no file exists
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// The backend base URL to talk to.
    ///
    /// Debug builds fall back to a local development backend; release builds
    /// refuse to start without an explicit URL.
    pub fn resolved_api_url(&self) -> Result<String> {
        match self.api_url.as_deref().map(normalize_api_url) {
            Some(url) if !url.is_empty() => Ok(url),
            _ if cfg!(debug_assertions) => Ok(DEV_API_URL.to_string()),
            _ => Err(Error::Config(
                "backend URL is not configured. Set RAGDESK_API_URL, pass --api-url, \
                 or add api_url = \"https://your-backend.example.com\" to config.toml"
                    .to_string(),
            )),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "request_timeout_secs must be positive".to_string(),
            ));
        }

        if let Some(url) = &self.api_url {
            let normalized = normalize_api_url(url);
            if !normalized.is_empty() {
                url::Url::parse(&normalized)
                    .map_err(|e| Error::Config(format!("Invalid api_url '{}': {}", url, e)))?;
            }
        }

        if !self.chat.file_prompt_template.contains("{file}") {
            return Err(Error::Config(
                "chat.file_prompt_template must contain the {file} placeholder".to_string(),
            ));
        }

        if !self.oauth.callback_path.starts_with('/') {
            return Err(Error::Config(
                "oauth.callback_path must start with '/'".to_string(),
            ));
        }

        self.oauth
            .callback_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|e| {
                Error::Config(format!(
                    "Invalid oauth.callback_addr '{}': {}",
                    self.oauth.callback_addr, e
                ))
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.chat.file_prompt_delay_ms, 800);
        assert_eq!(config.oauth.success_close_ms, 1500);
        assert_eq!(config.oauth.error_close_ms, 3000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.api_url = Some("https://rag.example.com".to_string());
        config.chat.file_prompt_delay_ms = 0;

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(loaded.api_url.as_deref(), Some("https://rag.example.com"));
        assert_eq!(loaded.chat.file_prompt_delay_ms, 0);
        assert_eq!(loaded.paths.session_file, tmp.path().join("session.json"));
    }

    #[test]
    fn test_normalize_api_url() {
        assert_eq!(
            normalize_api_url(" rag.example.com/ "),
            "https://rag.example.com"
        );
        assert_eq!(
            normalize_api_url("http://localhost:3000/"),
            "http://localhost:3000"
        );
        assert_eq!(normalize_api_url("   "), "");
    }

    #[test]
    fn test_resolved_api_url_prefers_configured_value() {
        let mut config = Config::default();
        config.api_url = Some("backend.example.com/".to_string());
        assert_eq!(
            config.resolved_api_url().unwrap(),
            "https://backend.example.com"
        );
    }

    #[test]
    fn test_resolved_api_url_without_value_in_debug() {
        let mut config = Config::default();
        config.api_url = None;
        if cfg!(debug_assertions) {
            assert_eq!(config.resolved_api_url().unwrap(), DEV_API_URL);
        } else {
            assert!(config.resolved_api_url().is_err());
        }
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.chat.file_prompt_template = "Summarize it".to_string();
        assert!(config.validate().is_err());
        config.chat.file_prompt_template = default_file_prompt_template();

        config.oauth.callback_addr = "not-an-address".to_string();
        assert!(config.validate().is_err());
        config.oauth.callback_addr = "127.0.0.1:5173".to_string();

        config.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_prompt_substitutes_name() {
        let chat = ChatConfig::default();
        let prompt = chat.file_prompt("report.pdf");
        assert!(prompt.contains("\"report.pdf\""));
        assert!(!prompt.contains("{file}"));
    }
}
