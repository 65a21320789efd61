//! Init command implementation

use crate::config::{normalize_api_url, Config};
use crate::error::{Error, Result};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    /// Backend URL to write into the new file
    pub api_url: Option<String>,
    pub force: bool,
}

/// Write a default configuration file
pub async fn cmd_init(options: InitOptions) -> Result<Config> {
    let InitOptions {
        base_dir,
        config_path,
        api_url,
        force,
    } = options;

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite it.",
            config_path.display()
        )));
    }

    let mut config = Config::default();
    if let Some(url) = api_url {
        config.api_url = Some(normalize_api_url(&url)).filter(|u| !u.is_empty());
    }
    config.paths.session_file = base_dir.join("session.json");
    config.paths.base_dir = base_dir;
    config.paths.config_file = config_path;

    config.validate()?;
    config.save()?;
    info!("Created config at {:?}", config.paths.config_file);
    Ok(config)
}

pub fn print_init(config: &Config) {
    println!("\n✅ ragdesk initialized\n");
    println!("Configuration: {}", config.paths.config_file.display());
    println!("Session file: {}", config.paths.session_file.display());
    match &config.api_url {
        Some(url) => println!("Backend: {}", url),
        None => println!("Backend: not set"),
    }
    println!("\nNext steps:");
    if config.api_url.is_none() {
        println!("  1. Set api_url in the config file (or export RAGDESK_API_URL)");
    } else {
        println!("  1. Edit the config file to customize settings");
    }
    println!("  2. Run 'ragdesk login' to sign in");
    println!("  3. Run 'ragdesk chat repl' to start chatting");
}
