//! Optional config file loading. Search order: ./blogmirror.toml, then
//! $XDG_CONFIG_HOME/blogmirror/config.toml (or ~/.config/blogmirror/config.toml).

use serde::Deserialize;
use std::path::PathBuf;

/// Config file contents. All fields optional; only present keys override
/// defaults, and CLI flags override config.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Base directory the blogs/, blogs_test/, blogs_<post>/ trees go under.
    pub output_dir: Option<PathBuf>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Delay in seconds between requests.
    pub request_delay_secs: Option<u64>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Number of HTTP attempts for transient failures (default 3).
    pub retry_count: Option<u32>,
    /// Delay in seconds before each retry (e.g. [1, 2, 4]). Length should be
    /// retry_count - 1. If not set, default [1, 2, 4] is used.
    pub retry_backoff_secs: Option<Vec<u64>>,
    /// Path to the OAuth token file (default ./token.json).
    pub token_file: Option<PathBuf>,
    /// Post limit for test mode (default 10).
    pub test_limit: Option<usize>,
    /// Image re-download policy on retries: refetch (default) or skip-existing.
    pub images: Option<String>,
}

/// Search order: (1) ./blogmirror.toml, (2) $XDG_CONFIG_HOME/blogmirror/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("blogmirror.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("blogmirror").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            let s = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
            let config: Config = toml::from_str(&s)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
            return Ok(Some(config));
        }
    }
    Ok(None)
}
