//! Map listing extraction and directory archiving tools
//!
//! Two independent pipelines share this crate:
//! - `maps-extract`: drives Chrome via chromiumoxide over a map search results
//!   feed, scrapes each listing's detail panel and writes an xlsx workbook.
//! - `dir-zip`: bundles the working directory into a zip archive, skipping
//!   prior archives and temp/hidden files.

pub mod archive;
mod browser;
pub mod browser_setup;
pub mod export;
pub mod extraction;
mod manager;
pub mod maps;
mod utils;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "maps_harvest.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Page opened before the operator runs a search
    #[serde(default = "default_maps_url")]
    pub maps_url: String,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub pagination: PaginationConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Browser security and launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run browser in headless mode. The operator has to type the search,
    /// so this is off unless the page is driven some other way.
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Disable web security features (Same-Origin Policy, etc.)
    /// WARNING: Only enable for trusted content
    #[serde(default = "default_disable_security")]
    pub disable_security: bool,

    /// Window dimensions
    #[serde(default)]
    pub window: WindowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_width")]
    pub width: u32,

    #[serde(default = "default_window_height")]
    pub height: u32,
}

/// Thresholds and settle delays for the results feed walk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Consecutive listing failures before a scroll is attempted
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Consecutive scrolls without new listings before the walk ends
    #[serde(default = "default_no_growth_threshold")]
    pub no_growth_threshold: u32,

    #[serde(default = "default_detail_settle_ms")]
    pub detail_settle_ms: u64,

    #[serde(default = "default_scroll_settle_ms")]
    pub scroll_settle_ms: u64,

    #[serde(default = "default_idle_pause_ms")]
    pub idle_pause_ms: u64,

    /// How long to wait for the results feed after the operator confirms
    #[serde(default = "default_feed_timeout_ms")]
    pub feed_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

fn default_maps_url() -> String {
    "https://www.google.com/maps".to_string()
}

fn default_headless() -> bool {
    false
}

fn default_disable_security() -> bool {
    false  // SECURE BY DEFAULT
}

fn default_window_width() -> u32 {
    1920
}

fn default_window_height() -> u32 {
    1080
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_no_growth_threshold() -> u32 {
    4
}

fn default_detail_settle_ms() -> u64 {
    2000
}

fn default_scroll_settle_ms() -> u64 {
    3000
}

fn default_idle_pause_ms() -> u64 {
    1000
}

fn default_feed_timeout_ms() -> u64 {
    10_000
}

fn default_output_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_file_prefix() -> String {
    "google_maps".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            maps_url: default_maps_url(),
            browser: BrowserConfig::default(),
            pagination: PaginationConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            disable_security: default_disable_security(),
            window: WindowConfig::default(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_window_width(),
            height: default_window_height(),
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            no_growth_threshold: default_no_growth_threshold(),
            detail_settle_ms: default_detail_settle_ms(),
            scroll_settle_ms: default_scroll_settle_ms(),
            idle_pause_ms: default_idle_pause_ms(),
            feed_timeout_ms: default_feed_timeout_ms(),
        }
    }
}

impl PaginationConfig {
    pub fn detail_settle(&self) -> Duration {
        Duration::from_millis(self.detail_settle_ms)
    }

    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }

    pub fn idle_pause(&self) -> Duration {
        Duration::from_millis(self.idle_pause_ms)
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_millis(self.feed_timeout_ms)
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            file_prefix: default_file_prefix(),
        }
    }
}

/// Load config from a YAML file.
///
/// With no explicit path, `maps_harvest.yaml` in the working directory is used
/// when it exists; otherwise defaults apply. An explicit path must exist.
pub fn load_yaml_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !fallback.exists() {
                return Ok(Config::default());
            }
            fallback
        }
    };

    let contents = fs::read_to_string(&config_path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", config_path.display(), e))?;
    let config: Config = serde_yaml::from_str(&contents)?;

    url::Url::parse(&config.maps_url)
        .map_err(|e| anyhow::anyhow!("Invalid maps_url '{}': {}", config.maps_url, e))?;

    Ok(config)
}

pub use browser::{
    BrowserError, BrowserResult, BrowserWrapper, download_managed_browser,
    find_browser_executable, launch_browser,
};
pub use manager::BrowserManager;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: Config = serde_yaml::from_str(
            "pagination:\n  failure_threshold: 5\noutput:\n  file_prefix: cafes\n",
        )
        .unwrap();

        assert_eq!(config.pagination.failure_threshold, 5);
        assert_eq!(config.pagination.no_growth_threshold, 4);
        assert_eq!(config.output.file_prefix, "cafes");
        assert_eq!(config.maps_url, "https://www.google.com/maps");
        assert!(!config.browser.headless);
    }

    #[test]
    fn explicit_config_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yaml");
        fs::write(&path, "maps_url: https://maps.example.com/\nbrowser:\n  headless: true\n").unwrap();

        let config = load_yaml_config(Some(&path)).unwrap();
        assert_eq!(config.maps_url, "https://maps.example.com/");
        assert!(config.browser.headless);
    }

    #[test]
    fn invalid_maps_url_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(&path, "maps_url: not a url\n").unwrap();

        assert!(load_yaml_config(Some(&path)).is_err());
    }
}
