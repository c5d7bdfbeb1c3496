//! Locating, downloading and launching Chrome/Chromium for extraction runs.

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

use crate::BrowserConfig;
use crate::utils::constants::CHROME_USER_AGENT;

const CDP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Flags that keep the map UI from treating the session as automated and
/// silence first-run chrome
const STEALTH_ARGS: [&str; 11] = [
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--disable-notifications",
    "--disable-dev-shm-usage",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-extensions",
    "--disable-features=TranslateUI",
    "--password-store=basic",
    "--use-mock-keychain",
    "--mute-audio",
];

/// Profile directory that deletes itself unless handed over with `keep()`
struct ProfileDir {
    path: PathBuf,
    keep: bool,
}

impl ProfileDir {
    fn create(path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create profile directory {}", path.display()))?;
        Ok(Self { path, keep: false })
    }

    fn keep(mut self) -> PathBuf {
        self.keep = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for ProfileDir {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => info!("Removed profile directory after failed launch: {}", self.path.display()),
            Err(e) => warn!("Failed to remove profile directory {}: {}", self.path.display(), e),
        }
    }
}

/// Well-known install locations for the current platform
fn candidate_paths() -> Vec<PathBuf> {
    let raw: &[&str] = if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"%LOCALAPPDATA%\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Chromium\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "~/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/data/data/com.termux/files/usr/bin/chromium",
        ]
    };

    raw.iter()
        .filter_map(|entry| {
            if let Some(rest) = entry.strip_prefix("~/") {
                dirs::home_dir().map(|home| home.join(rest))
            } else if entry.contains('%') {
                Some(PathBuf::from(expand_windows_env_vars(entry)))
            } else {
                Some(PathBuf::from(entry))
            }
        })
        .collect()
}

/// Ask `which` for a browser on PATH (not available on Windows)
fn which_browser() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        return None;
    }

    ["chromium", "chromium-browser", "google-chrome", "chrome"]
        .iter()
        .find_map(|cmd| {
            let output = Command::new("which").arg(cmd).output().ok()?;
            let found = String::from_utf8_lossy(&output.stdout).trim().to_string();
            (output.status.success() && !found.is_empty()).then(|| PathBuf::from(found))
        })
}

/// Find a local Chrome/Chromium: `CHROMIUM_PATH`, then install locations,
/// then `which`.
pub async fn find_browser_executable() -> Result<PathBuf> {
    if let Ok(configured) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(configured);
        if path.exists() {
            info!("Using browser from CHROMIUM_PATH: {}", path.display());
            return Ok(path);
        }
        warn!("CHROMIUM_PATH points to a missing file: {}", path.display());
    }

    if let Some(path) = candidate_paths().into_iter().find(|p| p.exists()) {
        info!("Found browser at: {}", path.display());
        return Ok(path);
    }

    if let Some(path) = which_browser() {
        info!("Found browser on PATH: {}", path.display());
        return Ok(path);
    }

    warn!("No local Chrome/Chromium found, a managed copy will be downloaded");
    Err(anyhow::anyhow!("Chrome/Chromium executable not found"))
}

/// Expand `%VAR%` tokens; unknown variables are left as written.
fn expand_windows_env_vars(path: &str) -> String {
    let mut result = String::with_capacity(path.len());
    let mut chars = path.chars();

    while let Some(ch) = chars.next() {
        if ch != '%' {
            result.push(ch);
            continue;
        }

        let var_name: String = chars.by_ref().take_while(|&c| c != '%').collect();
        match std::env::var(&var_name) {
            _ if var_name.is_empty() => result.push('%'),
            Ok(value) => result.push_str(&value),
            Err(_) => result.push_str(&format!("%{var_name}%")),
        }
    }

    result
}

/// Download Chromium into the user cache and return its executable.
pub async fn download_managed_browser() -> Result<PathBuf> {
    let cache_root = dirs::cache_dir().unwrap_or_else(|| {
        let fallback = std::env::temp_dir().join(".cache");
        warn!("No system cache directory, using {}", fallback.display());
        fallback
    });
    let install_dir = cache_root.join("maps_harvest").join("chromium");
    std::fs::create_dir_all(&install_dir).context("Failed to create browser cache directory")?;

    info!("Downloading Chromium into {}", install_dir.display());
    let options = BrowserFetcherOptions::builder()
        .with_path(&install_dir)
        .build()
        .context("Failed to build fetcher options")?;
    let installed = BrowserFetcher::new(options)
        .fetch()
        .await
        .context("Failed to download Chromium")?;

    info!("Chromium ready at {}", installed.folder_path.display());
    Ok(installed.executable_path)
}

/// Command line flags for a launch with `config`
pub fn launch_args(config: &BrowserConfig) -> Vec<String> {
    let mut args = vec![format!("--user-agent={}", CHROME_USER_AGENT)];
    args.extend(STEALTH_ARGS.iter().map(|arg| arg.to_string()));

    if !config.headless {
        args.push("--start-maximized".into());
    }
    if config.disable_security {
        args.push("--disable-web-security".into());
        args.push("--ignore-certificate-errors".into());
    }
    if config.disable_security || running_in_container() {
        args.push("--no-sandbox".into());
        args.push("--disable-setuid-sandbox".into());
    }

    args
}

/// Chrome emits CDP events chromiumoxide cannot decode; these are noise.
/// https://github.com/mattsse/chromiumoxide/issues/167
fn is_benign_handler_error(message: &str) -> bool {
    message.contains("data did not match any variant of untagged enum Message")
        || message.contains("Failed to deserialize WS response")
}

/// Launch Chrome with `config`, using `profile_dir` (or a per-process temp
/// directory) as its user data directory.
///
/// The directory is removed again if the launch fails.
pub async fn launch_browser(
    config: &BrowserConfig,
    profile_dir: Option<PathBuf>,
) -> Result<(Browser, JoinHandle<()>)> {
    let executable = match find_browser_executable().await {
        Ok(path) => path,
        Err(_) => download_managed_browser().await?,
    };

    let profile = ProfileDir::create(profile_dir.unwrap_or_else(|| {
        std::env::temp_dir().join(format!("maps_harvest_chrome_{}", std::process::id()))
    }))?;

    let mut builder = BrowserConfigBuilder::default()
        .request_timeout(CDP_REQUEST_TIMEOUT)
        .window_size(config.window.width, config.window.height)
        .user_data_dir(profile.path.as_path())
        .chrome_executable(executable)
        .args(launch_args(config));
    builder = if config.headless {
        builder.headless_mode(HeadlessMode::default())
    } else {
        builder.with_head()
    };

    if config.disable_security {
        warn!("Browser security features disabled (disable_security=true)");
    }

    let launch_config = builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))?;
    debug!("Browser launch config: {:?}", launch_config);

    let (browser, mut handler) = Browser::launch(launch_config)
        .await
        .context("Failed to launch browser")?;

    let handler_task = task::spawn(async move {
        while let Some(event) = handler.next().await {
            let Err(e) = event else { continue };
            let message = e.to_string();
            if is_benign_handler_error(&message) {
                trace!("Ignored undecodable CDP event: {}", message);
            } else {
                error!("Browser handler error: {:?}", e);
            }
        }
        info!("Browser handler task completed");
    });

    profile.keep();
    Ok((browser, handler_task))
}

/// The sandbox needs setuid helpers that containers and Termux lack
fn running_in_container() -> bool {
    Path::new("/.dockerenv").exists()
        || ["container", "KUBERNETES_SERVICE_HOST", "TERMUX_VERSION"]
            .iter()
            .any(|var| std::env::var(var).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_windows_variables_are_preserved() {
        let expanded = expand_windows_env_vars(r"%MAPS_HARVEST_SURELY_UNSET%\chrome.exe");
        assert_eq!(expanded, r"%MAPS_HARVEST_SURELY_UNSET%\chrome.exe");
    }

    #[test]
    fn double_percent_collapses_to_one() {
        assert_eq!(expand_windows_env_vars("100%%"), "100%");
    }

    #[test]
    fn profile_dir_is_removed_unless_kept() {
        let root = tempfile::tempdir().unwrap();

        let dropped = root.path().join("dropped");
        drop(ProfileDir::create(dropped.clone()).unwrap());
        assert!(!dropped.exists());

        let kept = root.path().join("kept");
        let path = ProfileDir::create(kept.clone()).unwrap().keep();
        assert_eq!(path, kept);
        assert!(kept.exists());
    }

    #[test]
    fn windowed_launch_is_maximised_and_secure() {
        let args = launch_args(&BrowserConfig::default());
        assert!(args.iter().any(|a| a == "--start-maximized"));
        assert!(args.iter().any(|a| a.starts_with("--user-agent=")));
        assert!(!args.iter().any(|a| a == "--disable-web-security"));
    }

    #[test]
    fn disabling_security_also_drops_the_sandbox() {
        let config = BrowserConfig {
            headless: true,
            disable_security: true,
            ..Default::default()
        };
        let args = launch_args(&config);
        assert!(!args.iter().any(|a| a == "--start-maximized"));
        assert!(args.iter().any(|a| a == "--disable-web-security"));
        assert!(args.iter().any(|a| a == "--no-sandbox"));
    }

    #[test]
    fn cdp_decode_noise_is_recognised() {
        assert!(is_benign_handler_error(
            "data did not match any variant of untagged enum Message"
        ));
        assert!(!is_benign_handler_error("websocket closed"));
    }
}
