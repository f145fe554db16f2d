//! Locating and starting the Chromium binary.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chromiumoxide::async_process::Child;
use chromiumoxide::browser::BrowserConfig;
use futures::io::{AsyncBufReadExt, BufReader};
use futures::stream::StreamExt;
use serde_json::json;
use which::which;

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};

/// Explicit binary override.
pub const CHROME_ENV: &str = "GRC_CHROME";
/// Non-empty disables the well-known install locations (PATH lookup still runs).
pub const SKIP_OS_PATHS_ENV: &str = "GRC_SKIP_OS_PATHS";

const LAUNCH_TIMEOUT: Duration = Duration::from_secs(20);
const STDERR_PREVIEW_LINES: usize = 8;

/// Flags for an unattended, short-lived automation browser.
const BASE_ARGS: &[&str] = &[
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-breakpad",
    "--disable-component-update",
    "--disable-default-apps",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--disable-popup-blocking",
    "--disable-sync",
    "--no-first-run",
    "--no-default-browser-check",
    "--password-store=basic",
    "--use-mock-keychain",
    "--remote-allow-origins=*",
];
const HEADLESS_ARGS: &[&str] = &["--headless=new", "--hide-scrollbars", "--mute-audio"];

/// `GRC_CHROME`, then `PATH`, then the usual install locations.
pub fn find_chrome() -> Option<PathBuf> {
    let explicit = env::var(CHROME_ENV).unwrap_or_default();
    let explicit = explicit.trim();
    if !explicit.is_empty() && Path::new(explicit).exists() {
        return Some(PathBuf::from(explicit));
    }

    if let Some(found) = binary_names().iter().find_map(|name| which(name).ok()) {
        return Some(found);
    }

    let skip_installs = env::var(SKIP_OS_PATHS_ENV)
        .map(|value| !value.trim().is_empty())
        .unwrap_or(false);
    if skip_installs {
        return None;
    }
    install_locations().into_iter().find(|path| path.exists())
}

#[cfg(target_os = "windows")]
fn binary_names() -> &'static [&'static str] {
    &["chrome.exe", "chromium.exe", "msedge.exe"]
}

#[cfg(not(target_os = "windows"))]
fn binary_names() -> &'static [&'static str] {
    &["google-chrome-stable", "google-chrome", "chromium", "chromium-browser"]
}

#[cfg(target_os = "windows")]
fn install_locations() -> Vec<PathBuf> {
    ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"]
        .iter()
        .filter_map(|key| env::var(key).ok())
        .flat_map(|root| {
            let root = PathBuf::from(root.trim());
            [
                root.join("Google/Chrome/Application/chrome.exe"),
                root.join("Microsoft/Edge/Application/msedge.exe"),
            ]
        })
        .collect()
}

#[cfg(target_os = "macos")]
fn install_locations() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
        PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
    ]
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn install_locations() -> Vec<PathBuf> {
    ["google-chrome-stable", "google-chrome", "chromium-browser", "chromium"]
        .iter()
        .map(|name| Path::new("/usr/bin").join(name))
        .collect()
}

fn launch_error(hint: impl Into<String>) -> AdapterError {
    AdapterError::new(AdapterErrorKind::Launch).with_hint(hint)
}

/// Chromium command line for `cfg`. The profile directory is created here.
pub fn browser_config(cfg: &CdpConfig) -> Result<BrowserConfig, AdapterError> {
    if !cfg.executable.as_os_str().is_empty() && !cfg.executable.exists() {
        return Err(launch_error(format!(
            "chrome executable not found at {}",
            cfg.executable.display()
        ))
        .with_data(json!({
            "expected": cfg.executable,
            "hint": format!("Set {CHROME_ENV} to the full path of chrome/chromium."),
        })));
    }

    let profile = if cfg.user_data_dir.is_absolute() {
        cfg.user_data_dir.clone()
    } else {
        env::current_dir()
            .map_err(|err| launch_error(format!("cannot resolve working directory: {err}")))?
            .join(&cfg.user_data_dir)
    };
    std::fs::create_dir_all(&profile).map_err(|err| {
        launch_error(format!("cannot create profile {}: {err}", profile.display()))
    })?;

    let mut args: Vec<&str> = BASE_ARGS.to_vec();
    if cfg.headless {
        args.extend_from_slice(HEADLESS_ARGS);
    }

    let mut builder = BrowserConfig::builder()
        .request_timeout(Duration::from_millis(cfg.default_deadline_ms))
        .launch_timeout(LAUNCH_TIMEOUT)
        .user_data_dir(profile)
        .args(args);
    if !cfg.headless {
        builder = builder.with_head();
    }
    if cfg.no_sandbox {
        builder = builder.no_sandbox();
    }
    if !cfg.executable.as_os_str().is_empty() {
        builder = builder.chrome_executable(cfg.executable.clone());
    }
    builder
        .build()
        .map_err(|err| launch_error(format!("invalid browser config: {err}")))
}

/// Starts Chromium and waits for it to announce its DevTools endpoint.
pub async fn spawn_browser(cfg: &CdpConfig) -> Result<(Child, String), AdapterError> {
    let config = browser_config(cfg)?;
    let mut child = config
        .launch()
        .map_err(|err| launch_error(format!("failed to launch chromium: {err}")))?;
    match tokio::time::timeout(LAUNCH_TIMEOUT, devtools_endpoint(&mut child)).await {
        Ok(Ok(url)) => Ok((child, url)),
        Ok(Err(err)) => {
            let _ = child.kill().await;
            Err(err)
        }
        Err(_) => {
            let _ = child.kill().await;
            Err(launch_error("timed out waiting for the devtools endpoint"))
        }
    }
}

/// Picks the browser websocket endpoint out of a
/// `DevTools listening on ws://...` stderr line.
pub fn parse_devtools_line(line: &str) -> Option<&str> {
    let (_, ws) = line.rsplit_once("listening on ")?;
    let ws = ws.trim();
    (ws.starts_with("ws") && ws.contains("devtools/browser")).then_some(ws)
}

async fn devtools_endpoint(child: &mut Child) -> Result<String, AdapterError> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| launch_error("chromium started without a stderr pipe"))?;
    let mut lines = BufReader::new(stderr).lines();
    let mut preview = Vec::new();
    while let Some(line) = lines.next().await {
        let line = line.map_err(|err| launch_error(err.to_string()))?;
        if let Some(ws) = parse_devtools_line(&line) {
            return Ok(ws.to_string());
        }
        if preview.len() < STDERR_PREVIEW_LINES {
            preview.push(line);
        }
    }
    Err(launch_error(format!(
        "chromium exited before exposing its devtools endpoint: {}",
        preview.join(" | ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    fn restore(key: &str, value: Option<String>) {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }

    #[test]
    fn picks_browser_endpoint_only() {
        assert_eq!(
            parse_devtools_line("DevTools listening on ws://127.0.0.1:9222/devtools/browser/abc\n"),
            Some("ws://127.0.0.1:9222/devtools/browser/abc")
        );
        assert_eq!(parse_devtools_line("[WARNING] listening on nothing"), None);
        assert_eq!(parse_devtools_line("Fontconfig error"), None);
    }

    #[test]
    #[serial]
    fn explicit_binary_wins() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("my-chrome");
        fs::write(&exe, b"").unwrap();
        let saved = env::var(CHROME_ENV).ok();
        env::set_var(CHROME_ENV, &exe);
        let found = find_chrome();
        restore(CHROME_ENV, saved);
        assert_eq!(found, Some(exe));
    }

    #[test]
    #[serial]
    fn falls_back_to_path_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join(binary_names()[0]);
        fs::write(&exe, b"").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();
        }
        let saved_path = env::var("PATH").ok();
        let saved_chrome = env::var(CHROME_ENV).ok();
        env::set_var(CHROME_ENV, "");
        env::set_var(SKIP_OS_PATHS_ENV, "1");
        env::set_var("PATH", dir.path());
        let found = find_chrome();
        restore("PATH", saved_path);
        restore(CHROME_ENV, saved_chrome);
        env::remove_var(SKIP_OS_PATHS_ENV);
        assert_eq!(found, Some(exe));
    }

    #[test]
    fn missing_executable_is_a_launch_error() {
        let cfg = CdpConfig {
            executable: PathBuf::from("/nonexistent/chrome"),
            ..CdpConfig::default()
        };
        let err = browser_config(&cfg).unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Launch);
        assert!(err.data.is_some());
    }
}
