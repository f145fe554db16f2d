use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::launch::find_chrome;

/// Browser launch settings. Defaults honour `GRC_HEADLESS`,
/// `GRC_DISABLE_SANDBOX`, `GRC_CHROME_PROFILE` and `GRC_CHROME`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CdpConfig {
    /// Empty means "not found"; launching then fails with a hint.
    pub executable: PathBuf,
    pub user_data_dir: PathBuf,
    pub headless: bool,
    /// Upper bound for any single protocol call.
    pub default_deadline_ms: u64,
    /// Attach to an already running browser instead of launching one.
    pub websocket_url: Option<String>,
    /// Keep-alive period; 0 disables the probe.
    pub heartbeat_interval_ms: u64,
    pub no_sandbox: bool,
}

impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            executable: find_chrome().unwrap_or_default(),
            user_data_dir: env::var_os("GRC_CHROME_PROFILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| env::temp_dir().join("grc-copilot-profile")),
            headless: env_bool("GRC_HEADLESS").unwrap_or(true),
            default_deadline_ms: 30_000,
            websocket_url: None,
            heartbeat_interval_ms: 15_000,
            no_sandbox: env_bool("GRC_DISABLE_SANDBOX").unwrap_or(false),
        }
    }
}

fn env_bool(key: &str) -> Option<bool> {
    let raw = env::var(key).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn headless_flag_reads_common_spellings() {
        env::set_var("GRC_HEADLESS", "off");
        assert!(!CdpConfig::default().headless);
        env::set_var("GRC_HEADLESS", "banana");
        assert!(CdpConfig::default().headless);
        env::remove_var("GRC_HEADLESS");
        assert!(CdpConfig::default().headless);
    }

    #[test]
    fn partial_documents_keep_defaults() {
        let cfg: CdpConfig =
            serde_json::from_str(r#"{"websocket_url": "ws://127.0.0.1:9222/devtools/browser/x"}"#)
                .unwrap();
        assert!(cfg.websocket_url.is_some());
        assert_eq!(cfg.default_deadline_ms, 30_000);
    }
}
