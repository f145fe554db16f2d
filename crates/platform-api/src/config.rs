use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Query API endpoint and credentials.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.onspring.com".to_string(),
            api_key: String::new(),
            timeout_secs: 60,
        }
    }
}

impl PlatformConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Where the compliance reference data lives on the platform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    pub control_app_id: i64,
    pub control_id_field: i64,
    pub control_name_field: i64,
    pub control_citation_ids_field: i64,
    pub all_citations_report: i64,
    pub max_control_report: i64,
    pub min_control_report: i64,
    pub cache_path: PathBuf,
    /// `None` retries forever.
    pub max_control_attempts: Option<u32>,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            control_app_id: 14,
            control_id_field: 585,
            control_name_field: 183,
            control_citation_ids_field: 586,
            all_citations_report: 27,
            max_control_report: 28,
            min_control_report: 29,
            cache_path: PathBuf::from("citations.json"),
            max_control_attempts: Some(50),
        }
    }
}
