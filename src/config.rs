//! Application configuration.
//!
//! One YAML file layered with `GRC__SECTION__KEY` environment variables,
//! deserialised into [`AppConfig`] and handed to each component explicitly.

use std::path::{Path, PathBuf};

use agent_core::LlmConfig;
use cdp_adapter::CdpConfig;
use config::{Config, Environment, File, FileFormat};
use platform_api::{PlatformConfig, ReferenceConfig};
use provisioning::ProvisioningConfig;
use serde::{Deserialize, Serialize};

use crate::errors::CopilotError;

pub const ENV_PREFIX: &str = "GRC";
pub const ENV_SEPARATOR: &str = "__";
const APP_DIR: &str = "grc-copilot";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub platform: PlatformConfig,
    pub browser: CdpConfig,
    pub provisioning: ProvisioningConfig,
    pub reference: ReferenceConfig,
    /// Root for generated artefacts such as failure screenshots.
    pub output_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            platform: PlatformConfig::default(),
            browser: CdpConfig::default(),
            provisioning: ProvisioningConfig::default(),
            reference: ReferenceConfig::default(),
            output_dir: PathBuf::from("output"),
        }
    }
}

impl AppConfig {
    /// Reads `path` when it exists, then applies environment overrides.
    pub fn load(path: &Path) -> Result<Self, CopilotError> {
        let built = Config::builder()
            .add_source(File::from(path).format(FileFormat::Yaml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .map_err(|err| CopilotError::Config(format!("{}: {err}", path.display())))?;
        let mut config: AppConfig = built
            .try_deserialize()
            .map_err(|err| CopilotError::Config(format!("{}: {err}", path.display())))?;
        config.fill_derived();
        Ok(config)
    }

    /// Parses a YAML document without environment layering.
    pub fn from_yaml(raw: &str) -> Result<Self, CopilotError> {
        serde_yaml::from_str(raw).map_err(|err| CopilotError::Config(err.to_string()))
    }

    fn fill_derived(&mut self) {
        if self.provisioning.screenshot_dir.is_none() {
            self.provisioning.screenshot_dir = Some(self.output_dir.join("screenshots"));
        }
    }

    /// Copy with credentials masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        mask(&mut copy.llm.api_key);
        mask(&mut copy.platform.api_key);
        mask(&mut copy.provisioning.password);
        copy
    }
}

fn mask(secret: &mut String) {
    if !secret.is_empty() {
        *secret = "********".to_string();
    }
}

/// `explicit`, else `./config/config.yaml`, else the per-user config dir.
pub fn resolve_config_path(explicit: Option<&PathBuf>) -> Result<PathBuf, CopilotError> {
    if let Some(path) = explicit {
        return Ok(path.clone());
    }
    let local = PathBuf::from("config/config.yaml");
    if local.exists() {
        return Ok(local);
    }
    let mut path = dirs::config_dir()
        .ok_or_else(|| CopilotError::Config("no user configuration directory".into()))?;
    path.push(APP_DIR);
    path.push("config.yaml");
    Ok(path)
}
