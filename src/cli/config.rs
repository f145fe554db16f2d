use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Subcommand};
use serde_json::Value as JsonValue;
use tokio::fs;
use tracing::info;

use super::context::CliContext;
use crate::config::AppConfig;

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Effective configuration (file plus environment, secrets masked)
    Show,

    /// Configuration file in use
    Path,

    /// Change one value in the configuration file
    Set {
        /// Dotted key, e.g. provisioning.poll_interval_ms
        key: ConfigKey,

        /// JSON literal, or a bare string
        value: String,
    },

    /// Read one value from the configuration file
    Get { key: ConfigKey },

    /// Overwrite the file with defaults
    Reset,

    /// Parse the file and check the provisioning settings
    Validate,
}

/// A dotted path into [`AppConfig`], held as a JSON pointer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigKey {
    dotted: String,
    pointer: String,
}

impl FromStr for ConfigKey {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = raw.split('.').collect();
        if parts.iter().any(|part| part.trim().is_empty()) {
            return Err(format!("'{raw}' is not a dotted configuration key"));
        }
        let pointer = parts
            .iter()
            .map(|part| format!("/{}", part.trim()))
            .collect::<String>();
        Ok(Self {
            dotted: raw.to_string(),
            pointer,
        })
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dotted)
    }
}

pub async fn cmd_config(args: ConfigArgs, ctx: &CliContext) -> Result<()> {
    let path = ctx.config_path();
    match args.action {
        ConfigAction::Show => {
            println!("# {}", path.display());
            print!("{}", serde_yaml::to_string(&ctx.config().redacted())?);
        }
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Set { key, value } => {
            let updated = assign(read_file(path).await?, &key, literal(&value))?;
            write_file(path, &updated).await?;
            info!(%key, file = %path.display(), "configuration updated");
            println!("{key} saved to {}", path.display());
        }
        ConfigAction::Get { key } => {
            let tree = serde_json::to_value(read_file(path).await?)?;
            let value = lookup(&tree, &key)?;
            print!("{}", serde_yaml::to_string(value)?);
        }
        ConfigAction::Reset => {
            write_file(path, &AppConfig::default()).await?;
            println!("Defaults written to {}", path.display());
        }
        ConfigAction::Validate => {
            read_file(path).await?;
            // credentials may only be present in the environment layer
            ctx.config()
                .provisioning
                .validate()
                .with_context(|| format!("validating {}", path.display()))?;
            println!("{} is valid", path.display());
        }
    }
    Ok(())
}

fn literal(raw: &str) -> JsonValue {
    serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()))
}

fn lookup<'a>(tree: &'a JsonValue, key: &ConfigKey) -> Result<&'a JsonValue> {
    tree.pointer(&key.pointer)
        .ok_or_else(|| anyhow!("unknown configuration key {key}"))
}

/// Replaces one existing leaf and re-checks the whole document against the
/// typed configuration.
fn assign(config: AppConfig, key: &ConfigKey, value: JsonValue) -> Result<AppConfig> {
    let mut tree = serde_json::to_value(config)?;
    let slot = tree
        .pointer_mut(&key.pointer)
        .ok_or_else(|| anyhow!("unknown configuration key {key}"))?;
    if slot.is_object() {
        return Err(anyhow!("{key} is a section; set one of its fields instead"));
    }
    *slot = value;
    serde_json::from_value(tree).with_context(|| format!("invalid value for {key}"))
}

async fn read_file(path: &Path) -> Result<AppConfig> {
    match fs::read_to_string(path).await {
        Ok(raw) => AppConfig::from_yaml(&raw).with_context(|| format!("parsing {}", path.display())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
    }
}

async fn write_file(path: &Path, config: &AppConfig) -> Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
    }
    fs::write(path, serde_yaml::to_string(config)?)
        .await
        .with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(raw: &str) -> ConfigKey {
        raw.parse().unwrap()
    }

    #[test]
    fn keys_map_to_json_pointers() {
        assert_eq!(key("llm.write_model").pointer, "/llm/write_model");
        assert!("provisioning..password".parse::<ConfigKey>().is_err());
        assert!("".parse::<ConfigKey>().is_err());
    }

    #[test]
    fn assign_updates_typed_fields() {
        let updated = assign(
            AppConfig::default(),
            &key("provisioning.max_poll_attempts"),
            literal("30"),
        )
        .unwrap();
        assert_eq!(updated.provisioning.max_poll_attempts, 30);

        let updated = assign(updated, &key("reference.max_control_attempts"), literal("9")).unwrap();
        assert_eq!(updated.reference.max_control_attempts, Some(9));
    }

    #[test]
    fn assign_rejects_unknown_keys_sections_and_bad_types() {
        let config = AppConfig::default();
        assert!(assign(config.clone(), &key("llm.temperature_bogus"), json!(1)).is_err());
        assert!(assign(config.clone(), &key("provisioning"), json!(1)).is_err());
        assert!(assign(config, &key("provisioning.max_poll_attempts"), literal("many")).is_err());
    }

    #[test]
    fn bare_words_stay_strings() {
        assert_eq!(literal("true"), json!(true));
        assert_eq!(literal("https://acme.test"), json!("https://acme.test"));
    }

    #[test]
    fn missing_file_reads_as_defaults_and_writes_create_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let mut config = tokio_test::block_on(read_file(&path)).unwrap();
        config.reference.cache_path = "cache/citations.json".into();
        tokio_test::block_on(write_file(&path, &config)).unwrap();

        let reread = tokio_test::block_on(read_file(&path)).unwrap();
        assert_eq!(reread.reference.cache_path, config.reference.cache_path);
        let tree = serde_json::to_value(&reread).unwrap();
        assert_eq!(
            lookup(&tree, &key("reference.cache_path")).unwrap(),
            &json!("cache/citations.json")
        );
    }
}
