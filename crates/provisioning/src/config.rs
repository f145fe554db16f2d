use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::errors::ProvisionError;

/// Headings of the messaging history grid the completion poll reads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryColumns {
    pub recipient: String,
    pub subject: String,
    pub created: String,
}

impl Default for HistoryColumns {
    fn default() -> Self {
        Self {
            recipient: "Recipient".to_string(),
            subject: "Subject".to_string(),
            created: "Created Date".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Web UI root, e.g. `https://acme.onspring.com`.
    pub instance_url: String,
    pub username: String,
    pub password: String,
    /// Recipient shown on the platform's own import notifications.
    pub operator_name: String,
    pub step_timeout_secs: u64,
    /// Whole-operation deadline; `None` leaves only the per-step timeouts.
    pub operation_timeout_secs: Option<u64>,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    pub history_columns: HistoryColumns,
    /// IANA zone the history grid displays times in, e.g. `America/New_York`.
    /// Takes precedence over `display_utc_offset_minutes`.
    pub display_time_zone: Option<String>,
    /// Fixed offset of the displayed times, in minutes east of UTC.
    pub display_utc_offset_minutes: i32,
    pub report_name: String,
    /// Failure screenshots land here when set.
    pub screenshot_dir: Option<PathBuf>,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            instance_url: String::new(),
            username: String::new(),
            password: String::new(),
            operator_name: "Onspring System".to_string(),
            step_timeout_secs: 30,
            operation_timeout_secs: Some(3600),
            poll_interval_ms: 5_000,
            max_poll_attempts: 120,
            history_columns: HistoryColumns::default(),
            display_time_zone: None,
            display_utc_offset_minutes: 0,
            report_name: "All Records".to_string(),
            screenshot_dir: None,
        }
    }
}

impl ProvisioningConfig {
    pub fn validate(&self) -> Result<(), ProvisionError> {
        if self.instance_url.trim().is_empty() {
            return Err(ProvisionError::Config("instance_url is not set".into()));
        }
        if self.username.trim().is_empty() || self.password.is_empty() {
            return Err(ProvisionError::Config(
                "operator username and password are required".into(),
            ));
        }
        if self.max_poll_attempts == 0 {
            return Err(ProvisionError::Config("max_poll_attempts must be at least 1".into()));
        }
        self.display_zone()?;
        Ok(())
    }

    /// Absolute URL of a path on the instance.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.instance_url.trim_end_matches('/'), path)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn display_zone(&self) -> Result<DisplayZone, ProvisionError> {
        if let Some(name) = self.display_time_zone.as_deref() {
            let tz = name.trim().parse::<Tz>().map_err(|_| {
                ProvisionError::Config(format!("display_time_zone '{name}' is not an IANA zone"))
            })?;
            return Ok(DisplayZone::Named(tz));
        }
        FixedOffset::east_opt(self.display_utc_offset_minutes * 60)
            .map(DisplayZone::Fixed)
            .ok_or_else(|| {
                ProvisionError::Config(format!(
                    "display_utc_offset_minutes {} is out of range",
                    self.display_utc_offset_minutes
                ))
            })
    }
}

/// Zone that wall-clock times shown by the platform are read in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayZone {
    Fixed(FixedOffset),
    Named(Tz),
}

impl DisplayZone {
    /// UTC instant of a displayed wall-clock time. A time repeated when
    /// clocks fall back resolves to its earlier instant; a time skipped when
    /// they spring forward has none.
    pub fn to_utc(&self, local: &NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            DisplayZone::Fixed(offset) => offset
                .from_local_datetime(local)
                .earliest()
                .map(|at| at.with_timezone(&Utc)),
            DisplayZone::Named(tz) => tz
                .from_local_datetime(local)
                .earliest()
                .map(|at| at.with_timezone(&Utc)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> ProvisioningConfig {
        ProvisioningConfig {
            instance_url: "https://acme.onspring.com/".into(),
            username: "ops".into(),
            password: "secret".into(),
            ..ProvisioningConfig::default()
        }
    }

    #[test]
    fn urls_join_without_double_slash() {
        assert_eq!(
            configured().url("/Admin/Home"),
            "https://acme.onspring.com/Admin/Home"
        );
    }

    #[test]
    fn validation_requires_instance_and_credentials() {
        assert!(configured().validate().is_ok());
        assert!(ProvisioningConfig::default().validate().is_err());
        let cfg = ProvisioningConfig {
            display_utc_offset_minutes: 24 * 60,
            ..configured()
        };
        assert!(matches!(cfg.validate(), Err(ProvisionError::Config(_))));
    }

    #[test]
    fn named_zone_wins_over_the_fixed_offset() {
        let cfg = ProvisioningConfig {
            display_time_zone: Some("America/New_York".into()),
            display_utc_offset_minutes: -300,
            ..configured()
        };
        assert_eq!(
            cfg.display_zone().unwrap(),
            DisplayZone::Named(chrono_tz::America::New_York)
        );

        let cfg = ProvisioningConfig {
            display_time_zone: None,
            ..cfg
        };
        assert_eq!(
            cfg.display_zone().unwrap(),
            DisplayZone::Fixed(FixedOffset::west_opt(5 * 3600).unwrap())
        );
    }

    #[test]
    fn unknown_zone_name_fails_validation() {
        let cfg = ProvisioningConfig {
            display_time_zone: Some("Mars/Olympus_Mons".into()),
            ..configured()
        };
        assert!(matches!(cfg.validate(), Err(ProvisionError::Config(_))));
    }
}
