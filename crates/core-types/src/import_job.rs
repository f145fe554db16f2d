use std::fmt;

use chrono::{DateTime, Utc};

/// Name given to the import configuration on the remote platform:
/// `{unixMillis}_{applicationName}_import`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportJobName(String);

impl ImportJobName {
    pub fn new(application_name: &str, created_at: DateTime<Utc>) -> Self {
        Self(format!(
            "{}_{}_import",
            created_at.timestamp_millis(),
            application_name
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImportJobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
