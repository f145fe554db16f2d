//! Core data types for page operations

use std::fmt;
use std::ops::RangeInclusive;
use std::path::Path;
use std::time::{Duration, Instant};

use cdp_adapter::ResponseRecord;
use grc_core_types::ActionId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::errors::ActionError;

/// Execution context for page operations
///
/// Carries the deadline every wait honours, the cancellation token checked
/// before each poll, and an id used to correlate log lines.
#[derive(Clone, Debug)]
pub struct ExecCtx {
    pub deadline: Instant,
    pub cancel_token: CancellationToken,
    pub action_id: ActionId,
}

impl ExecCtx {
    pub fn new(timeout: Duration, cancel_token: CancellationToken) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancel_token,
            action_id: ActionId::new(),
        }
    }

    /// Child context for one step: same token and id, deadline narrowed to
    /// `timeout` from now but never past the parent's.
    pub fn step(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        Self {
            deadline: candidate.min(self.deadline),
            cancel_token: self.cancel_token.clone(),
            action_id: self.action_id.clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    pub fn is_timeout(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn remaining_time(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Cancellation first, then the deadline.
    pub fn ensure_live(&self, what: &str) -> Result<(), ActionError> {
        if self.is_cancelled() {
            return Err(ActionError::Interrupted(format!("{what}: context cancelled")));
        }
        if self.is_timeout() {
            return Err(ActionError::WaitTimeout(format!(
                "{what}: deadline exceeded"
            )));
        }
        Ok(())
    }
}

/// Element states a caller can wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementState {
    /// At least one visible match
    Visible,
    /// No visible match
    Hidden,
}

/// Regex over the full page URL.
#[derive(Clone, Debug)]
pub struct UrlPattern {
    regex: Regex,
}

impl UrlPattern {
    pub fn new(pattern: &str) -> Result<Self, ActionError> {
        let regex = Regex::new(pattern)
            .map_err(|err| ActionError::Internal(format!("invalid url pattern: {err}")))?;
        Ok(Self { regex })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn is_match(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }

    /// First capture group of the match, if any.
    pub fn capture(&self, url: &str) -> Option<String> {
        self.regex
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.regex.as_str())
    }
}

/// Cursor into a page's response log; only later responses satisfy a wait.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResponseMark(pub u64);

/// Predicate over observed network responses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseMatcher {
    pub url_contains: String,
    pub method: Option<String>,
    pub status: RangeInclusive<i64>,
}

impl ResponseMatcher {
    /// Any 2xx response whose URL contains `fragment`.
    pub fn new(fragment: impl Into<String>) -> Self {
        Self {
            url_contains: fragment.into(),
            method: None,
            status: 200..=299,
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn status(mut self, status: RangeInclusive<i64>) -> Self {
        self.status = status;
        self
    }

    pub fn matches(&self, record: &ResponseRecord) -> bool {
        if !record.url.contains(&self.url_contains) || !self.status.contains(&record.status) {
            return false;
        }
        match (&self.method, &record.method) {
            (None, _) => true,
            (Some(expected), Some(actual)) => expected.eq_ignore_ascii_case(actual),
            (Some(_), None) => false,
        }
    }
}

impl fmt::Display for ResponseMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(method) = &self.method {
            write!(f, "{method} ")?;
        }
        write!(
            f,
            "*{}* [{}..={}]",
            self.url_contains,
            self.status.start(),
            self.status.end()
        )
    }
}

/// File handed to a file chooser.
#[derive(Clone, PartialEq, Eq)]
pub struct FilePayload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl FilePayload {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ActionError> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| ActionError::Io(format!("{} has no file name", path.display())))?;
        let mime_type = guess_mime(&file_name).to_string();
        Ok(Self {
            file_name,
            mime_type,
            bytes,
        })
    }

    /// File name reduced to a single safe path component.
    pub fn safe_file_name(&self) -> String {
        let cleaned: String = self
            .file_name
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '\0' => '_',
                other => other,
            })
            .collect();
        let trimmed = cleaned.trim_matches('.');
        if trimmed.is_empty() {
            "upload.bin".to_string()
        } else {
            trimmed.to_string()
        }
    }
}

impl fmt::Debug for FilePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePayload")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

fn guess_mime(file_name: &str) -> &'static str {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".csv") {
        "text/csv"
    } else if lower.ends_with(".json") {
        "application/json"
    } else if lower.ends_with(".txt") {
        "text/plain"
    } else if lower.ends_with(".xlsx") {
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str, method: &str, status: i64) -> ResponseRecord {
        ResponseRecord {
            seq: 1,
            url: url.into(),
            method: Some(method.into()),
            status,
        }
    }

    #[test]
    fn step_never_extends_parent_deadline() {
        let parent = ExecCtx::new(Duration::from_millis(50), CancellationToken::new());
        let child = parent.step(Duration::from_secs(60));
        assert_eq!(child.deadline, parent.deadline);
        assert_eq!(child.action_id, parent.action_id);

        let narrow = parent.step(Duration::from_millis(1));
        assert!(narrow.deadline <= parent.deadline);
    }

    #[test]
    fn ensure_live_reports_cancellation_before_deadline() {
        let token = CancellationToken::new();
        let ctx = ExecCtx::new(Duration::ZERO, token.clone());
        assert!(matches!(ctx.ensure_live("x"), Err(ActionError::WaitTimeout(_))));
        token.cancel();
        assert!(matches!(ctx.ensure_live("x"), Err(ActionError::Interrupted(_))));
    }

    #[test]
    fn url_pattern_extracts_first_group() {
        let pattern = UrlPattern::new(r"/Admin/App/(\d+)").unwrap();
        assert_eq!(
            pattern.capture("https://acme.onspring.com/Admin/App/812#layouts"),
            Some("812".to_string())
        );
        assert!(!pattern.is_match("https://acme.onspring.com/Admin/Home"));
        assert!(UrlPattern::new("(").is_err());
    }

    #[test]
    fn response_matcher_checks_url_method_and_status() {
        let matcher = ResponseMatcher::new("SaveImportFiles").method("POST");
        assert!(matcher.matches(&record("https://x/Admin/Integration/Import/SaveImportFiles", "post", 200)));
        assert!(!matcher.matches(&record("https://x/Admin/Integration/Import/SaveImportFiles", "POST", 500)));
        assert!(!matcher.matches(&record("https://x/Admin/Integration/Import/SaveImportFiles", "GET", 200)));
        assert!(!matcher.matches(&record("https://x/Other", "POST", 200)));
    }

    #[test]
    fn payload_names_are_sanitised() {
        let payload = FilePayload::new("../../etc/passwd", "text/plain", Vec::new());
        assert_eq!(payload.safe_file_name(), "_.._etc_passwd");
        assert_eq!(guess_mime("People.CSV"), "text/csv");
    }
}
