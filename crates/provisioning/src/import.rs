//! Import workflow state machine.
//!
//! `Created -> FileUploaded -> Configured -> Running -> Completed`, one
//! transition function per state. The platform returns no job handle, so
//! `Running -> Completed` is decided by polling the messaging history for the
//! platform's own "import complete" notification.

use std::fmt;
use std::sync::Arc;

use action_primitives::{FilePayload, ResponseMatcher};
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use grc_core_types::ImportJobName;
use tracing::{debug, info};

use crate::config::{DisplayZone, HistoryColumns};
use crate::errors::{ProvisionError, Result};
use crate::routes;
use crate::selectors;
use crate::session::Session;

/// Source of "now" for job names and start times.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImportState {
    Created {
        import_id: u64,
    },
    FileUploaded {
        import_id: u64,
    },
    Configured {
        import_id: u64,
    },
    Running {
        import_id: u64,
        started_at: DateTime<Utc>,
    },
    Completed {
        import_id: u64,
        started_at: DateTime<Utc>,
        notified_at: DateTime<Utc>,
        polls: u32,
    },
}

impl ImportState {
    pub fn name(&self) -> &'static str {
        match self {
            ImportState::Created { .. } => "created",
            ImportState::FileUploaded { .. } => "file_uploaded",
            ImportState::Configured { .. } => "configured",
            ImportState::Running { .. } => "running",
            ImportState::Completed { .. } => "completed",
        }
    }

    pub fn import_id(&self) -> u64 {
        match self {
            ImportState::Created { import_id }
            | ImportState::FileUploaded { import_id }
            | ImportState::Configured { import_id }
            | ImportState::Running { import_id, .. }
            | ImportState::Completed { import_id, .. } => *import_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportState::Completed { .. })
    }
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name(), self.import_id())
    }
}

/// First row of the messaging history grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryRow {
    pub recipient: String,
    pub subject: String,
    pub created: String,
}

impl HistoryRow {
    /// Picks the configured columns out of a grid row by heading. `None` when
    /// the grid is empty or a heading is absent.
    pub fn from_grid(headers: &[String], cells: &[String], columns: &HistoryColumns) -> Option<Self> {
        let position = |heading: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(heading.trim()))
        };
        let cell = |heading: &str| position(heading).and_then(|i| cells.get(i)).cloned();
        Some(Self {
            recipient: cell(&columns.recipient)?,
            subject: cell(&columns.subject)?,
            created: cell(&columns.created)?,
        })
    }
}

/// What a history row must show to count as this job's completion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionCriteria {
    pub operator_name: String,
    pub started_at: DateTime<Utc>,
    /// Zone the history grid displays times in.
    pub display_zone: DisplayZone,
}

const COMPLETE_SUBJECT: &str = "import complete";

/// True when `row` is the completion notice for the job described by
/// `job`: subject mentions "import complete", the recipient is the operator
/// and the row is no older than the minute the job started.
pub fn completion_matches(row: &HistoryRow, job: &CompletionCriteria) -> bool {
    if !row.subject.to_lowercase().contains(COMPLETE_SUBJECT) {
        return false;
    }
    if row.recipient.trim().to_lowercase() != job.operator_name.trim().to_lowercase() {
        return false;
    }
    let Some(created) = parse_history_time(&row.created, &job.display_zone) else {
        return false;
    };
    created >= truncate_to_minute(job.started_at)
}

fn truncate_to_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

const HISTORY_TIME_FORMATS: &[&str] = &[
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parses a displayed history timestamp. Times without an offset are read in
/// `zone`.
pub fn parse_history_time(text: &str, zone: &DisplayZone) -> Option<DateTime<Utc>> {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if let Ok(at) = DateTime::parse_from_rfc3339(&text) {
        return Some(at.with_timezone(&Utc));
    }
    HISTORY_TIME_FORMATS.iter().find_map(|format| {
        let naive = NaiveDateTime::parse_from_str(&text, format).ok()?;
        zone.to_utc(&naive)
    })
}

/// Drives one import of `file` into `application_name`.
pub struct ImportWorkflow {
    application_name: String,
    file: FilePayload,
    job_name: ImportJobName,
    clock: Clock,
}

impl ImportWorkflow {
    pub fn new(application_name: impl Into<String>, file: FilePayload) -> Self {
        Self::with_clock(application_name, file, system_clock())
    }

    pub fn with_clock(application_name: impl Into<String>, file: FilePayload, clock: Clock) -> Self {
        let application_name = application_name.into();
        let job_name = ImportJobName::new(&application_name, clock());
        Self {
            application_name,
            file,
            job_name,
            clock,
        }
    }

    pub fn job_name(&self) -> &ImportJobName {
        &self.job_name
    }

    /// Runs every transition until the import completes.
    pub async fn run(&self, session: &Session<'_>) -> Result<ImportState> {
        let mut state = self.create(session).await?;
        self.log_state(session, &state);
        while !state.is_terminal() {
            state = self.advance(session, state).await?;
            self.log_state(session, &state);
        }
        Ok(state)
    }

    /// Transition out of `state`; a completed state is returned unchanged.
    pub async fn advance(&self, session: &Session<'_>, state: ImportState) -> Result<ImportState> {
        match state {
            ImportState::Created { import_id } => self.upload_file(session, import_id).await,
            ImportState::FileUploaded { import_id } => self.configure(session, import_id).await,
            ImportState::Configured { import_id } => self.start(session, import_id).await,
            ImportState::Running {
                import_id,
                started_at,
            } => self.await_completion(session, import_id, started_at).await,
            done @ ImportState::Completed { .. } => Ok(done),
        }
    }

    fn log_state(&self, session: &Session<'_>, state: &ImportState) {
        info!(
            target: "provisioning",
            action_id = %session.ctx.action_id,
            import_id = state.import_id(),
            job = %self.job_name,
            state = state.name(),
            "import state"
        );
    }

    /// Creates the named import configuration.
    pub async fn create(&self, session: &Session<'_>) -> Result<ImportState> {
        let step = "create import";
        session.goto(step, routes::ADMIN_HOME).await?;
        session.click(step, &selectors::create_menu()).await?;
        session.click(step, &selectors::create_import_entry()).await?;
        let dialog = selectors::create_import_dialog();
        session.wait_visible(step, &dialog).await?;
        session
            .fill(step, &selectors::name_in(dialog.clone()), self.job_name.as_str())
            .await?;
        session.click(step, &selectors::save_in(dialog)).await?;
        let (_, import_id) = session.wait_for_id(step, &routes::IMPORT_EDIT).await?;
        Ok(ImportState::Created { import_id })
    }

    async fn upload_file(&self, session: &Session<'_>, import_id: u64) -> Result<ImportState> {
        let step = "upload import file";
        session.click(step, &selectors::target_app_picker()).await?;
        session
            .fill(step, &selectors::target_app_search(), &self.application_name)
            .await?;
        session
            .click(step, &selectors::target_app_option(&self.application_name))
            .await?;
        let ack = ResponseMatcher::new(routes::SAVE_IMPORT_FILES).method("POST");
        session
            .upload(step, &selectors::import_file_input(), &self.file, &ack)
            .await?;
        Ok(ImportState::FileUploaded { import_id })
    }

    /// List fields must accept new values before the record handling mode is
    /// switched to one new record per row.
    async fn configure(&self, session: &Session<'_>, import_id: u64) -> Result<ImportState> {
        let step = "configure import";
        session
            .click(step, &selectors::integration_settings_tab())
            .await?;
        session
            .select(step, &selectors::record_handling(), selectors::UPDATE_AND_ADD)
            .await?;
        let lists = session
            .count(step, &selectors::list_configuration_rows())
            .await?;
        for index in 0..lists {
            session
                .select(
                    step,
                    &selectors::list_value_handling(index),
                    selectors::ADD_LIST_VALUES,
                )
                .await?;
        }
        session
            .select(step, &selectors::record_handling(), selectors::ADD_NEW_RECORDS)
            .await?;
        debug!(target: "provisioning", import_id, lists, "import settings applied");
        Ok(ImportState::Configured { import_id })
    }

    async fn start(&self, session: &Session<'_>, import_id: u64) -> Result<ImportState> {
        let step = "run import";
        let started_at = (self.clock)();
        session.click(step, &selectors::save_and_run()).await?;
        let (url, processing_id) = session
            .wait_for_id(step, &routes::IMPORT_PROCESSING)
            .await?;
        if processing_id != import_id {
            return Err(ProvisionError::Route { step, url });
        }
        Ok(ImportState::Running {
            import_id,
            started_at,
        })
    }

    async fn await_completion(
        &self,
        session: &Session<'_>,
        import_id: u64,
        started_at: DateTime<Utc>,
    ) -> Result<ImportState> {
        let step = "await import completion";
        let cfg = session.cfg;
        let criteria = CompletionCriteria {
            operator_name: cfg.operator_name.clone(),
            started_at,
            display_zone: cfg.display_zone()?,
        };
        let max = cfg.max_poll_attempts;
        for attempt in 1..=max {
            session.ctx.ensure_live(step).map_err(|err| match err {
                err @ action_primitives::ActionError::Interrupted(_) => {
                    ProvisionError::Action { step, source: err }
                }
                _ => ProvisionError::TimedOut {
                    attempts: attempt - 1,
                },
            })?;

            session.goto(step, routes::MESSAGING_HISTORY).await?;
            session.network_idle(step).await?;
            let headers = session.texts(step, &selectors::history_headers()).await?;
            let cells = session.texts(step, &selectors::history_first_row()).await?;
            match HistoryRow::from_grid(&headers, &cells, &cfg.history_columns) {
                Some(row) if completion_matches(&row, &criteria) => {
                    let notified_at = parse_history_time(&row.created, &criteria.display_zone)
                        .unwrap_or(started_at);
                    info!(target: "provisioning", import_id, attempt, "import completion observed");
                    return Ok(ImportState::Completed {
                        import_id,
                        started_at,
                        notified_at,
                        polls: attempt,
                    });
                }
                Some(row) => {
                    debug!(target: "provisioning", import_id, attempt, subject = %row.subject, created = %row.created, "latest notification is not ours");
                }
                None => {
                    debug!(target: "provisioning", import_id, attempt, "messaging history empty");
                }
            }
            if attempt < max {
                session.pause(step, cfg.poll_interval()).await?;
            }
        }
        Err(ProvisionError::TimedOut { attempts: max })
    }
}
