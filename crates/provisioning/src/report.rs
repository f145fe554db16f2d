//! Saved report over a provisioned application: public, one display column
//! per inferred field in column order.

use grc_core_types::ImportAnalysisResult;
use tracing::info;

use crate::errors::{ProvisionError, Result};
use crate::routes;
use crate::selectors;
use crate::session::Session;

#[derive(Clone, Copy, Debug, Default)]
pub struct ReportProvisioner;

impl ReportProvisioner {
    pub fn new() -> Self {
        Self
    }

    /// Builds a public saved report listing every column in schema order and
    /// returns its display URL.
    pub async fn create_report(
        &self,
        session: &Session<'_>,
        analysis: &ImportAnalysisResult,
        application_url: &str,
    ) -> Result<String> {
        analysis.ensure_columns()?;
        let app_id = routes::capture_id(&routes::APPLICATION, application_url).ok_or_else(|| {
            ProvisionError::InvalidInput(format!(
                "'{application_url}' is not an application URL"
            ))
        })?;

        let step = "create report";
        session.goto(step, &routes::report_list(app_id)).await?;
        session
            .click(step, &selectors::create_report_button())
            .await?;
        let dialog = selectors::create_report_dialog();
        session.wait_visible(step, &dialog).await?;
        session.click(step, &selectors::saved_report_kind()).await?;
        session
            .fill(step, &selectors::name_in(dialog.clone()), &session.cfg.report_name)
            .await?;
        session
            .select(step, &selectors::report_security(), selectors::PUBLIC_SECURITY)
            .await?;
        session.click(step, &selectors::save_in(dialog)).await?;
        session
            .wait_visible(step, &selectors::report_designer())
            .await?;

        let target = selectors::display_fields();
        for name in analysis.column_names() {
            session
                .drag("lay out report", &selectors::available_field(name), &target)
                .await?;
        }

        session
            .click("run report", &selectors::designer_save_and_run())
            .await?;
        let (url, report_id) = session
            .wait_for_id("run report", &routes::REPORT_DISPLAY)
            .await?;
        info!(
            target: "provisioning",
            action_id = %session.ctx.action_id,
            app_id,
            report_id,
            columns = analysis.columns.len(),
            "report created"
        );
        Ok(url)
    }
}
