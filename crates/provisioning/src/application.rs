//! Creates the application and one field per inferred column.

use grc_core_types::{ColumnSchema, ImportAnalysisResult};
use tracing::info;

use crate::errors::Result;
use crate::routes;
use crate::selectors;
use crate::session::Session;

/// URL and id of an application created on the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedApplication {
    pub id: u64,
    pub url: String,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ApplicationProvisioner;

impl ApplicationProvisioner {
    pub fn new() -> Self {
        Self
    }

    /// Creates the application and its fields in column order. Expects a
    /// logged-in session.
    pub async fn create_application(
        &self,
        session: &Session<'_>,
        analysis: &ImportAnalysisResult,
    ) -> Result<CreatedApplication> {
        analysis.ensure_columns()?;
        let step = "create application";
        session.goto(step, routes::ADMIN_HOME).await?;
        session.click(step, &selectors::create_menu()).await?;
        session
            .click(step, &selectors::create_application_entry())
            .await?;
        let dialog = selectors::create_application_dialog();
        session.wait_visible(step, &dialog).await?;
        session
            .fill(step, &selectors::name_in(dialog.clone()), &analysis.application_name)
            .await?;
        session.click(step, &selectors::save_in(dialog)).await?;
        let (_, id) = session.wait_for_id(step, &routes::APPLICATION).await?;
        let url = session.cfg.url(&routes::application(id));
        info!(
            target: "provisioning",
            action_id = %session.ctx.action_id,
            app_id = id,
            app = %analysis.application_name,
            "application created"
        );

        session
            .click("open layouts", &selectors::layouts_tab())
            .await?;
        for (index, column) in analysis.columns.iter().enumerate() {
            self.add_field(session, column).await?;
            info!(
                target: "provisioning",
                app_id = id,
                field = %column.name,
                r#type = column.column_type.as_str(),
                position = index,
                "field added"
            );
        }
        Ok(CreatedApplication { id, url })
    }

    async fn add_field(&self, session: &Session<'_>, column: &ColumnSchema) -> Result<()> {
        let step = "add field";
        session.click(step, &selectors::add_field_button()).await?;
        session
            .click(step, &selectors::field_type_entry(column.column_type))
            .await?;
        let dialog = selectors::field_dialog();
        session.wait_visible(step, &dialog).await?;
        session
            .fill(step, &selectors::field_name(), &column.name)
            .await?;
        session
            .fill(step, &selectors::field_description(), &column.description)
            .await?;
        session.click(step, &selectors::save_in(dialog.clone())).await?;
        session.wait_hidden(step, &dialog).await
    }
}
