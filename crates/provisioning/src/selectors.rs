//! Locators for the record platform's admin UI.
//!
//! Everything the workflows touch on the page is named here, so a UI change
//! on the platform side is a change to this file only.

use action_primitives::Locator;
use grc_core_types::ColumnType;

// Login

pub fn username() -> Locator {
    Locator::label("Username")
}

pub fn password() -> Locator {
    Locator::label("Password")
}

pub fn login_button() -> Locator {
    Locator::role("button", "Login")
}

// Admin home "Create" menu

pub fn create_menu() -> Locator {
    Locator::role("button", "Create").exact()
}

pub fn create_application_entry() -> Locator {
    Locator::role("menuitem", "App / Survey")
}

pub fn create_import_entry() -> Locator {
    Locator::role("menuitem", "Data Import")
}

pub fn create_application_dialog() -> Locator {
    Locator::role("dialog", "Create App")
}

pub fn create_import_dialog() -> Locator {
    Locator::role("dialog", "Create Data Import")
}

/// Name input of a create dialog.
pub fn name_in(dialog: Locator) -> Locator {
    Locator::label("Name").within(dialog)
}

pub fn save_in(dialog: Locator) -> Locator {
    Locator::role("button", "Save").exact().within(dialog)
}

// Application layouts

pub fn layouts_tab() -> Locator {
    Locator::role("tab", "Layouts")
}

pub fn add_field_button() -> Locator {
    Locator::role("button", "Add Field")
}

/// Field type entry of the "Add Field" menu; matches the type tag as a
/// case-insensitive substring of the entry label.
pub fn field_type_entry(column_type: ColumnType) -> Locator {
    Locator::role("menuitem", column_type.as_str()).first()
}

pub fn field_dialog() -> Locator {
    Locator::role("dialog", "Field")
}

pub fn field_name() -> Locator {
    Locator::label("Field").exact().within(field_dialog())
}

/// Body of the rich-text editor embedded in the field dialog.
pub fn field_description() -> Locator {
    Locator::css("body[contenteditable]")
        .in_frame("iframe")
        .within(Locator::css(".description").within(field_dialog()))
}

// Import configuration

pub fn target_app_picker() -> Locator {
    Locator::role("combobox", "App/Survey")
}

pub fn target_app_search() -> Locator {
    Locator::any_role("searchbox").within(Locator::any_role("listbox"))
}

pub fn target_app_option(app_name: &str) -> Locator {
    Locator::role("option", app_name).exact()
}

pub fn import_file_input() -> Locator {
    Locator::css("input[type=file]").first()
}

pub fn integration_settings_tab() -> Locator {
    Locator::role("tab", "Integration Settings")
}

pub fn record_handling() -> Locator {
    Locator::label("Record Handling")
}

/// Rows of the list configuration grid.
pub fn list_configuration_rows() -> Locator {
    Locator::css("tbody tr").within(Locator::css("#list-configuration"))
}

/// List value policy select of row `index` in the list configuration grid.
pub fn list_value_handling(index: usize) -> Locator {
    Locator::css("select").within(list_configuration_rows().nth(index))
}

pub const UPDATE_AND_ADD: &str = "Update content for matching records and add new content";
pub const ADD_NEW_RECORDS: &str = "Add new content for each record in the file";
pub const ADD_LIST_VALUES: &str = "Add new values to the existing list";

pub fn save_and_run() -> Locator {
    Locator::role("button", "Save Changes & Run")
}

// Messaging history

pub fn history_headers() -> Locator {
    Locator::css("thead th").within(Locator::css("#messaging-history"))
}

pub fn history_first_row() -> Locator {
    Locator::css("tbody tr:first-child td").within(Locator::css("#messaging-history"))
}

// Reports

pub fn create_report_button() -> Locator {
    Locator::role("button", "Create Report")
}

pub fn create_report_dialog() -> Locator {
    Locator::role("dialog", "Create Report")
}

pub fn saved_report_kind() -> Locator {
    Locator::role("radio", "Saved Report").within(create_report_dialog())
}

pub fn report_security() -> Locator {
    Locator::label("Security").within(create_report_dialog())
}

pub const PUBLIC_SECURITY: &str = "Public";

pub fn report_designer() -> Locator {
    Locator::role("dialog", "Report Designer")
}

/// Field token `name` in the designer's available fields list.
pub fn available_field(name: &str) -> Locator {
    Locator::text_ci(name)
        .exact()
        .first()
        .within(Locator::css(".available-fields").within(report_designer()))
}

/// Drop zone of the report's display fields; a drop appends.
pub fn display_fields() -> Locator {
    Locator::css(".display-fields").within(report_designer())
}

pub fn designer_save_and_run() -> Locator {
    Locator::role("button", "Save Changes & Run").within(report_designer())
}
