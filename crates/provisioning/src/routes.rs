//! Web UI routes of the record platform.

use action_primitives::UrlPattern;
use once_cell::sync::Lazy;

pub const LOGIN: &str = "/Public/Login";
pub const ADMIN_HOME: &str = "/Admin/Home";
pub const MESSAGING_HISTORY: &str = "/Admin/Reporting/Messaging/History";
pub const SAVE_IMPORT_FILES: &str = "/Admin/Integration/Import/SaveImportFiles";

pub fn report_list(app_id: u64) -> String {
    format!("/Report/App/{app_id}")
}

pub fn application(app_id: u64) -> String {
    format!("/Admin/App/{app_id}")
}

pub static DASHBOARD: Lazy<UrlPattern> =
    Lazy::new(|| UrlPattern::new(r"/Dashboard").expect("dashboard route"));
pub static APPLICATION: Lazy<UrlPattern> =
    Lazy::new(|| UrlPattern::new(r"/Admin/App/(\d+)").expect("application route"));
pub static IMPORT_EDIT: Lazy<UrlPattern> = Lazy::new(|| {
    UrlPattern::new(r"/Admin/Integration/Import/(\d+)/Edit").expect("import edit route")
});
pub static IMPORT_PROCESSING: Lazy<UrlPattern> = Lazy::new(|| {
    UrlPattern::new(r"/Admin/Integration/Import/(\d+)/Processing").expect("import processing route")
});
pub static REPORT_DISPLAY: Lazy<UrlPattern> =
    Lazy::new(|| UrlPattern::new(r"/Report/(\d+)/Display").expect("report display route"));

/// Numeric id captured by `pattern` from `url`.
pub fn capture_id(pattern: &UrlPattern, url: &str) -> Option<u64> {
    pattern.capture(url).and_then(|id| id.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_captured_from_routes() {
        assert_eq!(
            capture_id(&APPLICATION, "https://acme.onspring.com/Admin/App/812#layouts"),
            Some(812)
        );
        assert_eq!(
            capture_id(&IMPORT_EDIT, "https://acme.onspring.com/Admin/Integration/Import/55/Edit"),
            Some(55)
        );
        assert_eq!(
            capture_id(&REPORT_DISPLAY, "https://acme.onspring.com/Report/901/Display?x=1"),
            Some(901)
        );
        assert_eq!(capture_id(&APPLICATION, "https://acme.onspring.com/Admin/Home"), None);
        assert!(!IMPORT_PROCESSING.is_match("https://acme.onspring.com/Admin/Integration/Import/55/Edit"));
    }
}
