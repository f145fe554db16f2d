//! Locator-driven page operations.
//!
//! [`PageDriver`] is the capability the provisioning workflows consume: find by
//! role/label/text/CSS, fill, click, drag, upload, and wait for URLs, responses
//! or network idle. [`CdpPage`] implements it over the CDP adapter and
//! [`ScriptedPage`] is a deterministic fake for tests.

mod cdp_page;
pub mod errors;
mod fake;
mod locator;
mod page;
pub mod types;
mod waiting;

pub use cdp_page::{CdpPage, CdpPageFactory};
pub use errors::*;
pub use fake::{PageAction, ScriptedPage, ScriptedPageFactory};
pub use locator::{Locator, LocatorKind};
pub use page::{PageDriver, PageFactory};
pub use types::*;
pub use waiting::{poll_until, POLL_INTERVAL};
