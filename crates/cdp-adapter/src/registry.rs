//! Page bookkeeping: which CDP target and flattened session belong to which
//! [`PageId`], and the last URL each page was seen at.

use dashmap::DashMap;
use serde::Serialize;

use crate::ids::{PageId, SessionId};

#[derive(Clone, Debug, Serialize)]
pub struct PageEntry {
    pub session_id: SessionId,
    pub target_id: Option<String>,
    pub cdp_session: Option<String>,
    pub last_url: Option<String>,
}

/// Pages plus reverse indexes from CDP target and session ids.
#[derive(Default)]
pub struct Registry {
    pages: DashMap<PageId, PageEntry>,
    by_target: DashMap<String, PageId>,
    by_session: DashMap<String, PageId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        page: PageId,
        session: SessionId,
        target_id: Option<String>,
        cdp_session: Option<String>,
    ) {
        if let Some(target) = &target_id {
            self.by_target.insert(target.clone(), page);
        }
        if let Some(cdp) = &cdp_session {
            self.by_session.insert(cdp.clone(), page);
        }
        self.pages.insert(
            page,
            PageEntry {
                session_id: session,
                target_id,
                cdp_session,
                last_url: None,
            },
        );
    }

    /// Binds a flattened session to the page owning `target_id`.
    pub fn attach(&self, target_id: &str, cdp_session: String) -> Option<PageId> {
        let page = self.page_for_target(target_id)?;
        self.by_session.insert(cdp_session.clone(), page);
        if let Some(mut entry) = self.pages.get_mut(&page) {
            entry.cdp_session = Some(cdp_session);
        }
        Some(page)
    }

    pub fn detach(&self, cdp_session: &str) {
        self.by_session.remove(cdp_session);
    }

    /// Drops the page and every index pointing at it.
    pub fn forget(&self, page: &PageId) -> Option<PageEntry> {
        let (_, entry) = self.pages.remove(page)?;
        if let Some(target) = &entry.target_id {
            self.by_target.remove(target);
        }
        self.by_session.retain(|_, owner| owner != page);
        Some(entry)
    }

    pub fn forget_target(&self, target_id: &str) -> Option<PageId> {
        let page = self.page_for_target(target_id)?;
        self.forget(&page);
        Some(page)
    }

    /// Empties the registry, returning the pages it held.
    pub fn clear(&self) -> Vec<PageId> {
        let pages: Vec<PageId> = self.pages.iter().map(|entry| *entry.key()).collect();
        self.pages.clear();
        self.by_target.clear();
        self.by_session.clear();
        pages
    }

    pub fn page_for_target(&self, target_id: &str) -> Option<PageId> {
        self.by_target.get(target_id).map(|entry| *entry.value())
    }

    pub fn page_for_session(&self, cdp_session: &str) -> Option<PageId> {
        self.by_session.get(cdp_session).map(|entry| *entry.value())
    }

    pub fn cdp_session(&self, page: &PageId) -> Option<String> {
        self.pages.get(page).and_then(|entry| entry.cdp_session.clone())
    }

    pub fn target_id(&self, page: &PageId) -> Option<String> {
        self.pages.get(page).and_then(|entry| entry.target_id.clone())
    }

    pub fn note_url(&self, page: &PageId, url: impl Into<String>) {
        if let Some(mut entry) = self.pages.get_mut(page) {
            entry.last_url = Some(url.into());
        }
    }

    pub fn last_url(&self, page: &PageId) -> Option<String> {
        self.pages.get(page).and_then(|entry| entry.last_url.clone())
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_links_session_to_the_target_page() {
        let registry = Registry::new();
        let page = PageId::new();
        registry.register(page, SessionId::new(), Some("target-1".into()), None);
        assert!(registry.cdp_session(&page).is_none());

        assert_eq!(registry.attach("target-1", "session-1".into()), Some(page));
        assert_eq!(registry.attach("target-unknown", "session-2".into()), None);
        registry.note_url(&page, "https://acme.onspring.test/Dashboard");

        assert_eq!(registry.page_for_session("session-1"), Some(page));
        assert!(registry.page_for_session("session-2").is_none());
        assert_eq!(
            registry.last_url(&page).as_deref(),
            Some("https://acme.onspring.test/Dashboard")
        );
    }

    #[test]
    fn forgetting_a_target_clears_every_index() {
        let registry = Registry::new();
        let page = PageId::new();
        registry.register(
            page,
            SessionId::new(),
            Some("target-1".into()),
            Some("session-1".into()),
        );

        assert_eq!(registry.forget_target("target-1"), Some(page));
        assert!(registry.is_empty());
        assert!(registry.page_for_session("session-1").is_none());
        assert!(registry.page_for_target("target-1").is_none());
        assert!(registry.forget_target("target-1").is_none());
    }

    #[test]
    fn detach_keeps_the_page() {
        let registry = Registry::new();
        let page = PageId::new();
        registry.register(page, SessionId::new(), Some("t".into()), Some("s".into()));
        registry.detach("s");
        assert!(registry.page_for_session("s").is_none());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.clear(), vec![page]);
    }
}
