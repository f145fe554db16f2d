//! Per-page network bookkeeping fed from `Network.*` events.
//!
//! Two consumers read from here: network-idle waits (in-flight count plus time
//! since last activity) and response waits, which scan a bounded log of
//! observed responses newer than a caller-held sequence mark.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::ids::PageId;

const RESPONSE_LOG_CAPACITY: usize = 512;

/// One response observed on a page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub seq: u64,
    pub url: String,
    pub method: Option<String>,
    pub status: i64,
}

/// Point-in-time network state for a page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkSnapshot {
    pub inflight: u64,
    pub since_last_activity_ms: u64,
}

impl NetworkSnapshot {
    pub fn is_quiet(&self, window_ms: u64, max_inflight: u32) -> bool {
        self.inflight <= max_inflight as u64 && self.since_last_activity_ms >= window_ms
    }
}

struct PageNetwork {
    inflight: HashMap<String, String>,
    last_activity: Instant,
    responses: VecDeque<ResponseRecord>,
    next_seq: u64,
}

impl PageNetwork {
    fn new() -> Self {
        Self {
            inflight: HashMap::new(),
            last_activity: Instant::now(),
            responses: VecDeque::new(),
            next_seq: 1,
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

#[derive(Default)]
pub struct NetworkTracker {
    pages: DashMap<PageId, PageNetwork>,
}

impl NetworkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, page: PageId) {
        self.pages.entry(page).or_insert_with(PageNetwork::new);
    }

    pub fn forget(&self, page: &PageId) {
        self.pages.remove(page);
    }

    pub fn clear(&self) {
        self.pages.clear();
    }

    pub fn on_request(&self, page: PageId, request_id: &str, method: &str) {
        let mut entry = self.pages.entry(page).or_insert_with(PageNetwork::new);
        entry
            .inflight
            .insert(request_id.to_string(), method.to_string());
        entry.touch();
    }

    pub fn on_response(&self, page: PageId, request_id: &str, url: &str, status: i64) -> u64 {
        let mut entry = self.pages.entry(page).or_insert_with(PageNetwork::new);
        let seq = entry.next_seq;
        entry.next_seq += 1;
        let method = entry.inflight.get(request_id).cloned();
        entry.responses.push_back(ResponseRecord {
            seq,
            url: url.to_string(),
            method,
            status,
        });
        while entry.responses.len() > RESPONSE_LOG_CAPACITY {
            entry.responses.pop_front();
        }
        entry.touch();
        seq
    }

    /// Loading finished or failed; the request leaves the in-flight set.
    pub fn on_settled(&self, page: PageId, request_id: &str) {
        if let Some(mut entry) = self.pages.get_mut(&page) {
            entry.inflight.remove(request_id);
            entry.touch();
        }
    }

    /// Highest sequence number recorded so far; responses after it are "new".
    pub fn mark(&self, page: &PageId) -> u64 {
        self.pages
            .get(page)
            .map(|entry| entry.next_seq - 1)
            .unwrap_or(0)
    }

    pub fn responses_since(&self, page: &PageId, mark: u64) -> Vec<ResponseRecord> {
        self.pages
            .get(page)
            .map(|entry| {
                entry
                    .responses
                    .iter()
                    .filter(|record| record.seq > mark)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn snapshot(&self, page: &PageId) -> Option<NetworkSnapshot> {
        self.pages.get(page).map(|entry| NetworkSnapshot {
            inflight: entry.inflight.len() as u64,
            since_last_activity_ms: duration_ms(entry.last_activity.elapsed()),
        })
    }
}

fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responses_after_mark_are_reported_with_request_method() {
        let tracker = NetworkTracker::new();
        let page = PageId::new();
        tracker.track(page);

        tracker.on_request(page, "r1", "GET");
        tracker.on_response(page, "r1", "https://x.test/Dashboard", 200);
        let mark = tracker.mark(&page);

        tracker.on_request(page, "r2", "POST");
        tracker.on_response(page, "r2", "https://x.test/SaveImportFiles", 200);

        let fresh = tracker.responses_since(&page, mark);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].url, "https://x.test/SaveImportFiles");
        assert_eq!(fresh[0].method.as_deref(), Some("POST"));
    }

    #[test]
    fn inflight_drops_when_requests_settle() {
        let tracker = NetworkTracker::new();
        let page = PageId::new();
        tracker.on_request(page, "r1", "GET");
        tracker.on_request(page, "r2", "GET");
        assert_eq!(tracker.snapshot(&page).unwrap().inflight, 2);

        tracker.on_settled(page, "r1");
        tracker.on_settled(page, "r2");
        let snapshot = tracker.snapshot(&page).unwrap();
        assert_eq!(snapshot.inflight, 0);
        assert!(!snapshot.is_quiet(60_000, 0));
        assert!(snapshot.is_quiet(0, 0));
    }

    #[test]
    fn response_log_is_bounded() {
        let tracker = NetworkTracker::new();
        let page = PageId::new();
        for idx in 0..(RESPONSE_LOG_CAPACITY + 10) {
            tracker.on_response(page, &format!("r{idx}"), "https://x.test/a", 200);
        }
        assert_eq!(tracker.responses_since(&page, 0).len(), RESPONSE_LOG_CAPACITY);
    }
}
