use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use platform_api::{
    DataFormat, PlatformError, RecordApi, RecordData, ReferenceConfig, ReferenceService,
    ReportData,
};
use serde_json::json;

/// In-memory platform: fixed reports, and a queue of outcomes per record id.
#[derive(Default)]
struct FakeApi {
    reports: HashMap<i64, ReportData>,
    records: Mutex<HashMap<i64, VecDeque<Result<Option<RecordData>, PlatformError>>>>,
    report_calls: Mutex<Vec<(i64, DataFormat)>>,
    record_calls: Mutex<Vec<(i64, i64, Vec<i64>)>>,
}

impl FakeApi {
    fn report(mut self, id: i64, body: serde_json::Value) -> Self {
        self.reports.insert(id, serde_json::from_value(body).unwrap());
        self
    }

    fn record(self, id: i64, outcome: Result<Option<RecordData>, PlatformError>) -> Self {
        self.records
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .push_back(outcome);
        self
    }

    fn bounds(self, min: i64, max: i64) -> Self {
        self.report(29, json!({"columns": ["Id"], "rows": [{"recordId": 1, "cells": [min]}]}))
            .report(28, json!({"columns": ["Id"], "rows": [{"recordId": 2, "cells": [max]}]}))
    }
}

#[async_trait]
impl RecordApi for FakeApi {
    async fn get_report(&self, report_id: i64, format: DataFormat) -> Result<ReportData, PlatformError> {
        self.report_calls.lock().unwrap().push((report_id, format));
        self.reports
            .get(&report_id)
            .cloned()
            .ok_or_else(|| PlatformError::shape(format!("no report {report_id}")))
    }

    async fn get_record(
        &self,
        app_id: i64,
        record_id: i64,
        field_ids: &[i64],
    ) -> Result<Option<RecordData>, PlatformError> {
        self.record_calls
            .lock()
            .unwrap()
            .push((app_id, record_id, field_ids.to_vec()));
        let mut records = self.records.lock().unwrap();
        match records.get_mut(&record_id).and_then(VecDeque::pop_front) {
            Some(outcome) => outcome,
            None => Ok(None),
        }
    }
}

fn control_record(id: f64, name: &str, citations: serde_json::Value) -> RecordData {
    serde_json::from_value(json!({
        "appId": 14,
        "recordId": id as i64,
        "fieldData": [
            {"type": "Decimal", "fieldId": 585, "value": id},
            {"type": "String", "fieldId": 183, "value": name},
            citations
        ]
    }))
    .unwrap()
}

fn config(dir: &tempfile::TempDir) -> ReferenceConfig {
    ReferenceConfig {
        cache_path: dir.path().join("citations.json"),
        ..ReferenceConfig::default()
    }
}

#[tokio::test]
async fn citations_come_from_the_formatted_report_then_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeApi::default().report(
        27,
        json!({
            "columns": ["Id", "Guidance"],
            "rows": [
                {"recordId": 1, "cells": [101, "Encrypt backups"]},
                {"recordId": 2, "cells": ["102", "Rotate credentials"]}
            ]
        }),
    ));
    let service = ReferenceService::new(api.clone(), config(&dir));

    let first = service.get_citations().await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].id, 101);
    assert_eq!(first[1].guidance, "Rotate credentials");

    let second = service.get_citations().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(*api.report_calls.lock().unwrap(), vec![(27, DataFormat::Formatted)]);
    assert!(dir.path().join("citations.json").exists());
}

#[tokio::test]
async fn empty_citation_report_is_an_error_and_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeApi::default().report(27, json!({"columns": [], "rows": []})));
    let service = ReferenceService::new(api, config(&dir));

    let err = service.get_citations().await.unwrap_err();
    assert!(matches!(err, PlatformError::Shape(_)));
    assert!(!dir.path().join("citations.json").exists());
}

#[tokio::test]
async fn random_control_skips_missing_and_transient_records() {
    let dir = tempfile::tempdir().unwrap();
    let mut api = FakeApi::default().bounds(100, 102);
    api = api
        .record(
            100,
            Err(PlatformError::Status {
                status: 503,
                body: "busy".into(),
            }),
        )
        .record(
            100,
            Ok(Some(control_record(
                100.0,
                "Access reviews",
                json!({"type": "String", "fieldId": 586, "value": "7, 8"}),
            ))),
        );
    let api = Arc::new(api);
    let service = ReferenceService::with_seed(api.clone(), config(&dir), 7);

    let control = service.get_random_control().await.unwrap();
    assert_eq!(control.id, 100.0);
    assert_eq!(control.name, "Access reviews");
    assert_eq!(control.citation_ids, vec![7, 8]);

    let calls = api.record_calls.lock().unwrap();
    assert!(calls.len() >= 2);
    for (app, record_id, fields) in calls.iter() {
        assert_eq!(*app, 14);
        assert!((100..102).contains(record_id), "drew {record_id} outside [100, 102)");
        assert_eq!(fields, &vec![585, 183, 586]);
    }
}

#[tokio::test]
async fn non_string_citation_field_yields_no_ids() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeApi::default().bounds(5, 6).record(
        5,
        Ok(Some(control_record(
            5.0,
            "Logging",
            json!({"type": "Integer", "fieldId": 586, "value": 3}),
        ))),
    ));
    let service = ReferenceService::new(api, config(&dir));

    let control = service.get_random_control().await.unwrap();
    assert_eq!(control.name, "Logging");
    assert!(control.citation_ids.is_empty());
}

#[tokio::test]
async fn random_control_gives_up_after_the_attempt_limit() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeApi::default().bounds(1, 4));
    let cfg = ReferenceConfig {
        max_control_attempts: Some(3),
        ..config(&dir)
    };
    let service = ReferenceService::new(api.clone(), cfg);

    let err = service.get_random_control().await.unwrap_err();
    assert!(matches!(err, PlatformError::RetriesExhausted { attempts: 3 }));
    assert_eq!(api.record_calls.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn empty_id_range_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeApi::default().bounds(9, 9));
    let service = ReferenceService::new(api.clone(), config(&dir));

    let err = service.get_random_control().await.unwrap_err();
    assert!(matches!(err, PlatformError::Shape(_)));
    assert!(api.record_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn permanent_errors_stop_the_draw() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeApi::default().bounds(1, 2).record(
        1,
        Err(PlatformError::Status {
            status: 401,
            body: "unauthorized".into(),
        }),
    ));
    let service = ReferenceService::new(api.clone(), config(&dir));

    let err = service.get_random_control().await.unwrap_err();
    assert!(matches!(err, PlatformError::Status { status: 401, .. }));
    assert_eq!(api.record_calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn rejected_record_requests_are_redrawn() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(
        FakeApi::default()
            .bounds(1, 2)
            .record(
                1,
                Err(PlatformError::Status {
                    status: 400,
                    body: "bad request".into(),
                }),
            )
            .record(
                1,
                Err(PlatformError::Status {
                    status: 403,
                    body: "forbidden".into(),
                }),
            )
            .record(
                1,
                Ok(Some(control_record(
                    1.0,
                    "Change management",
                    json!({"type": "String", "fieldId": 586, "value": "2"}),
                ))),
            ),
    );
    let service = ReferenceService::new(api.clone(), config(&dir));

    let control = service.get_random_control().await.unwrap();
    assert_eq!(control.name, "Change management");
    assert_eq!(api.record_calls.lock().unwrap().len(), 3);
}
