use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use platform_api::{DataFormat, HttpRecordApi, PlatformConfig, PlatformError, RecordApi};
use serde_json::json;
use std::collections::HashMap;

#[derive(Clone, Default)]
struct Seen {
    requests: Arc<Mutex<Vec<(String, HashMap<String, String>)>>>,
    headers: Arc<Mutex<Vec<(String, String)>>>,
}

fn remember(seen: &Seen, headers: &HeaderMap, path: String, query: HashMap<String, String>) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    seen.headers
        .lock()
        .unwrap()
        .push((header("x-apikey"), header("x-api-version")));
    seen.requests.lock().unwrap().push((path, query));
}

async fn report(
    State(seen): State<Seen>,
    Path(id): Path<i64>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    remember(&seen, &headers, format!("/Reports/id/{id}"), query);
    match id {
        27 => Json(json!({
            "columns": ["Id", "Guidance"],
            "rows": [{"recordId": 1, "cells": [1, "Keep logs"]}]
        }))
        .into_response(),
        500 => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn record(
    State(seen): State<Seen>,
    Path((app, id)): Path<(i64, i64)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    remember(&seen, &headers, format!("/Records/appId/{app}/recordId/{id}"), query);
    if id != 42 {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({
        "appId": app,
        "recordId": id,
        "fieldData": [{"type": "String", "fieldId": 183, "value": "Backups"}]
    }))
    .into_response()
}

async fn serve() -> (String, Seen) {
    let seen = Seen::default();
    let app = Router::new()
        .route("/Reports/id/:id", get(report))
        .route("/Records/appId/:app/recordId/:id", get(record))
        .with_state(seen.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/"), seen)
}

fn client(base: &str) -> HttpRecordApi {
    HttpRecordApi::new(&PlatformConfig {
        base_url: base.into(),
        api_key: "secret".into(),
        timeout_secs: 5,
    })
    .unwrap()
}

#[tokio::test]
async fn report_request_carries_format_and_auth_headers() {
    let (base, seen) = serve().await;
    let report = client(&base).get_report(27, DataFormat::Formatted).await.unwrap();
    assert_eq!(report.rows.len(), 1);
    assert_eq!(report.rows[0].cells[1], json!("Keep logs"));

    let requests = seen.requests.lock().unwrap();
    assert_eq!(requests[0].0, "/Reports/id/27");
    assert_eq!(requests[0].1["apiDataFormat"], "Formatted");
    assert_eq!(requests[0].1["dataType"], "ReportData");
    assert_eq!(
        *seen.headers.lock().unwrap(),
        vec![("secret".to_string(), "2".to_string())]
    );
}

#[tokio::test]
async fn record_lookup_maps_not_found_to_none() {
    let (base, seen) = serve().await;
    let api = client(&base);

    let found = api.get_record(14, 42, &[585, 183, 586]).await.unwrap().unwrap();
    assert_eq!(found.field(183).unwrap().value, json!("Backups"));
    assert!(api.get_record(14, 43, &[585]).await.unwrap().is_none());

    let requests = seen.requests.lock().unwrap();
    assert_eq!(requests[0].0, "/Records/appId/14/recordId/42");
    assert_eq!(requests[0].1["fieldIds"], "585,183,586");
    assert_eq!(requests[0].1["dataFormat"], "Raw");
}

#[tokio::test]
async fn server_errors_surface_status_and_are_transient() {
    let (base, _seen) = serve().await;
    let err = client(&base).get_report(500, DataFormat::Raw).await.unwrap_err();
    match &err {
        PlatformError::Status { status, body } => {
            assert_eq!(*status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_transient());
}

#[test]
fn missing_api_key_is_a_config_error() {
    let err = HttpRecordApi::new(&PlatformConfig::default()).err().unwrap();
    assert!(matches!(err, PlatformError::Config(_)));
}
