use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::config::PlatformConfig;
use crate::errors::PlatformError;
use crate::models::{DataFormat, RecordData, ReportData};

/// Read access to reports and records.
#[async_trait]
pub trait RecordApi: Send + Sync {
    async fn get_report(
        &self,
        report_id: i64,
        format: DataFormat,
    ) -> Result<ReportData, PlatformError>;

    /// `Ok(None)` when the record does not exist.
    async fn get_record(
        &self,
        app_id: i64,
        record_id: i64,
        field_ids: &[i64],
    ) -> Result<Option<RecordData>, PlatformError>;
}

pub struct HttpRecordApi {
    client: Client,
    base_url: String,
}

impl HttpRecordApi {
    pub fn new(config: &PlatformConfig) -> Result<Self, PlatformError> {
        if config.api_key.trim().is_empty() {
            return Err(PlatformError::Config("platform api key is not configured".into()));
        }
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.api_key)
            .map_err(|err| PlatformError::Config(format!("api key is not a valid header: {err}")))?;
        headers.insert("x-apikey", key);
        headers.insert("x-api-version", HeaderValue::from_static("2"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, String)],
    ) -> Result<Option<T>, PlatformError> {
        debug!(target: "platform-api", %url, "GET");
        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            return Err(PlatformError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let parsed = response
            .json::<T>()
            .await
            .map_err(|err| PlatformError::shape(format!("{url}: {err}")))?;
        Ok(Some(parsed))
    }
}

#[async_trait]
impl RecordApi for HttpRecordApi {
    async fn get_report(
        &self,
        report_id: i64,
        format: DataFormat,
    ) -> Result<ReportData, PlatformError> {
        let url = format!("{}/Reports/id/{report_id}", self.base_url);
        let query = [
            ("apiDataFormat", format.as_str().to_string()),
            ("dataType", "ReportData".to_string()),
        ];
        self.get_json(url, &query)
            .await?
            .ok_or_else(|| PlatformError::shape(format!("report {report_id} does not exist")))
    }

    async fn get_record(
        &self,
        app_id: i64,
        record_id: i64,
        field_ids: &[i64],
    ) -> Result<Option<RecordData>, PlatformError> {
        let url = format!(
            "{}/Records/appId/{app_id}/recordId/{record_id}",
            self.base_url
        );
        let fields = field_ids
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let query = [("fieldIds", fields), ("dataFormat", "Raw".to_string())];
        self.get_json(url, &query).await
    }
}
