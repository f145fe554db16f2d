//! Citation and control lookups against the compliance reference app.

use std::sync::{Arc, Mutex};

use grc_core_types::{Citation, Control};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::CitationCache;
use crate::client::RecordApi;
use crate::config::ReferenceConfig;
use crate::errors::PlatformError;
use crate::models::{cell_int, cell_text, DataFormat, RecordData};

pub struct ReferenceService {
    api: Arc<dyn RecordApi>,
    cfg: ReferenceConfig,
    cache: CitationCache,
    rng: Mutex<StdRng>,
}

impl ReferenceService {
    pub fn new(api: Arc<dyn RecordApi>, cfg: ReferenceConfig) -> Self {
        Self::with_rng(api, cfg, StdRng::from_entropy())
    }

    /// Deterministic control draws.
    pub fn with_seed(api: Arc<dyn RecordApi>, cfg: ReferenceConfig, seed: u64) -> Self {
        Self::with_rng(api, cfg, StdRng::seed_from_u64(seed))
    }

    fn with_rng(api: Arc<dyn RecordApi>, cfg: ReferenceConfig, rng: StdRng) -> Self {
        let cache = CitationCache::new(cfg.cache_path.clone());
        Self {
            api,
            cfg,
            cache,
            rng: Mutex::new(rng),
        }
    }

    pub fn config(&self) -> &ReferenceConfig {
        &self.cfg
    }

    /// All citations, served from the disk cache once it exists.
    pub async fn get_citations(&self) -> Result<Vec<Citation>, PlatformError> {
        self.cache.load_or_fetch(|| self.fetch_citations()).await
    }

    async fn fetch_citations(&self) -> Result<Vec<Citation>, PlatformError> {
        let report = self
            .api
            .get_report(self.cfg.all_citations_report, DataFormat::Formatted)
            .await?;
        let mut citations = Vec::with_capacity(report.rows.len());
        for row in &report.rows {
            let id = row
                .cells
                .first()
                .ok_or_else(|| PlatformError::shape("citation row has no id cell"))?;
            let guidance = row
                .cells
                .get(1)
                .ok_or_else(|| PlatformError::shape("citation row has no guidance cell"))?;
            citations.push(Citation::new(cell_int(id, "citation id")?, cell_text(guidance)));
        }
        if citations.is_empty() {
            return Err(PlatformError::shape(format!(
                "report {} returned no citations",
                self.cfg.all_citations_report
            )));
        }
        info!(target: "platform-api", count = citations.len(), "citations fetched");
        Ok(citations)
    }

    /// A control drawn uniformly from `[min, max)` of the control id range.
    /// Ids without a record are skipped.
    pub async fn get_random_control(&self) -> Result<Control, PlatformError> {
        let min = self.bound(self.cfg.min_control_report, "min control id").await?;
        let max = self.bound(self.cfg.max_control_report, "max control id").await?;
        if min >= max {
            return Err(PlatformError::shape(format!(
                "control id range [{min}, {max}) is empty"
            )));
        }

        let fields = [
            self.cfg.control_id_field,
            self.cfg.control_name_field,
            self.cfg.control_citation_ids_field,
        ];
        let mut attempts = 0u32;
        loop {
            if let Some(limit) = self.cfg.max_control_attempts {
                if attempts >= limit {
                    return Err(PlatformError::RetriesExhausted { attempts });
                }
            }
            attempts += 1;
            let record_id = self.draw(min, max);
            match self
                .api
                .get_record(self.cfg.control_app_id, record_id, &fields)
                .await
            {
                Ok(Some(record)) => return self.control_from_record(&record),
                Ok(None) => {
                    debug!(target: "platform-api", record_id, attempts, "control record missing, redrawing");
                }
                Err(err) if err.is_transient() => {
                    warn!(target: "platform-api", record_id, attempts, error = %err, "control fetch failed, redrawing");
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn bound(&self, report_id: i64, what: &str) -> Result<i64, PlatformError> {
        let report = self.api.get_report(report_id, DataFormat::Raw).await?;
        let cell = report
            .first_cell()
            .ok_or_else(|| PlatformError::shape(format!("report {report_id} has no {what}")))?;
        cell_int(cell, what)
    }

    fn draw(&self, min: i64, max: i64) -> i64 {
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(min..max),
            Err(poisoned) => poisoned.into_inner().gen_range(min..max),
        }
    }

    fn control_from_record(&self, record: &RecordData) -> Result<Control, PlatformError> {
        let id_field = record
            .field(self.cfg.control_id_field)
            .ok_or_else(|| PlatformError::shape("control record has no id field"))?;
        let id_text = cell_text(&id_field.value);
        let id = id_text
            .trim()
            .parse::<f64>()
            .map_err(|_| PlatformError::shape(format!("control id '{id_text}' is not a number")))?;

        let name = record
            .field(self.cfg.control_name_field)
            .map(|field| cell_text(&field.value))
            .ok_or_else(|| PlatformError::shape("control record has no name field"))?;

        let citation_ids = match record.field(self.cfg.control_citation_ids_field) {
            Some(field) if field.is_string() => parse_citation_ids(&field.value)?,
            _ => Vec::new(),
        };

        Ok(Control {
            id,
            name,
            citation_ids,
        })
    }
}

fn parse_citation_ids(value: &Value) -> Result<Vec<i64>, PlatformError> {
    let text = cell_text(value);
    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>()
                .map_err(|_| PlatformError::shape(format!("citation id '{part}' is not an integer")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn citation_ids_are_split_and_trimmed() {
        assert_eq!(parse_citation_ids(&json!("1, 2,3")).unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_citation_ids(&json!("")).unwrap(), Vec::<i64>::new());
        assert_eq!(parse_citation_ids(&json!("4,,5, ")).unwrap(), vec![4, 5]);
        assert!(parse_citation_ids(&json!("4, AC-2")).is_err());
    }
}
