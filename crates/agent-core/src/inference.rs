//! Schema inference: sample CSV rows in, typed column list out.

use std::sync::Arc;

use grc_core_types::{ColumnSchema, ImportAnalysisResult};
use tracing::{info, warn};

use crate::errors::AgentError;
use crate::llm_provider::{CompletionRequest, LlmProvider};
use crate::prompt::PromptBuilder;
use crate::utils::extract_json_array;

/// Header plus one data row.
pub const DEFAULT_SAMPLE_ROWS: usize = 2;

const ANALYSIS_MAX_TOKENS: u32 = 2048;

/// Reads up to `max_rows` records and re-encodes each as one delimited line.
pub fn sample_rows(csv_bytes: &[u8], max_rows: usize) -> Result<Vec<String>, AgentError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(csv_bytes);
    let mut rows = Vec::new();
    for record in reader.records().take(max_rows) {
        let record = record.map_err(|err| AgentError::Sample(err.to_string()))?;
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        writer
            .write_record(&record)
            .map_err(|err| AgentError::Sample(err.to_string()))?;
        let bytes = writer
            .into_inner()
            .map_err(|err| AgentError::Sample(err.to_string()))?;
        let line = String::from_utf8_lossy(&bytes).trim_end().to_string();
        if !line.is_empty() {
            rows.push(line);
        }
    }
    Ok(rows)
}

fn field_count(row: &str) -> usize {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(row.as_bytes())
        .records()
        .next()
        .and_then(Result::ok)
        .map(|record| record.len())
        .unwrap_or(0)
}

pub struct SchemaInferencer {
    provider: Arc<dyn LlmProvider>,
    prompt: PromptBuilder,
    model: String,
}

impl SchemaInferencer {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            prompt: PromptBuilder::new(),
            model: model.into(),
        }
    }

    /// Never fails: every problem degrades to an empty column list, which
    /// callers treat as the failure signal.
    pub async fn infer(&self, application_name: &str, rows: &[String]) -> ImportAnalysisResult {
        if rows.is_empty() {
            warn!(target: "agent-core", application = application_name, "no sample rows; skipping analysis");
            return ImportAnalysisResult::empty(application_name);
        }
        match self.try_infer(rows).await {
            Ok(columns) => {
                info!(
                    target: "agent-core",
                    application = application_name,
                    columns = columns.len(),
                    "schema inferred"
                );
                ImportAnalysisResult::new(application_name, columns)
            }
            Err(err) => {
                warn!(target: "agent-core", application = application_name, %err, "schema inference degraded to empty result");
                ImportAnalysisResult::empty(application_name)
            }
        }
    }

    async fn try_infer(&self, rows: &[String]) -> Result<Vec<ColumnSchema>, AgentError> {
        let request = CompletionRequest::new(&self.model, self.prompt.import_analysis(rows))
            .with_temperature(0.0)
            .with_max_tokens(ANALYSIS_MAX_TOKENS);
        let reply = self.provider.complete(&request).await?;
        let json = extract_json_array(&reply)
            .ok_or_else(|| AgentError::decode("reply holds no JSON array"))?;
        let columns: Vec<ColumnSchema> =
            serde_json::from_str(&json).map_err(|err| AgentError::decode(err.to_string()))?;

        if rows.len() > 1 {
            let expected = field_count(&rows[0]);
            if columns.len() != expected {
                return Err(AgentError::decode(format!(
                    "header has {expected} columns but reply described {}",
                    columns.len()
                )));
            }
        }
        Ok(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_header_and_first_row_preserving_quotes() {
        let csv = b"name,notes,city\nAda,\"likes, commas\",London\nBob,x,Paris\n";
        let rows = sample_rows(csv, DEFAULT_SAMPLE_ROWS).unwrap();
        assert_eq!(
            rows,
            vec![
                "name,notes,city".to_string(),
                "Ada,\"likes, commas\",London".to_string()
            ]
        );
        assert_eq!(field_count(&rows[1]), 3);
    }

    #[test]
    fn empty_input_yields_no_rows() {
        assert!(sample_rows(b"", 2).unwrap().is_empty());
    }
}
