//! Client for the record platform's query API.
//!
//! Covers the read paths the copilot needs: the citation report (cached on
//! disk) and random control records from the reference application.

pub mod cache;
pub mod client;
pub mod config;
pub mod errors;
pub mod models;
pub mod retrieval;

pub use cache::CitationCache;
pub use client::{HttpRecordApi, RecordApi};
pub use config::{PlatformConfig, ReferenceConfig};
pub use errors::PlatformError;
pub use models::{cell_int, cell_text, DataFormat, FieldValue, RecordData, ReportData, ReportRow};
pub use retrieval::ReferenceService;
