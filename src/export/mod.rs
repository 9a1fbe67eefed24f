pub mod csv_export;
pub mod html_overlay_export;
pub mod json_export;

use anyhow::Result;
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::core::model::{DocumentResults, RunStatus};
use crate::metrics::summarize_run;

pub use csv_export::CsvExporter;
pub use html_overlay_export::HtmlOverlayExporter;
pub use json_export::JsonExporter;

pub trait Exporter {
    fn export(&self, results: &DocumentResults) -> Result<()>;
}

/// One run as a flat export record.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExportRow {
    pub document_id: i64,
    pub document_filename: String,
    pub run_id: i64,
    pub stage: String,
    pub status: RunStatus,
    pub started_at: Option<NaiveDateTime>,
    pub finished_at: Option<NaiveDateTime>,
    pub elapsed_ms: Option<u64>,
    pub page_count: Option<u32>,
    pub word_count: Option<u64>,
    pub avg_confidence: Option<f64>,
    pub detections: Option<u64>,
    pub tokens: Option<u64>,
    pub prompt_key: Option<String>,
    pub model: Option<String>,
}

pub fn export_rows(results: &DocumentResults) -> Vec<ExportRow> {
    results
        .runs
        .iter()
        .map(|run| {
            let summary = summarize_run(run);
            ExportRow {
                document_id: results.document.id,
                document_filename: results.document.filename.clone(),
                run_id: summary.run_id,
                stage: summary.stage,
                status: summary.status,
                started_at: summary.started_at,
                finished_at: summary.finished_at,
                elapsed_ms: summary.elapsed_ms,
                page_count: summary.page_count,
                word_count: summary.word_count,
                avg_confidence: summary.avg_confidence,
                detections: summary.detection_count,
                tokens: summary.token_count,
                prompt_key: summary.prompt_key,
                model: summary.model,
            }
        })
        .collect()
}
