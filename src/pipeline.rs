use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::annotate::UnifyLimits;
use crate::compare::DEFAULT_PREVIEW_CHARS;
use crate::core::model::DocumentResults;
use crate::export::csv_export::CsvExporter;
use crate::export::html_overlay_export::HtmlOverlayExporter;
use crate::export::json_export::JsonExporter;
use crate::export::Exporter;
use crate::session::ReviewSession;
use crate::source::ResultsSource;

/// Display and rendering caps for the review views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewConfig {
    pub max_overlay_words: usize,
    pub max_layout_tokens: usize,
    pub display_limit: usize,
    pub preview_chars: usize,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            max_overlay_words: 400,
            max_layout_tokens: 300,
            display_limit: 200,
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }
}

impl ReviewConfig {
    pub fn unify_limits(&self) -> UnifyLimits {
        UnifyLimits {
            max_words: Some(self.max_overlay_words),
            max_tokens: Some(self.max_layout_tokens),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Html,
}

/// Fetches a results snapshot and loads it into a fresh session.
pub fn load_session(source: &dyn ResultsSource, config: ReviewConfig) -> Result<ReviewSession> {
    let results = source.fetch_results()?;
    info!(
        document = results.document.id,
        runs = results.runs.len(),
        "loaded results snapshot"
    );
    let mut session = ReviewSession::new(config);
    session.apply_results(results);
    Ok(session)
}

pub fn export_results(
    results: &DocumentResults,
    output: &Path,
    formats: &[ExportFormat],
    config: ReviewConfig,
) -> Result<()> {
    for format in formats {
        match format {
            ExportFormat::Json => JsonExporter::new(output.to_path_buf()).export(results)?,
            ExportFormat::Csv => CsvExporter::new(output.to_path_buf()).export(results)?,
            ExportFormat::Html => HtmlOverlayExporter::new(output.join("overlay"))
                .with_limits(config.unify_limits())
                .export(results)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    use serde_json::json;

    fn temp_output_dir(prefix: &str) -> PathBuf {
        let mut out = std::env::temp_dir();
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis();
        let pid = std::process::id();
        out.push(format!("{prefix}-{pid}-{now}"));
        out
    }

    fn results() -> DocumentResults {
        serde_json::from_value(json!({
            "document": {"id": 1, "filename": "A-101.pdf", "stored_path": "/data/uploads/a.pdf", "page_count": 1},
            "runs": [
                {"id": 2, "stage": "detect:yolov8", "status": "completed",
                 "output": {"pages": [{"page": 1, "detections": [{"label": "door", "confidence": 0.9, "bbox": [10, 10, 50, 80]}]}]}},
                {"id": 1, "stage": "render", "status": "completed",
                 "output": {"pages": [{"page": 1, "url": "/files/pages/a_page_1.png", "width": 1700, "height": 2200}]}}
            ]
        }))
        .expect("results should decode")
    }

    #[test]
    fn default_config_matches_view_caps() {
        let config = ReviewConfig::default();
        assert_eq!(config.unify_limits(), UnifyLimits::default());
        assert_eq!(config.display_limit, 200);
        assert_eq!(config.preview_chars, 500);
    }

    #[test]
    fn export_results_writes_requested_formats() -> Result<()> {
        let output = temp_output_dir("sheetlens-pipeline");
        fs::create_dir_all(&output)?;

        export_results(
            &results(),
            &output,
            &[ExportFormat::Json, ExportFormat::Csv, ExportFormat::Html],
            ReviewConfig::default(),
        )?;

        assert!(output.join("results.json").exists());
        assert!(output.join("results.csv").exists());
        assert!(output.join("overlay/page_001.html").exists());

        let _ = fs::remove_dir_all(&output);
        Ok(())
    }
}
