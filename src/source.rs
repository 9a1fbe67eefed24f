use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::model::DocumentResults;
use crate::metrics::MetricsSnapshot;

/// Where a document's results snapshot comes from.
pub trait ResultsSource {
    fn fetch_results(&self) -> Result<DocumentResults>;
}

/// Results JSON saved from the backend's `/results/{id}` endpoint.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultsSource for JsonFileSource {
    fn fetch_results(&self) -> Result<DocumentResults> {
        let data = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read results file {}", self.path.display()))?;
        let results: DocumentResults = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse results JSON in {}", self.path.display()))?;
        Ok(results)
    }
}

/// Reads a metrics JSON saved from the backend's `/metrics/{id}` endpoint.
pub fn load_metrics_snapshot(path: &Path) -> Result<MetricsSnapshot> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read metrics file {}", path.display()))?;
    serde_json::from_str(&data)
        .with_context(|| format!("failed to parse metrics JSON in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("sheetlens-{}-{now}-{name}", std::process::id()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn reads_results_file() -> Result<()> {
        let path = temp_file(
            "results.json",
            r#"{"document": {"id": 4, "filename": "M-201.pdf"}, "runs": [
                {"id": 9, "stage": "ocr:tesseract", "status": "completed",
                 "output": {"pages": [{"page": 1, "words": [{"text": "DUCT", "bbox": [1, 1, 5, 5], "confidence": 0.6}]}]}}
            ]}"#,
        );
        let results = JsonFileSource::new(path.clone()).fetch_results()?;
        assert_eq!(results.document.filename, "M-201.pdf");
        assert_eq!(results.runs.len(), 1);
        assert!(results.runs[0].has_annotations());
        let _ = fs::remove_file(&path);
        Ok(())
    }

    #[test]
    fn malformed_bbox_is_rejected() {
        let path = temp_file(
            "bad.json",
            r#"{"document": {"id": 4, "filename": "M-201.pdf"}, "runs": [
                {"id": 9, "stage": "ocr:tesseract", "status": "completed",
                 "output": {"pages": [{"page": 1, "words": [{"text": "DUCT", "bbox": ["a", 1, 5, 5]}]}]}}
            ]}"#,
        );
        let err = JsonFileSource::new(path.clone())
            .fetch_results()
            .expect_err("non-numeric bbox should fail to decode");
        assert!(err.to_string().contains("failed to parse results JSON"));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_metrics_snapshot(Path::new("/nonexistent/metrics.json"))
            .expect_err("missing file");
        assert!(err.to_string().contains("/nonexistent/metrics.json"));
    }
}
