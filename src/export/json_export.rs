use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;

use crate::core::model::DocumentResults;
use crate::export::{export_rows, ExportRow, Exporter};

#[derive(Debug, Clone)]
pub struct JsonExporter {
    out_dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct JsonExport<'a> {
    document_id: i64,
    document_filename: &'a str,
    runs: Vec<ExportRow>,
}

impl JsonExporter {
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir }
    }
}

impl Exporter for JsonExporter {
    fn export(&self, results: &DocumentResults) -> Result<()> {
        fs::create_dir_all(&self.out_dir)?;
        let path = self.out_dir.join("results.json");
        let export = JsonExport {
            document_id: results.document.id,
            document_filename: &results.document.filename,
            runs: export_rows(results),
        };
        let data = serde_json::to_string_pretty(&export)?;
        fs::write(path, data)?;
        Ok(())
    }
}
